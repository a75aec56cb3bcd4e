// ==========================================
// 蜡烛烛芯推荐系统 - 预测与测试结果仓储
// ==========================================
// 覆盖: wick_predictions / test_results / test_priority_queue
// 红线: confidence_score 写入后不再更新
// 红线: test_results 只追加
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::prediction::{
    PredictionMiss, TestPriorityEntry, TestResult, UncertainPrediction, WickPrediction,
};
use crate::domain::types::TestType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

// ==========================================
// PredictionRepository - 预测仓储
// ==========================================
pub struct PredictionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PredictionRepository {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 推荐记录
    // ==========================================

    pub fn insert_prediction(&self, prediction: &WickPrediction) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO wick_predictions (
                id, assembly_id, vessel_id, wax_type_id, fragrance_id,
                fragrance_load_percentage, predicted_wick_id, confidence_score,
                model_version, verified, verification_date, actual_wick_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                prediction.id,
                prediction.assembly_id,
                prediction.vessel_id,
                prediction.wax_type_id,
                prediction.fragrance_id,
                prediction.fragrance_load_percentage,
                prediction.predicted_wick_id,
                prediction.confidence_score,
                prediction.model_version,
                prediction.verified as i32,
                prediction.verification_date.map(|d| d.to_rfc3339()),
                prediction.actual_wick_id,
                prediction.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn find_prediction_by_id(&self, id: &str) -> RepositoryResult<Option<WickPrediction>> {
        let conn = self.get_conn()?;
        let prediction = conn
            .query_row(
                r#"
                SELECT id, assembly_id, vessel_id, wax_type_id, fragrance_id,
                       fragrance_load_percentage, predicted_wick_id, confidence_score,
                       model_version, verified, verification_date, actual_wick_id, created_at
                FROM wick_predictions
                WHERE id = ?1
                "#,
                params![id],
                map_prediction,
            )
            .optional()?;
        Ok(prediction)
    }

    pub fn list_predictions_by_assembly(&self, assembly_id: &str) -> RepositoryResult<Vec<WickPrediction>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, assembly_id, vessel_id, wax_type_id, fragrance_id,
                   fragrance_load_percentage, predicted_wick_id, confidence_score,
                   model_version, verified, verification_date, actual_wick_id, created_at
            FROM wick_predictions
            WHERE assembly_id = ?1
            ORDER BY created_at ASC, id ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![assembly_id], map_prediction)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 查询待验证的低置信预测（置信度升序）
    ///
    /// # 说明
    /// - 只返回关联了配方的预测（需要配方名称与容器/蜡组合）
    /// - 置信度相同按 id 升序，保证顺序确定
    pub fn list_uncertain_predictions(
        &self,
        confidence_threshold: f64,
        limit: usize,
    ) -> RepositoryResult<Vec<UncertainPrediction>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT p.id, p.confidence_score, a.id, a.name, a.vessel_id, a.wax_type_id
            FROM wick_predictions p
            JOIN assemblies a ON a.id = p.assembly_id
            WHERE p.verified = 0
              AND p.confidence_score < ?1
            ORDER BY p.confidence_score ASC, p.id ASC
            LIMIT ?2
            "#,
        )?;
        let rows = stmt
            .query_map(params![confidence_threshold, limit as i64], |row| {
                Ok(UncertainPrediction {
                    prediction_id: row.get(0)?,
                    confidence_score: row.get(1)?,
                    assembly_id: row.get(2)?,
                    assembly_name: row.get(3)?,
                    vessel_id: row.get(4)?,
                    wax_type_id: row.get(5)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 将配方下待验证的预测标记为已验证
    ///
    /// # 参数
    /// - `actual_wick_id`: 测试通过时为测试烛芯; 失败时为 None
    ///
    /// # 返回
    /// 更新的行数
    pub fn mark_verified_by_assembly(
        &self,
        assembly_id: &str,
        actual_wick_id: Option<&str>,
        verified_at: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            r#"
            UPDATE wick_predictions
            SET verified = 1,
                verification_date = ?2,
                actual_wick_id = ?3
            WHERE assembly_id = ?1 AND verified = 0
            "#,
            params![assembly_id, verified_at.to_rfc3339(), actual_wick_id],
        )?;
        Ok(updated)
    }

    /// 已验证但预测错误的记录
    pub fn list_prediction_misses(&self) -> RepositoryResult<Vec<PredictionMiss>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT p.predicted_wick_id, p.actual_wick_id, p.confidence_score,
                   v.name, w.name, f.name
            FROM wick_predictions p
            JOIN assemblies a ON p.assembly_id = a.id
            JOIN vessels v ON a.vessel_id = v.id
            JOIN wax_types w ON a.wax_type_id = w.id
            JOIN fragrance_oils f ON a.fragrance_oil_id = f.id
            WHERE p.verified = 1
              AND p.actual_wick_id IS NOT NULL
              AND p.predicted_wick_id != p.actual_wick_id
            ORDER BY p.created_at ASC
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PredictionMiss {
                    predicted_wick_id: row.get(0)?,
                    actual_wick_id: row.get(1)?,
                    confidence_score: row.get(2)?,
                    vessel_name: row.get(3)?,
                    wax_name: row.get(4)?,
                    fragrance_name: row.get(5)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    // ==========================================
    // 测试结果
    // ==========================================

    pub fn insert_test_result(&self, result: &TestResult) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO test_results (
                id, assembly_id, wick_id_tested, test_date, test_type,
                flame_height_mm, melt_pool_mm_at_2h, passed, notes, tested_by
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                result.id,
                result.assembly_id,
                result.wick_id_tested,
                result.test_date.to_rfc3339(),
                result.test_type.to_db_str(),
                result.flame_height_mm,
                result.melt_pool_mm_at_2h,
                result.passed as i32,
                result.notes,
                result.tested_by,
            ],
        )?;
        Ok(())
    }

    pub fn list_test_results_by_assembly(&self, assembly_id: &str) -> RepositoryResult<Vec<TestResult>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, assembly_id, wick_id_tested, test_date, test_type,
                   flame_height_mm, melt_pool_mm_at_2h, passed, notes, tested_by
            FROM test_results
            WHERE assembly_id = ?1
            ORDER BY test_date ASC, id ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![assembly_id], |row| {
                Ok(TestResult {
                    id: row.get(0)?,
                    assembly_id: row.get(1)?,
                    wick_id_tested: row.get(2)?,
                    test_date: parse_datetime(&row.get::<_, String>(3)?).unwrap_or_else(Utc::now),
                    test_type: TestType::from_str(&row.get::<_, String>(4)?),
                    flame_height_mm: row.get(5)?,
                    melt_pool_mm_at_2h: row.get(6)?,
                    passed: row.get::<_, i32>(7)? != 0,
                    notes: row.get(8)?,
                    tested_by: row.get(9)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    // ==========================================
    // 测试优先队列
    // ==========================================

    pub fn enqueue_priority(
        &self,
        assembly_id: &str,
        priority_score: f64,
        reason: &str,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO test_priority_queue (assembly_id, priority_score, reason, completed, created_at)
            VALUES (?1, ?2, ?3, 0, ?4)
            "#,
            params![assembly_id, priority_score, reason, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn has_open_priority(&self, assembly_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM test_priority_queue WHERE assembly_id = ?1 AND completed = 0",
            params![assembly_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// 未完成的队列项（优先级降序）
    pub fn list_open_priorities(&self) -> RepositoryResult<Vec<TestPriorityEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, assembly_id, priority_score, reason, completed, completed_date, created_at
            FROM test_priority_queue
            WHERE completed = 0
            ORDER BY priority_score DESC, id ASC
            "#,
        )?;
        let rows = stmt
            .query_map([], map_priority_entry)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 标记配方的队列项为已完成
    pub fn complete_priorities_by_assembly(
        &self,
        assembly_id: &str,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            r#"
            UPDATE test_priority_queue
            SET completed = 1, completed_date = ?2
            WHERE assembly_id = ?1 AND completed = 0
            "#,
            params![assembly_id, completed_at.to_rfc3339()],
        )?;
        Ok(updated)
    }
}

fn map_prediction(row: &Row<'_>) -> SqliteResult<WickPrediction> {
    Ok(WickPrediction {
        id: row.get(0)?,
        assembly_id: row.get(1)?,
        vessel_id: row.get(2)?,
        wax_type_id: row.get(3)?,
        fragrance_id: row.get(4)?,
        fragrance_load_percentage: row.get(5)?,
        predicted_wick_id: row.get(6)?,
        confidence_score: row.get(7)?,
        model_version: row.get(8)?,
        verified: row.get::<_, i32>(9)? != 0,
        verification_date: row
            .get::<_, Option<String>>(10)?
            .and_then(|s| parse_datetime(&s)),
        actual_wick_id: row.get(11)?,
        created_at: parse_datetime(&row.get::<_, String>(12)?).unwrap_or_else(Utc::now),
    })
}

fn map_priority_entry(row: &Row<'_>) -> SqliteResult<TestPriorityEntry> {
    Ok(TestPriorityEntry {
        id: row.get(0)?,
        assembly_id: row.get(1)?,
        priority_score: row.get(2)?,
        reason: row.get(3)?,
        completed: row.get::<_, i32>(4)? != 0,
        completed_date: row
            .get::<_, Option<String>>(5)?
            .and_then(|s| parse_datetime(&s)),
        created_at: parse_datetime(&row.get::<_, String>(6)?).unwrap_or_else(Utc::now),
    })
}
