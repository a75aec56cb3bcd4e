// ==========================================
// 蜡烛烛芯推荐系统 - 模型训练记录仓储
// ==========================================
// 覆盖: ml_training_runs
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::prediction::TrainingRun;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Result as SqliteResult};
use std::sync::{Arc, Mutex};

pub struct TrainingRunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TrainingRunRepository {
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

    pub fn insert(&self, run: &TrainingRun) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO ml_training_runs (
                model_type, version, accuracy, cv_score, sample_size, metrics, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                run.model_type,
                run.version,
                run.accuracy,
                run.cv_score,
                run.sample_size,
                run.metrics_json,
                run.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 最近的训练记录（新 → 旧）
    pub fn list_recent(&self, model_type: &str, limit: usize) -> RepositoryResult<Vec<TrainingRun>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT model_type, version, accuracy, cv_score, sample_size, metrics, created_at
            FROM ml_training_runs
            WHERE model_type = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
            "#,
        )?;
        let runs = stmt
            .query_map(params![model_type, limit as i64], |row| {
                Ok(TrainingRun {
                    model_type: row.get(0)?,
                    version: row.get(1)?,
                    accuracy: row.get(2)?,
                    cv_score: row.get(3)?,
                    sample_size: row.get(4)?,
                    metrics_json: row.get(5)?,
                    created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(6)?)
                        .map(|d| d.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(runs)
    }
}
