// ==========================================
// 蜡烛烛芯推荐系统 - 配方与历史经验仓储
// ==========================================
// 覆盖: assemblies / wick_majority_baseline(视图) /
//       wax_conversion_deltas / catalog_assemblies
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::assembly::{Assembly, CatalogAssembly, MajorityBaseline, WaxConversionDelta};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

// ==========================================
// 查询实体
// ==========================================

/// 训练样本行（已批准配方 JOIN 物料属性）
///
/// 数值/分类字段均可能为空，由训练器统一补全
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub assembly_id: String,
    pub wick_id: String,
    pub fragrance_load_percentage: Option<f64>,
    pub volume_ml: Option<f64>,
    pub diameter_mm: Option<f64>,
    pub height_mm: Option<f64>,
    pub vessel_shape: Option<String>,
    pub vessel_material: Option<String>,
    pub double_wick: Option<bool>,
    pub heat_dissipation_factor: Option<f64>,
    pub melt_point_celsius: Option<f64>,
    pub viscosity_index: Option<f64>,
    pub wax_base_type: Option<String>,
    pub flash_point_celsius: Option<f64>,
    pub heat_index: Option<f64>,
    pub fragrance_category: Option<String>,
    pub density_rating: Option<String>,
}

/// 多数投票基线（带名称，供分析展示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MajorityBaselineView {
    pub vessel_name: String,
    pub wax_name: String,
    pub recommended_wick_name: String,
    pub sample_size: i64,
    pub wick_variety: i64,
}

/// 换蜡增量（带名称，供分析展示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaxConversionView {
    pub vessel_name: String,
    pub old_wax_name: String,
    pub new_wax_name: String,
    pub wick_size_delta: i32,
    pub confidence_score: f64,
    pub sample_count: i64,
}

// ==========================================
// AssemblyRepository - 配方仓储
// ==========================================
pub struct AssemblyRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AssemblyRepository {
    /// 创建新的 AssemblyRepository 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 配方
    // ==========================================

    pub fn upsert_assembly(&self, assembly: &Assembly) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO assemblies (
                id, name, vessel_id, wax_type_id, fragrance_oil_id,
                fragrance_load_percentage, wick_id_1, approved_date, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                vessel_id = excluded.vessel_id,
                wax_type_id = excluded.wax_type_id,
                fragrance_oil_id = excluded.fragrance_oil_id,
                fragrance_load_percentage = excluded.fragrance_load_percentage,
                wick_id_1 = excluded.wick_id_1,
                approved_date = excluded.approved_date,
                status = excluded.status
            "#,
            params![
                assembly.id,
                assembly.name,
                assembly.vessel_id,
                assembly.wax_type_id,
                assembly.fragrance_oil_id,
                assembly.fragrance_load_percentage,
                assembly.wick_id,
                assembly.approved_date.map(|d| d.to_rfc3339()),
                assembly.status,
            ],
        )?;
        Ok(())
    }

    pub fn find_assembly_by_id(&self, id: &str) -> RepositoryResult<Option<Assembly>> {
        let conn = self.get_conn()?;
        let assembly = conn
            .query_row(
                r#"
                SELECT id, name, vessel_id, wax_type_id, fragrance_oil_id,
                       fragrance_load_percentage, wick_id_1, approved_date, status
                FROM assemblies
                WHERE id = ?1
                "#,
                params![id],
                map_assembly,
            )
            .optional()?;
        Ok(assembly)
    }

    /// 统计共享 (容器, 蜡) 组合的配方数量
    pub fn count_by_vessel_and_wax(&self, vessel_id: &str, wax_type_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM assemblies WHERE vessel_id = ?1 AND wax_type_id = ?2",
            params![vessel_id, wax_type_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// 查询训练样本（已批准且记录了烛芯的配方）
    pub fn list_training_records(&self) -> RepositoryResult<Vec<TrainingRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                a.id, a.wick_id_1, a.fragrance_load_percentage,
                v.volume_ml, v.diameter_mm, v.height_mm, v.shape, v.material,
                v.double_wick, v.heat_dissipation_factor,
                w.melt_point_celsius, w.viscosity_index, w.base_type,
                f.flash_point_celsius, f.heat_index, f.fragrance_category, f.density_rating
            FROM assemblies a
            JOIN vessels v ON a.vessel_id = v.id
            JOIN wax_types w ON a.wax_type_id = w.id
            JOIN fragrance_oils f ON a.fragrance_oil_id = f.id
            WHERE a.approved_date IS NOT NULL
              AND a.wick_id_1 IS NOT NULL
            ORDER BY a.id
            "#,
        )?;

        let records = stmt
            .query_map([], |row| {
                Ok(TrainingRecord {
                    assembly_id: row.get(0)?,
                    wick_id: row.get(1)?,
                    fragrance_load_percentage: row.get(2)?,
                    volume_ml: row.get(3)?,
                    diameter_mm: row.get(4)?,
                    height_mm: row.get(5)?,
                    vessel_shape: row.get(6)?,
                    vessel_material: row.get(7)?,
                    double_wick: row.get::<_, Option<i32>>(8)?.map(|v| v != 0),
                    heat_dissipation_factor: row.get(9)?,
                    melt_point_celsius: row.get(10)?,
                    viscosity_index: row.get(11)?,
                    wax_base_type: row.get(12)?,
                    flash_point_celsius: row.get(13)?,
                    heat_index: row.get(14)?,
                    fragrance_category: row.get(15)?,
                    density_rating: row.get(16)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(records)
    }

    // ==========================================
    // 多数投票基线
    // ==========================================

    pub fn find_majority_baseline(
        &self,
        vessel_id: &str,
        wax_type_id: &str,
    ) -> RepositoryResult<Option<MajorityBaseline>> {
        let conn = self.get_conn()?;
        let baseline = conn
            .query_row(
                r#"
                SELECT vessel_id, wax_type_id, recommended_wick, sample_size, wick_variety
                FROM wick_majority_baseline
                WHERE vessel_id = ?1 AND wax_type_id = ?2
                "#,
                params![vessel_id, wax_type_id],
                |row| {
                    Ok(MajorityBaseline {
                        vessel_id: row.get(0)?,
                        wax_type_id: row.get(1)?,
                        recommended_wick_id: row.get(2)?,
                        sample_size: row.get(3)?,
                        wick_variety: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(baseline)
    }

    /// 全部基线（带名称）
    pub fn list_majority_baselines(&self) -> RepositoryResult<Vec<MajorityBaselineView>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT v.name, w.name, COALESCE(k.name, b.recommended_wick), b.sample_size, b.wick_variety
            FROM wick_majority_baseline b
            JOIN vessels v ON v.id = b.vessel_id
            JOIN wax_types w ON w.id = b.wax_type_id
            LEFT JOIN wicks k ON k.id = b.recommended_wick
            ORDER BY v.name, w.name
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MajorityBaselineView {
                    vessel_name: row.get(0)?,
                    wax_name: row.get(1)?,
                    recommended_wick_name: row.get(2)?,
                    sample_size: row.get(3)?,
                    wick_variety: row.get(4)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    // ==========================================
    // 换蜡增量
    // ==========================================

    pub fn upsert_wax_conversion_delta(&self, delta: &WaxConversionDelta) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO wax_conversion_deltas (
                vessel_id, old_wax_type_id, new_wax_type_id,
                wick_size_delta, confidence_score, sample_count
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(vessel_id, old_wax_type_id, new_wax_type_id) DO UPDATE SET
                wick_size_delta = excluded.wick_size_delta,
                confidence_score = excluded.confidence_score,
                sample_count = excluded.sample_count
            "#,
            params![
                delta.vessel_id,
                delta.old_wax_type_id,
                delta.new_wax_type_id,
                delta.wick_size_delta,
                delta.confidence_score,
                delta.sample_count,
            ],
        )?;
        Ok(())
    }

    pub fn find_wax_conversion_delta(
        &self,
        vessel_id: &str,
        old_wax_type_id: &str,
        new_wax_type_id: &str,
    ) -> RepositoryResult<Option<WaxConversionDelta>> {
        let conn = self.get_conn()?;
        let delta = conn
            .query_row(
                r#"
                SELECT vessel_id, old_wax_type_id, new_wax_type_id,
                       wick_size_delta, confidence_score, sample_count
                FROM wax_conversion_deltas
                WHERE vessel_id = ?1 AND old_wax_type_id = ?2 AND new_wax_type_id = ?3
                "#,
                params![vessel_id, old_wax_type_id, new_wax_type_id],
                |row| {
                    Ok(WaxConversionDelta {
                        vessel_id: row.get(0)?,
                        old_wax_type_id: row.get(1)?,
                        new_wax_type_id: row.get(2)?,
                        wick_size_delta: row.get(3)?,
                        confidence_score: row.get(4)?,
                        sample_count: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(delta)
    }

    /// 换蜡增量列表（可按容器过滤）
    pub fn list_wax_conversions(&self, vessel_id: Option<&str>) -> RepositoryResult<Vec<WaxConversionView>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT v.name, ow.name, nw.name, d.wick_size_delta, d.confidence_score, d.sample_count
            FROM wax_conversion_deltas d
            JOIN vessels v ON v.id = d.vessel_id
            JOIN wax_types ow ON ow.id = d.old_wax_type_id
            JOIN wax_types nw ON nw.id = d.new_wax_type_id
            WHERE (?1 IS NULL OR d.vessel_id = ?1)
            ORDER BY v.name, ow.name, nw.name
            "#,
        )?;
        let rows = stmt
            .query_map(params![vessel_id], |row| {
                Ok(WaxConversionView {
                    vessel_name: row.get(0)?,
                    old_wax_name: row.get(1)?,
                    new_wax_name: row.get(2)?,
                    wick_size_delta: row.get(3)?,
                    confidence_score: row.get(4)?,
                    sample_count: row.get(5)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    // ==========================================
    // ERP 成品 BOM
    // ==========================================

    pub fn upsert_catalog_assembly(&self, item: &CatalogAssembly) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO catalog_assemblies (item_id, display_name, oz_fill)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(item_id) DO UPDATE SET
                display_name = excluded.display_name,
                oz_fill = excluded.oz_fill
            "#,
            params![item.item_id, item.display_name, item.oz_fill],
        )?;
        Ok(())
    }

    pub fn list_catalog_assemblies(&self) -> RepositoryResult<Vec<CatalogAssembly>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT item_id, display_name, oz_fill FROM catalog_assemblies ORDER BY item_id",
        )?;
        let items = stmt
            .query_map([], |row| {
                Ok(CatalogAssembly {
                    item_id: row.get(0)?,
                    display_name: row.get(1)?,
                    oz_fill: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    pub fn count_catalog_assemblies(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM catalog_assemblies", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn map_assembly(row: &Row<'_>) -> SqliteResult<Assembly> {
    Ok(Assembly {
        id: row.get(0)?,
        name: row.get(1)?,
        vessel_id: row.get(2)?,
        wax_type_id: row.get(3)?,
        fragrance_oil_id: row.get(4)?,
        fragrance_load_percentage: row.get(5)?,
        wick_id: row.get(6)?,
        approved_date: row
            .get::<_, Option<String>>(7)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        status: row.get(8)?,
    })
}
