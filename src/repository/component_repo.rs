// ==========================================
// 蜡烛烛芯推荐系统 - 物料参考数据仓储
// ==========================================
// 覆盖: vessels / wax_types / fragrance_oils / wicks
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::component::{FragranceOil, Vessel, WaxType, Wick};
use crate::domain::types::{DensityRating, WaxBaseType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const VESSEL_COLUMNS: &str = "id, item_id, name, volume_ml, diameter_mm, height_mm, shape, material, double_wick, heat_dissipation_factor";
const WAX_COLUMNS: &str = "id, name, melt_point_celsius, viscosity_index, base_type";
const FRAGRANCE_COLUMNS: &str = "id, item_id, name, flash_point_celsius, specific_gravity, max_load_percentage, heat_index, fragrance_category, density_rating";
const WICK_COLUMNS: &str = "id, name, series, size, size_index";

// ==========================================
// ComponentRepository - 物料参考数据仓储
// ==========================================
pub struct ComponentRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ComponentRepository {
    /// 创建新的 ComponentRepository 实例
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

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 容器
    // ==========================================

    /// 写入或覆盖容器
    pub fn upsert_vessel(&self, vessel: &Vessel) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO vessels (
                id, item_id, name, volume_ml, diameter_mm, height_mm,
                shape, material, double_wick, heat_dissipation_factor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                item_id = excluded.item_id,
                name = excluded.name,
                volume_ml = excluded.volume_ml,
                diameter_mm = excluded.diameter_mm,
                height_mm = excluded.height_mm,
                shape = excluded.shape,
                material = excluded.material,
                double_wick = excluded.double_wick,
                heat_dissipation_factor = excluded.heat_dissipation_factor
            "#,
            params![
                vessel.id,
                vessel.item_id,
                vessel.name,
                vessel.volume_ml,
                vessel.diameter_mm,
                vessel.height_mm,
                vessel.shape,
                vessel.material,
                vessel.double_wick as i32,
                vessel.heat_dissipation_factor,
            ],
        )?;
        Ok(())
    }

    /// 按ID查询容器
    ///
    /// # 返回
    /// - Ok(Some(Vessel)): 找到
    /// - Ok(None): 未找到
    /// - Err: 数据库错误
    pub fn find_vessel_by_id(&self, id: &str) -> RepositoryResult<Option<Vessel>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM vessels WHERE id = ?1", VESSEL_COLUMNS);
        let vessel = conn.query_row(&sql, params![id], map_vessel).optional()?;
        Ok(vessel)
    }

    /// 按名称查询容器
    pub fn find_vessel_by_name(&self, name: &str) -> RepositoryResult<Option<Vessel>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM vessels WHERE name = ?1 LIMIT 1", VESSEL_COLUMNS);
        let vessel = conn.query_row(&sql, params![name], map_vessel).optional()?;
        Ok(vessel)
    }

    /// 查询全部容器
    pub fn list_vessels(&self) -> RepositoryResult<Vec<Vessel>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM vessels ORDER BY id", VESSEL_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let vessels = stmt
            .query_map([], map_vessel)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(vessels)
    }

    // ==========================================
    // 蜡
    // ==========================================

    pub fn upsert_wax_type(&self, wax: &WaxType) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO wax_types (id, name, melt_point_celsius, viscosity_index, base_type)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                melt_point_celsius = excluded.melt_point_celsius,
                viscosity_index = excluded.viscosity_index,
                base_type = excluded.base_type
            "#,
            params![
                wax.id,
                wax.name,
                wax.melt_point_celsius,
                wax.viscosity_index,
                wax.base_type.to_db_str(),
            ],
        )?;
        Ok(())
    }

    pub fn find_wax_type_by_id(&self, id: &str) -> RepositoryResult<Option<WaxType>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM wax_types WHERE id = ?1", WAX_COLUMNS);
        let wax = conn.query_row(&sql, params![id], map_wax_type).optional()?;
        Ok(wax)
    }

    pub fn find_wax_type_by_name(&self, name: &str) -> RepositoryResult<Option<WaxType>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM wax_types WHERE name = ?1 LIMIT 1", WAX_COLUMNS);
        let wax = conn.query_row(&sql, params![name], map_wax_type).optional()?;
        Ok(wax)
    }

    // ==========================================
    // 香精
    // ==========================================

    pub fn upsert_fragrance(&self, fragrance: &FragranceOil) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO fragrance_oils (
                id, item_id, name, flash_point_celsius, specific_gravity,
                max_load_percentage, heat_index, fragrance_category, density_rating
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                item_id = excluded.item_id,
                name = excluded.name,
                flash_point_celsius = excluded.flash_point_celsius,
                specific_gravity = excluded.specific_gravity,
                max_load_percentage = excluded.max_load_percentage,
                heat_index = excluded.heat_index,
                fragrance_category = excluded.fragrance_category,
                density_rating = excluded.density_rating
            "#,
            params![
                fragrance.id,
                fragrance.item_id,
                fragrance.name,
                fragrance.flash_point_celsius,
                fragrance.specific_gravity,
                fragrance.max_load_percentage,
                fragrance.heat_index,
                fragrance.category,
                fragrance.density_rating.to_db_str(),
            ],
        )?;
        Ok(())
    }

    pub fn find_fragrance_by_id(&self, id: &str) -> RepositoryResult<Option<FragranceOil>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM fragrance_oils WHERE id = ?1", FRAGRANCE_COLUMNS);
        let fragrance = conn.query_row(&sql, params![id], map_fragrance).optional()?;
        Ok(fragrance)
    }

    pub fn find_fragrance_by_name(&self, name: &str) -> RepositoryResult<Option<FragranceOil>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM fragrance_oils WHERE name = ?1 LIMIT 1",
            FRAGRANCE_COLUMNS
        );
        let fragrance = conn.query_row(&sql, params![name], map_fragrance).optional()?;
        Ok(fragrance)
    }

    // ==========================================
    // 烛芯
    // ==========================================

    pub fn upsert_wick(&self, wick: &Wick) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO wicks (id, name, series, size, size_index)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                series = excluded.series,
                size = excluded.size,
                size_index = excluded.size_index
            "#,
            params![wick.id, wick.name, wick.series, wick.size, wick.size_index],
        )?;
        Ok(())
    }

    pub fn find_wick_by_id(&self, id: &str) -> RepositoryResult<Option<Wick>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM wicks WHERE id = ?1", WICK_COLUMNS);
        let wick = conn.query_row(&sql, params![id], map_wick).optional()?;
        Ok(wick)
    }

    /// 按名称查询烛芯（不区分大小写，如 "cd-6" 命中 "CD-6"）
    pub fn find_wick_by_name(&self, name: &str) -> RepositoryResult<Option<Wick>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM wicks WHERE name = ?1 COLLATE NOCASE LIMIT 1",
            WICK_COLUMNS
        );
        let wick = conn.query_row(&sql, params![name], map_wick).optional()?;
        Ok(wick)
    }

    /// 查询系列内全部烛芯, 按 size_index 升序（同值按 id 升序）
    pub fn list_wicks_by_series(&self, series: &str) -> RepositoryResult<Vec<Wick>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM wicks WHERE series = ?1 ORDER BY size_index ASC, id ASC",
            WICK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let wicks = stmt
            .query_map(params![series], map_wick)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(wicks)
    }
}

// ==========================================
// 行映射
// ==========================================

fn map_vessel(row: &Row<'_>) -> SqliteResult<Vessel> {
    Ok(Vessel {
        id: row.get(0)?,
        item_id: row.get(1)?,
        name: row.get(2)?,
        volume_ml: row.get(3)?,
        diameter_mm: row.get(4)?,
        height_mm: row.get(5)?,
        shape: row.get(6)?,
        material: row.get(7)?,
        double_wick: row.get::<_, i32>(8)? != 0,
        heat_dissipation_factor: row.get(9)?,
    })
}

fn map_wax_type(row: &Row<'_>) -> SqliteResult<WaxType> {
    Ok(WaxType {
        id: row.get(0)?,
        name: row.get(1)?,
        melt_point_celsius: row.get(2)?,
        viscosity_index: row.get(3)?,
        base_type: WaxBaseType::from_str(&row.get::<_, String>(4)?),
    })
}

fn map_fragrance(row: &Row<'_>) -> SqliteResult<FragranceOil> {
    Ok(FragranceOil {
        id: row.get(0)?,
        item_id: row.get(1)?,
        name: row.get(2)?,
        flash_point_celsius: row.get(3)?,
        specific_gravity: row.get(4)?,
        max_load_percentage: row.get(5)?,
        heat_index: row.get(6)?,
        category: row.get(7)?,
        density_rating: row
            .get::<_, Option<String>>(8)?
            .map(|s| DensityRating::from_str(&s))
            .unwrap_or_default(),
    })
}

fn map_wick(row: &Row<'_>) -> SqliteResult<Wick> {
    Ok(Wick {
        id: row.get(0)?,
        name: row.get(1)?,
        series: row.get(2)?,
        size: row.get(3)?,
        size_index: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    fn repo() -> ComponentRepository {
        ComponentRepository::from_connection(Arc::new(Mutex::new(open_in_memory().unwrap())))
    }

    fn wick(id: &str, series: &str, size_index: i32) -> Wick {
        Wick {
            id: id.to_string(),
            name: id.to_uppercase(),
            series: series.to_string(),
            size: Some(size_index as f64),
            size_index,
        }
    }

    #[test]
    fn test_wicks_by_series_sorted_by_size_index() {
        let repo = repo();
        repo.upsert_wick(&wick("cd-10", "CD", 10)).unwrap();
        repo.upsert_wick(&wick("cd-4", "CD", 4)).unwrap();
        repo.upsert_wick(&wick("eco-6", "ECO", 6)).unwrap();
        repo.upsert_wick(&wick("cd-6", "CD", 6)).unwrap();

        let series = repo.list_wicks_by_series("CD").unwrap();
        let indexes: Vec<i32> = series.iter().map(|w| w.size_index).collect();
        assert_eq!(indexes, vec![4, 6, 10]);
    }

    #[test]
    fn test_find_wick_by_name_case_insensitive() {
        let repo = repo();
        repo.upsert_wick(&wick("cd-6", "CD", 6)).unwrap();
        let found = repo.find_wick_by_name("Cd-6").unwrap();
        assert_eq!(found.map(|w| w.id), Some("cd-6".to_string()));
        assert!(repo.find_wick_by_name("LX-99").unwrap().is_none());
    }

    #[test]
    fn test_missing_density_defaults_to_medium() {
        let repo = repo();
        {
            let conn = repo.get_conn().unwrap();
            conn.execute(
                "INSERT INTO fragrance_oils (id, name, flash_point_celsius, heat_index) VALUES ('f1', 'Vanilla', 93.0, 0.2)",
                [],
            )
            .unwrap();
        }
        let fragrance = repo.find_fragrance_by_id("f1").unwrap().unwrap();
        assert_eq!(fragrance.density_rating, DensityRating::Medium);
    }
}
