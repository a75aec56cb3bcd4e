// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库初始化、参考数据与历史数据播种
// ==========================================
#![allow(dead_code)]

use std::error::Error;
use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use rusqlite::Connection;
use tempfile::NamedTempFile;

use wick_advisor::db::{init_schema, open_sqlite_connection};
use wick_advisor::domain::{
    Assembly, FragranceOil, TestResult, Vessel, WaxConversionDelta, WaxType, Wick, WickPrediction,
};
use wick_advisor::domain::types::{DensityRating, TestType, WaxBaseType};
use wick_advisor::repository::{AssemblyRepository, ComponentRepository, PredictionRepository};

// ===== 参考数据 ID =====
pub const VESSEL_TUMBLER: &str = "v_tumbler";
pub const VESSEL_TIN: &str = "v_tin";
pub const WAX_SOY: &str = "w_soy";
pub const WAX_COCO: &str = "w_coco";
pub const FRAG_VANILLA: &str = "f_vanilla"; // heat 0, medium → 修正 0
pub const FRAG_CINNAMON: &str = "f_cinnamon"; // heat 0, heavy → 修正 +1
pub const FRAG_EUCALYPTUS: &str = "f_eucalyptus"; // heat -1, light → 修正 +1
pub const FRAG_CITRUS: &str = "f_citrus"; // heat 1, light → 修正 -1

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file
        .path()
        .to_str()
        .ok_or("临时文件路径不是 UTF-8")?
        .to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接（仓储/引擎共用）
pub fn open_shared(db_path: &str) -> Result<Arc<Mutex<Connection>>, Box<dyn Error>> {
    let conn = open_sqlite_connection(db_path)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 临时库 + 已播种参考数据
pub fn seeded_db() -> Result<(NamedTempFile, Arc<Mutex<Connection>>), Box<dyn Error>> {
    let (temp_file, db_path) = create_test_db()?;
    let conn = open_shared(&db_path)?;
    seed_reference_data(&conn)?;
    Ok((temp_file, conn))
}

fn vessel(id: &str, name: &str, volume: f64, diameter: f64, height: f64, shape: &str, material: &str) -> Vessel {
    Vessel {
        id: id.to_string(),
        item_id: Some(format!("VES-{}", name.to_uppercase().replace(' ', "-"))),
        name: name.to_string(),
        volume_ml: volume,
        diameter_mm: diameter,
        height_mm: height,
        shape: Some(shape.to_string()),
        material: Some(material.to_string()),
        double_wick: false,
        heat_dissipation_factor: 1.0,
    }
}

fn fragrance(id: &str, name: &str, heat_index: f64, density: DensityRating, category: &str) -> FragranceOil {
    FragranceOil {
        id: id.to_string(),
        item_id: None,
        name: name.to_string(),
        flash_point_celsius: 90.0,
        specific_gravity: Some(1.0),
        max_load_percentage: Some(10.0),
        heat_index,
        category: Some(category.to_string()),
        density_rating: density,
    }
}

pub fn wick(series: &str, size_index: i32) -> Wick {
    Wick {
        id: format!("{}_{}", series.to_lowercase(), size_index),
        name: format!("{}-{}", series, size_index),
        series: series.to_string(),
        size: Some(size_index as f64),
        size_index,
    }
}

/// 播种参考数据
///
/// - 容器: 8oz Tumbler / 4oz Tin
/// - 蜡: Soy C3 / Coconut 83
/// - 香精: 四种热指数/密度组合
/// - 烛芯: CD-4..CD-14（偶数）, ECO-6..ECO-12（偶数）
pub fn seed_reference_data(conn: &Arc<Mutex<Connection>>) -> Result<(), Box<dyn Error>> {
    let repo = ComponentRepository::from_connection(conn.clone());

    repo.upsert_vessel(&vessel(VESSEL_TUMBLER, "8oz Tumbler", 236.0, 75.0, 90.0, "tumbler", "glass"))?;
    repo.upsert_vessel(&vessel(VESSEL_TIN, "4oz Tin", 118.0, 65.0, 55.0, "tin", "metal"))?;

    repo.upsert_wax_type(&WaxType {
        id: WAX_SOY.to_string(),
        name: "Soy C3".to_string(),
        melt_point_celsius: 52.0,
        viscosity_index: 0.4,
        base_type: WaxBaseType::Soy,
    })?;
    repo.upsert_wax_type(&WaxType {
        id: WAX_COCO.to_string(),
        name: "Coconut 83".to_string(),
        melt_point_celsius: 48.0,
        viscosity_index: 0.3,
        base_type: WaxBaseType::Coconut,
    })?;

    repo.upsert_fragrance(&fragrance(FRAG_VANILLA, "Vanilla Bean", 0.0, DensityRating::Medium, "gourmand"))?;
    repo.upsert_fragrance(&fragrance(FRAG_CINNAMON, "Cinnamon Spice", 0.0, DensityRating::Heavy, "spice"))?;
    repo.upsert_fragrance(&fragrance(FRAG_EUCALYPTUS, "Eucalyptus Mint", -1.0, DensityRating::Light, "fresh"))?;
    repo.upsert_fragrance(&fragrance(FRAG_CITRUS, "Citrus Burst", 1.0, DensityRating::Light, "citrus"))?;

    for size in [4, 6, 8, 10, 12, 14] {
        repo.upsert_wick(&wick("CD", size))?;
    }
    for size in [6, 8, 10, 12] {
        repo.upsert_wick(&wick("ECO", size))?;
    }
    Ok(())
}

/// 写入配方（approved = true 时写入固定批准日期）
#[allow(clippy::too_many_arguments)]
pub fn insert_assembly(
    conn: &Arc<Mutex<Connection>>,
    id: &str,
    vessel_id: &str,
    wax_type_id: &str,
    fragrance_id: &str,
    wick_id: Option<&str>,
    approved: bool,
) -> Result<(), Box<dyn Error>> {
    let repo = AssemblyRepository::from_connection(conn.clone());
    repo.upsert_assembly(&Assembly {
        id: id.to_string(),
        name: format!("Assembly {}", id),
        vessel_id: vessel_id.to_string(),
        wax_type_id: wax_type_id.to_string(),
        fragrance_oil_id: fragrance_id.to_string(),
        fragrance_load_percentage: Some(8.0),
        wick_id: wick_id.map(str::to_string),
        approved_date: if approved {
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).single()
        } else {
            None
        },
        status: Some("active".to_string()),
    })?;
    Ok(())
}

/// 写入一条测试结果
pub fn insert_test_result(
    conn: &Arc<Mutex<Connection>>,
    assembly_id: &str,
    wick_id: &str,
    passed: bool,
) -> Result<(), Box<dyn Error>> {
    let repo = PredictionRepository::from_connection(conn.clone());
    repo.insert_test_result(&TestResult {
        id: uuid::Uuid::new_v4().to_string(),
        assembly_id: assembly_id.to_string(),
        wick_id_tested: wick_id.to_string(),
        test_date: Utc::now(),
        test_type: TestType::BurnTest,
        flame_height_mm: Some(30.0),
        melt_pool_mm_at_2h: Some(60.0),
        passed,
        notes: None,
        tested_by: Some("lab".to_string()),
    })?;
    Ok(())
}

/// 写入待验证预测, 返回预测 ID
pub fn insert_prediction(
    conn: &Arc<Mutex<Connection>>,
    assembly_id: Option<&str>,
    vessel_id: &str,
    wax_type_id: &str,
    predicted_wick_id: &str,
    confidence: f64,
) -> Result<String, Box<dyn Error>> {
    let repo = PredictionRepository::from_connection(conn.clone());
    let prediction = WickPrediction::new_pending(
        assembly_id.map(str::to_string),
        vessel_id.to_string(),
        wax_type_id.to_string(),
        FRAG_VANILLA.to_string(),
        8.0,
        predicted_wick_id.to_string(),
        confidence,
        "heuristic_v1".to_string(),
    );
    repo.insert_prediction(&prediction)?;
    Ok(prediction.id)
}

/// 写入换蜡增量
pub fn insert_wax_conversion(
    conn: &Arc<Mutex<Connection>>,
    vessel_id: &str,
    old_wax_type_id: &str,
    new_wax_type_id: &str,
    wick_size_delta: i32,
    confidence_score: f64,
    sample_count: i64,
) -> Result<(), Box<dyn Error>> {
    let repo = AssemblyRepository::from_connection(conn.clone());
    repo.upsert_wax_conversion_delta(&WaxConversionDelta {
        vessel_id: vessel_id.to_string(),
        old_wax_type_id: old_wax_type_id.to_string(),
        new_wax_type_id: new_wax_type_id.to_string(),
        wick_size_delta,
        confidence_score,
        sample_count,
    })?;
    Ok(())
}

/// 同一 (容器, 蜡) 下 n 次通过测试, 均使用同一烛芯
///
/// 每次测试对应一个独立配方（id = `{prefix}_{i}`）
pub fn seed_passing_history(
    conn: &Arc<Mutex<Connection>>,
    prefix: &str,
    vessel_id: &str,
    wax_type_id: &str,
    wick_id: &str,
    n: usize,
) -> Result<(), Box<dyn Error>> {
    for i in 0..n {
        let assembly_id = format!("{}_{}", prefix, i);
        insert_assembly(conn, &assembly_id, vessel_id, wax_type_id, FRAG_VANILLA, Some(wick_id), true)?;
        insert_test_result(conn, &assembly_id, wick_id, true)?;
    }
    Ok(())
}
