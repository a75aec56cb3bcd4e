// ==========================================
// 配置集成测试
// ==========================================
// 测试目标: config_kv 中的 wick.* 覆盖项经 AppState 装配后生效
// ==========================================

mod test_helpers;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use test_helpers::*;
use wick_advisor::api::PredictRequest;
use wick_advisor::app::AppState;
use wick_advisor::config::{config_keys, ConfigManager, EngineConfig};
use wick_advisor::domain::CatalogAssembly;
use wick_advisor::logging;
use wick_advisor::repository::AssemblyRepository;

fn set(conn: &Arc<Mutex<Connection>>, key: &str, value: &str) {
    ConfigManager::from_connection(conn.clone())
        .unwrap()
        .set_global_config_value(key, value)
        .unwrap();
}

fn seed_catalog(conn: &Arc<Mutex<Connection>>) {
    let repo = AssemblyRepository::from_connection(conn.clone());
    for (item_id, display_name) in [
        ("CDL-8OZ-VANILLA-CD12", "8oz Tumbler Vanilla Bean CD-12"),
        ("CDL-8OZ-VANILLA-WZ3", "8oz Tumbler Vanilla Bean WZ-3"),
    ] {
        repo.upsert_catalog_assembly(&CatalogAssembly {
            item_id: item_id.to_string(),
            display_name: display_name.to_string(),
            oz_fill: None,
        })
        .unwrap();
    }
}

fn request() -> PredictRequest {
    PredictRequest {
        vessel_id: VESSEL_TUMBLER.to_string(),
        wax_type_id: WAX_SOY.to_string(),
        fragrance_id: FRAG_VANILLA.to_string(),
        fragrance_load: 8.0,
        old_wax_id: None,
        current_wick_id: None,
        assembly_id: None,
    }
}

#[test]
fn test_app_state_uses_defaults_without_overrides() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let dir = tempfile::tempdir().unwrap();

    let state = AppState::new(db_path, Some(dir.path().to_string_lossy().to_string())).unwrap();
    assert_eq!(state.engine_config, EngineConfig::default());
}

#[test]
fn test_threshold_and_limit_overrides() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let conn = open_shared(&db_path).unwrap();
    seed_reference_data(&conn).unwrap();
    seed_passing_history(&conn, "hist", VESSEL_TUMBLER, WAX_SOY, "cd_8", 3).unwrap();
    insert_wax_conversion(&conn, VESSEL_TUMBLER, WAX_COCO, WAX_SOY, 4, 0.8, 5).unwrap();

    set(&conn, config_keys::LOW_CONFIDENCE_THRESHOLD, "0.7");
    set(&conn, config_keys::MAX_RECOMMENDATIONS, "1");
    set(&conn, config_keys::PRIORITY_LIMIT, "oops");

    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(db_path, Some(dir.path().to_string_lossy().to_string())).unwrap();
    assert_eq!(state.engine_config.low_confidence_threshold, 0.7);
    assert_eq!(state.engine_config.max_recommendations, 1);
    assert_eq!(state.engine_config.priority_limit, 20);

    let mut req = request();
    req.old_wax_id = Some(WAX_COCO.to_string());
    req.current_wick_id = Some("cd_6".to_string());
    let response = state.wick_api.predict(req).unwrap();

    // 换蜡推荐 cd_10 (0.8) 与多数投票 cd_8 (0.65) 只保留一条
    assert_eq!(response.recommendations.len(), 1);
    assert_eq!(response.recommendations[0].wick_id, "cd_10");
    assert!(!response.needs_testing);

    let plain = state.wick_api.predict(request()).unwrap();
    assert_eq!(plain.recommendations[0].confidence, 0.65);
    // 0.65 < 0.7
    assert!(plain.needs_testing);
}

#[test]
fn test_custom_series_prefixes_drive_catalog_matching() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let conn = open_shared(&db_path).unwrap();
    seed_reference_data(&conn).unwrap();
    seed_catalog(&conn);

    set(
        &conn,
        config_keys::SERIES_PREFIXES,
        r#"[{"series":"WZ","pattern":"wz[-\\s]*(\\d+)"}]"#,
    );

    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(db_path, Some(dir.path().to_string_lossy().to_string())).unwrap();
    assert_eq!(state.engine_config.series_prefixes.len(), 1);

    let response = state.wick_api.predict(request()).unwrap();
    let ids: Vec<&str> = response
        .recommendations
        .iter()
        .map(|r| r.wick_id.as_str())
        .collect();
    assert_eq!(ids, vec!["wick_wz_3"]);
    assert_eq!(response.recommendations[0].wick_name, "WZ-3");
    assert_eq!(response.recommendations[0].confidence, 0.95);
}

#[test]
fn test_invalid_series_prefixes_fall_back_to_defaults() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let conn = open_shared(&db_path).unwrap();
    seed_reference_data(&conn).unwrap();
    seed_catalog(&conn);

    set(&conn, config_keys::SERIES_PREFIXES, "{not json");

    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(db_path, Some(dir.path().to_string_lossy().to_string())).unwrap();
    assert_eq!(
        state.engine_config.series_prefixes,
        wick_advisor::config::default_series_prefixes()
    );

    let response = state.wick_api.predict(request()).unwrap();
    assert_eq!(response.recommendations.len(), 1);
    assert_eq!(response.recommendations[0].wick_id, "cd_12");
    assert_eq!(response.recommendations[0].wick_name, "CD-12");
}

#[test]
fn test_model_dir_from_config() {
    logging::init_test();
    let (_db, db_path) = create_test_db().unwrap();
    let conn = open_shared(&db_path).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let configured = dir.path().join("configured_models").to_string_lossy().to_string();
    set(&conn, config_keys::MODEL_DIR, &configured);

    let config = ConfigManager::from_connection(conn)
        .unwrap()
        .load_engine_config()
        .unwrap();
    assert_eq!(config.model_dir.as_deref(), Some(configured.as_str()));
}
