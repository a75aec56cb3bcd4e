// ==========================================
// WickApi 集成测试
// ==========================================
// 测试目标: AppState 装配 → 推荐 / 快速核对 / 测试回写 / 重新训练 / 分析
// ==========================================

mod test_helpers;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tempfile::{NamedTempFile, TempDir};
use test_helpers::*;
use wick_advisor::api::{
    ApiError, LogTestRequest, PredictRequest, QuickCheckRequest, HEURISTIC_MODEL_VERSION,
};
use wick_advisor::app::AppState;
use wick_advisor::domain::types::QuickCheckStatus;
use wick_advisor::logging;
use wick_advisor::repository::PredictionRepository;

struct Fixture {
    _db_file: NamedTempFile,
    model_dir: TempDir,
    db_path: String,
    conn: Arc<Mutex<Connection>>,
}

fn fixture() -> Fixture {
    logging::init_test();
    let (db_file, db_path) = create_test_db().unwrap();
    let conn = open_shared(&db_path).unwrap();
    seed_reference_data(&conn).unwrap();
    Fixture {
        _db_file: db_file,
        model_dir: tempfile::tempdir().unwrap(),
        db_path,
        conn,
    }
}

impl Fixture {
    fn state(&self) -> AppState {
        AppState::new(
            self.db_path.clone(),
            Some(self.model_dir.path().to_string_lossy().to_string()),
        )
        .unwrap()
    }
}

fn predict_request(vessel: &str, wax: &str, fragrance: &str) -> PredictRequest {
    PredictRequest {
        vessel_id: vessel.to_string(),
        wax_type_id: wax.to_string(),
        fragrance_id: fragrance.to_string(),
        fragrance_load: 8.5,
        old_wax_id: None,
        current_wick_id: None,
        assembly_id: None,
    }
}

/// 两类可分的训练集: tumbler+soy → cd_8, tin+coco → cd_4
fn seed_training_set(conn: &Arc<Mutex<Connection>>) {
    for i in 0..10 {
        insert_assembly(conn, &format!("t_{}", i), VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA, Some("cd_8"), true).unwrap();
        insert_assembly(conn, &format!("n_{}", i), VESSEL_TIN, WAX_COCO, FRAG_CITRUS, Some("cd_4"), true).unwrap();
    }
}

// ==========================================
// predict
// ==========================================

#[test]
fn test_predict_empty_needs_testing() {
    let fx = fixture();
    let state = fx.state();

    let response = state
        .wick_api
        .predict(predict_request(VESSEL_TIN, WAX_COCO, FRAG_VANILLA))
        .unwrap();

    assert!(response.recommendations.is_empty());
    assert!(response.needs_testing);
    assert_eq!(response.model_version, HEURISTIC_MODEL_VERSION);
    assert_eq!(response.prediction_id, None);
}

#[test]
fn test_predict_persists_top_recommendation() {
    let fx = fixture();
    seed_passing_history(&fx.conn, "hist", VESSEL_TUMBLER, WAX_SOY, "cd_8", 3).unwrap();
    let state = fx.state();

    let mut request = predict_request(VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA);
    request.assembly_id = Some("hist_0".to_string());
    let response = state.wick_api.predict(request).unwrap();

    assert_eq!(response.recommendations.len(), 1);
    assert_eq!(response.recommendations[0].wick_id, "cd_8");
    assert_eq!(response.recommendations[0].confidence, 0.65);
    assert!(!response.needs_testing);

    let prediction_id = response.prediction_id.unwrap();
    let stored = PredictionRepository::from_connection(fx.conn.clone())
        .find_prediction_by_id(&prediction_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.predicted_wick_id, "cd_8");
    assert_eq!(stored.model_version, HEURISTIC_MODEL_VERSION);
    assert_eq!(stored.assembly_id.as_deref(), Some("hist_0"));
    assert!(!stored.verified);
}

#[test]
fn test_predict_low_confidence_needs_testing() {
    let fx = fixture();
    seed_passing_history(&fx.conn, "hist", VESSEL_TUMBLER, WAX_SOY, "cd_8", 1).unwrap();
    let state = fx.state();

    let response = state
        .wick_api
        .predict(predict_request(VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA))
        .unwrap();
    assert_eq!(response.recommendations[0].confidence, 0.55);
    assert!(response.needs_testing);
}

#[test]
fn test_predict_rejects_missing_fields() {
    let fx = fixture();
    let state = fx.state();

    let err = state
        .wick_api
        .predict(predict_request("", WAX_SOY, FRAG_VANILLA))
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));

    let mut request = predict_request(VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA);
    request.fragrance_load = 120.0;
    assert!(matches!(
        state.wick_api.predict(request).unwrap_err(),
        ApiError::InvalidInput(_)
    ));
}

// ==========================================
// quick_check
// ==========================================

fn quick(wick: &str) -> QuickCheckRequest {
    QuickCheckRequest {
        vessel: "8oz Tumbler".to_string(),
        wax: "Soy C3".to_string(),
        fragrance: "Vanilla Bean".to_string(),
        wick: wick.to_string(),
        fragrance_load: None,
    }
}

#[test]
fn test_quick_check_statuses() {
    let fx = fixture();
    seed_passing_history(&fx.conn, "hist", VESSEL_TUMBLER, WAX_SOY, "cd_8", 4).unwrap();
    let state = fx.state();

    let good = state.wick_api.quick_check(quick("CD-8")).unwrap();
    assert_eq!(good.status, QuickCheckStatus::Recommended);
    assert!(good.message.starts_with("Good choice! Based on 4 successful"));
    assert_eq!(good.top_recommendations.len(), 1);
    assert_eq!(good.top_recommendations[0].wick, "CD-8");
    assert_eq!(good.top_recommendations[0].confidence, 0.7);

    let bad = state.wick_api.quick_check(quick("ECO-12")).unwrap();
    assert_eq!(bad.status, QuickCheckStatus::NotRecommended);
    assert_eq!(bad.message, "Not recommended. Try CD-8 instead.");
}

#[test]
fn test_quick_check_without_history() {
    let fx = fixture();
    let state = fx.state();

    let response = state.wick_api.quick_check(quick("CD-8")).unwrap();
    assert_eq!(response.status, QuickCheckStatus::NotRecommended);
    assert_eq!(response.message, "No recommendations available");
    assert!(response.top_recommendations.is_empty());
}

#[test]
fn test_quick_check_unknown_component() {
    let fx = fixture();
    let state = fx.state();

    let mut request = quick("CD-99");
    request.vessel = "16oz Jar".to_string();
    let err = state.wick_api.quick_check(request).unwrap_err();
    match err {
        ApiError::NotFound(msg) => {
            assert!(msg.contains("16oz Jar"));
            assert!(msg.contains("CD-99"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ==========================================
// log_test / test_priorities
// ==========================================

#[test]
fn test_log_test_resolves_wick_by_name() {
    let fx = fixture();
    insert_assembly(&fx.conn, "A1", VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA, None, false).unwrap();
    let prediction_id = insert_prediction(&fx.conn, Some("A1"), VESSEL_TUMBLER, WAX_SOY, "cd_8", 0.4).unwrap();
    let state = fx.state();

    assert_eq!(state.wick_api.test_priorities(None).len(), 1);

    let response = state
        .wick_api
        .log_test(LogTestRequest {
            assembly_id: "A1".to_string(),
            wick_tested: "ECO-10".to_string(),
            passed: true,
            flame_height_mm: Some(35.0),
            melt_pool_mm_at_2h: Some(45.0),
            notes: Some("slight mushrooming".to_string()),
            tested_by: Some("lab_tech_1".to_string()),
            test_type: Some("burn_test".to_string()),
        })
        .unwrap();

    assert_eq!(response.wick_id, "eco_10");
    assert!(response.outcome.is_complete());

    let stored = PredictionRepository::from_connection(fx.conn.clone())
        .find_prediction_by_id(&prediction_id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.actual_wick_id.as_deref(), Some("eco_10"));

    // 已验证的预测不再进入优先级
    assert!(state.wick_api.test_priorities(None).is_empty());
}

#[test]
fn test_log_test_unknown_wick_is_invalid_input() {
    let fx = fixture();
    let state = fx.state();

    let err = state
        .wick_api
        .log_test(LogTestRequest {
            assembly_id: "A1".to_string(),
            wick_tested: "HTP-99".to_string(),
            passed: false,
            flame_height_mm: None,
            melt_pool_mm_at_2h: None,
            notes: None,
            tested_by: None,
            test_type: None,
        })
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(ref msg) if msg.contains("HTP-99")));
}

#[test]
fn test_priorities_are_rounded() {
    let fx = fixture();
    insert_assembly(&fx.conn, "A1", VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA, None, false).unwrap();
    insert_prediction(&fx.conn, Some("A1"), VESSEL_TUMBLER, WAX_SOY, "cd_8", 0.3).unwrap();
    let state = fx.state();

    let priorities = state.wick_api.test_priorities(Some(5));
    assert_eq!(priorities.len(), 1);
    assert_eq!(priorities[0].uncertainty_score, 0.7);
    // 0.7 × ln(2) = 0.48520...
    assert_eq!(priorities[0].information_gain, 0.485);
    assert_eq!(state.wick_api.refresh_test_queue(None).unwrap(), 1);
}

// ==========================================
// 分析
// ==========================================

#[test]
fn test_analytics_views() {
    let fx = fixture();
    seed_passing_history(&fx.conn, "hist", VESSEL_TUMBLER, WAX_SOY, "cd_8", 2).unwrap();
    insert_test_result(&fx.conn, "hist_0", "cd_10", true).unwrap();
    insert_wax_conversion(&fx.conn, VESSEL_TUMBLER, WAX_COCO, WAX_SOY, 2, 0.8, 5).unwrap();
    insert_wax_conversion(&fx.conn, VESSEL_TIN, WAX_SOY, WAX_COCO, -1, 0.6, 3).unwrap();
    let state = fx.state();

    let baseline = state.wick_api.majority_baseline().unwrap();
    assert_eq!(baseline.len(), 1);
    assert_eq!(baseline[0].vessel_name, "8oz Tumbler");
    assert_eq!(baseline[0].recommended_wick_name, "CD-8");
    assert_eq!(baseline[0].sample_size, 2);
    assert_eq!(baseline[0].wick_variety, 2);

    assert_eq!(state.wick_api.wax_conversion_analytics(None).unwrap().len(), 2);
    let tin = state.wick_api.wax_conversion_analytics(Some(VESSEL_TIN)).unwrap();
    assert_eq!(tin.len(), 1);
    assert_eq!(tin[0].wick_size_delta, -1);
    assert_eq!(tin[0].old_wax_name, "Soy C3");

    let heat = state.wick_api.fragrance_heat_index(FRAG_CINNAMON).unwrap();
    assert_eq!(heat.name, "Cinnamon Spice");
    assert!(matches!(
        state.wick_api.fragrance_heat_index("missing"),
        Err(ApiError::NotFound(_))
    ));
}

#[test]
fn test_prediction_error_report() {
    let fx = fixture();
    insert_assembly(&fx.conn, "A1", VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA, None, false).unwrap();
    insert_assembly(&fx.conn, "A2", VESSEL_TIN, WAX_SOY, FRAG_VANILLA, None, false).unwrap();
    insert_prediction(&fx.conn, Some("A1"), VESSEL_TUMBLER, WAX_SOY, "cd_8", 0.3).unwrap();
    insert_prediction(&fx.conn, Some("A2"), VESSEL_TIN, WAX_SOY, "cd_6", 0.7).unwrap();
    let state = fx.state();

    for (assembly, wick) in [("A1", "CD-10"), ("A2", "CD-6")] {
        state
            .wick_api
            .log_test(LogTestRequest {
                assembly_id: assembly.to_string(),
                wick_tested: wick.to_string(),
                passed: true,
                flame_height_mm: None,
                melt_pool_mm_at_2h: None,
                notes: None,
                tested_by: None,
                test_type: None,
            })
            .unwrap();
    }

    let report = state.wick_api.prediction_errors().unwrap();
    assert_eq!(report.error_count, 1);
    assert_eq!(report.low_confidence_errors, 1);
    assert_eq!(report.low_confidence_percentage, 100.0);
    assert_eq!(report.top_vessels[0].name, "8oz Tumbler");
    assert_eq!(report.top_waxes[0].errors, 1);
}

// ==========================================
// retrain
// ==========================================

#[test]
fn test_retrain_hot_swaps_model() {
    let fx = fixture();
    seed_training_set(&fx.conn);
    let state = fx.state();
    assert!(!state.model_handle.is_loaded());

    let response = state.wick_api.retrain().unwrap();
    assert_eq!(response.sample_size, 20);
    assert!(response.accuracy >= 0.5);
    assert!(response.artifact_path.is_some());
    assert_eq!(state.model_handle.version(), Some(response.model_version.clone()));

    let predicted = state
        .wick_api
        .predict(predict_request(VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA))
        .unwrap();
    assert_eq!(predicted.model_version, response.model_version);
    assert_eq!(predicted.recommendations[0].wick_id, "cd_8");
    assert_eq!(
        predicted.recommendations[0].reasoning,
        format!("ML model prediction (v{})", response.model_version)
    );

    let curves = state.wick_api.learning_curves().unwrap();
    assert_eq!(curves.runs.len(), 1);
    assert_eq!(curves.current_accuracy, Some(response.accuracy));
    assert_eq!(curves.improvement, 0.0);

    // 重启后从模型目录加载 latest
    let restarted = fx.state();
    assert_eq!(restarted.model_handle.version(), Some(response.model_version));
}

#[test]
fn test_retrain_insufficient_data() {
    let fx = fixture();
    insert_assembly(&fx.conn, "only", VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA, Some("cd_8"), true).unwrap();
    let state = fx.state();

    let err = state.wick_api.retrain().unwrap_err();
    assert!(matches!(err, ApiError::InsufficientTrainingData(_)));
    assert!(!state.model_handle.is_loaded());
}
