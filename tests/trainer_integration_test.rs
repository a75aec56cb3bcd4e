// ==========================================
// 模型训练集成测试
// ==========================================
// 测试目标: 已批准配方 → 训练 → 制品落盘 → 加载 → 模型策略推荐
// ==========================================

mod test_helpers;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use test_helpers::*;
use wick_advisor::domain::RecommendationRequest;
use wick_advisor::engine::learned::ml_predictions;
use wick_advisor::engine::{ModelHandle, SqliteAttributeStore};
use wick_advisor::logging;
use wick_advisor::ml::trainer::TRAINING_RUN_MODEL_TYPE;
use wick_advisor::ml::{MlError, ModelStore, WickModelTrainer};
use wick_advisor::repository::TrainingRunRepository;

fn seed_two_classes(conn: &Arc<Mutex<Connection>>) {
    for i in 0..10 {
        insert_assembly(conn, &format!("t_{}", i), VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA, Some("cd_8"), true).unwrap();
        insert_assembly(conn, &format!("n_{}", i), VESSEL_TIN, WAX_COCO, FRAG_CITRUS, Some("cd_4"), true).unwrap();
    }
}

#[test]
fn test_prepare_training_data_only_approved_with_wick() {
    logging::init_test();
    let (_db, conn) = seeded_db().unwrap();
    seed_two_classes(&conn);
    insert_assembly(&conn, "draft", VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA, Some("cd_8"), false).unwrap();
    insert_assembly(&conn, "no_wick", VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA, None, true).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let trainer = WickModelTrainer::from_connection(conn, ModelStore::new(dir.path()));
    let records = trainer.prepare_training_data().unwrap();

    assert_eq!(records.len(), 20);
    assert!(records.iter().all(|r| r.wick_id == "cd_8" || r.wick_id == "cd_4"));
}

#[test]
fn test_train_and_save_model_end_to_end() {
    logging::init_test();
    let (_db, conn) = seeded_db().unwrap();
    seed_two_classes(&conn);

    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path());
    let trainer = WickModelTrainer::from_connection(conn.clone(), store.clone());

    let outcome = trainer.train_and_save_model().unwrap();
    let metrics = &outcome.metrics;
    assert_eq!(metrics.sample_size, 20);
    assert_eq!(metrics.n_classes, 2);
    assert_eq!(metrics.train_size + metrics.test_size, 20);
    assert!(metrics.test_size >= 2);
    assert!(metrics.accuracy >= 0.5);
    assert!(metrics.top_features.len() <= 5);
    assert!(metrics.boosting_rounds >= 1);

    // 版本文件 + latest
    let path = outcome.artifact_path.clone().unwrap();
    assert!(path.exists());
    assert!(dir.path().join("wick_predictor_latest.json").exists());
    assert_eq!(store.list_versions().unwrap(), vec![metrics.version.clone()]);
    assert_eq!(store.load_latest().unwrap().version, metrics.version);

    // 训练历史
    let runs = TrainingRunRepository::from_connection(conn)
        .list_recent(TRAINING_RUN_MODEL_TYPE, 10)
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].version, metrics.version);
    assert_eq!(runs[0].sample_size, 20);
    let stored: serde_json::Value = serde_json::from_str(&runs[0].metrics_json).unwrap();
    assert_eq!(stored["n_classes"], 2);
}

#[test]
fn test_loaded_model_drives_ml_strategy() {
    logging::init_test();
    let (_db, conn) = seeded_db().unwrap();
    seed_two_classes(&conn);

    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path());
    let outcome = WickModelTrainer::from_connection(conn.clone(), store.clone())
        .train_and_save_model()
        .unwrap();

    let handle = ModelHandle::load_latest(&store);
    assert_eq!(handle.version(), Some(outcome.metrics.version.clone()));

    let attributes = SqliteAttributeStore::from_connection(conn);
    let request = RecommendationRequest::new(
        VESSEL_TUMBLER.to_string(),
        WAX_SOY.to_string(),
        FRAG_VANILLA.to_string(),
        8.0,
    );
    let recs = ml_predictions(&attributes, &handle, &request, 3, 0.10).unwrap();

    assert!(!recs.is_empty());
    assert_eq!(recs[0].wick_id, "cd_8");
    assert_eq!(recs[0].wick_name, "CD-8");
    assert_eq!(recs[0].rank, 1);
    assert!(recs[0].confidence > 0.5);
    assert!(recs[0].reasoning.starts_with("ML model prediction (v"));
}

#[test]
fn test_missing_model_directory_gives_empty_handle() {
    logging::init_test();
    let dir = tempfile::tempdir().unwrap();
    let store = ModelStore::new(dir.path().join("nothing_here"));

    let handle = ModelHandle::load_latest(&store);
    assert!(!handle.is_loaded());
    assert!(store.list_versions().unwrap().is_empty());
    assert!(matches!(store.load_latest(), Err(MlError::ModelUnavailable(_))));
}

#[test]
fn test_single_class_is_insufficient() {
    logging::init_test();
    let (_db, conn) = seeded_db().unwrap();
    for i in 0..5 {
        insert_assembly(&conn, &format!("t_{}", i), VESSEL_TUMBLER, WAX_SOY, FRAG_VANILLA, Some("cd_8"), true).unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let trainer = WickModelTrainer::from_connection(conn.clone(), ModelStore::new(dir.path()));
    assert!(matches!(
        trainer.train_and_save_model(),
        Err(MlError::InsufficientData(_))
    ));

    // 失败不写制品也不写训练历史
    assert!(!dir.path().join("wick_predictor_latest.json").exists());
    let runs = TrainingRunRepository::from_connection(conn)
        .list_recent(TRAINING_RUN_MODEL_TYPE, 10)
        .unwrap();
    assert!(runs.is_empty());
}

#[test]
fn test_learning_curve_improvement_across_runs() {
    logging::init_test();
    let (_db, conn) = seeded_db().unwrap();
    let repo = TrainingRunRepository::from_connection(conn.clone());

    for (i, accuracy) in [0.60, 0.75].into_iter().enumerate() {
        repo.insert(&wick_advisor::domain::prediction::TrainingRun {
            model_type: TRAINING_RUN_MODEL_TYPE.to_string(),
            version: format!("2024010{}_000000", i + 1),
            accuracy,
            cv_score: None,
            sample_size: 50,
            metrics_json: "{}".to_string(),
            created_at: chrono::Utc::now() + chrono::Duration::seconds(i as i64),
        })
        .unwrap();
    }

    let dir = tempfile::tempdir().unwrap();
    let curves = WickModelTrainer::from_connection(conn, ModelStore::new(dir.path()))
        .learning_curves()
        .unwrap();
    assert_eq!(curves.runs.len(), 2);
    assert_eq!(curves.current_accuracy, Some(0.75));
    assert!((curves.improvement - 0.15).abs() < 1e-9);
}
