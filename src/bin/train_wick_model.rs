// Offline batch: train the wick classifier from approved assemblies and publish
// a new versioned artifact plus the rolling latest pointer.
//
// Usage:
//   cargo run --bin train_wick_model -- [db_path] [model_dir]
//
// Paths default the same way the app does (env var, then config, then user data dir).
// Set WICK_ADVISOR_LOG_FORMAT=json for JSON-line logs (scheduled runs).

use std::sync::{Arc, Mutex};

use wick_advisor::app::{get_default_db_path, get_default_model_dir};
use wick_advisor::config::ConfigManager;
use wick_advisor::db::{init_schema, open_sqlite_connection};
use wick_advisor::logging;
use wick_advisor::ml::{ModelStore, WickModelTrainer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match std::env::var("WICK_ADVISOR_LOG_FORMAT") {
        Ok(format) if format.eq_ignore_ascii_case("json") => logging::init_json(),
        _ => logging::init(),
    }

    let mut args = std::env::args().skip(1);
    let db_path = args
        .next()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(get_default_db_path);

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;
    let conn = Arc::new(Mutex::new(conn));

    let model_dir = match args.next().filter(|s| !s.trim().is_empty()) {
        Some(dir) => dir,
        None => {
            let config = ConfigManager::from_connection(conn.clone())?.load_engine_config()?;
            get_default_model_dir(&config)
        }
    };

    tracing::info!(db_path = %db_path, model_dir = %model_dir, "开始训练烛芯模型");

    let trainer = WickModelTrainer::from_connection(conn, ModelStore::new(&model_dir));
    let outcome = trainer.train_and_save_model()?;
    let metrics = &outcome.metrics;

    println!("version={}", metrics.version);
    println!("accuracy={:.4}", metrics.accuracy);
    if let (Some(mean), Some(std)) = (metrics.cv_score_mean, metrics.cv_score_std) {
        println!("cv_score={:.4} (+/- {:.4})", mean, std);
    }
    println!(
        "samples={} train={} test={} classes={}",
        metrics.sample_size, metrics.train_size, metrics.test_size, metrics.n_classes
    );
    println!("top_features={}", metrics.top_features.join(","));
    if let Some(path) = &outcome.artifact_path {
        println!("artifact={}", path.display());
    }
    Ok(())
}
