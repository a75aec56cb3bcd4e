// ==========================================
// 蜡烛烛芯推荐系统 - SQLite 连接初始化与建库
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 建库脚本幂等（CREATE ... IF NOT EXISTS）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存库并建表（测试/演示用）
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化全部表结构（幂等）
///
/// 说明：
/// - wick_majority_baseline 是视图：按 (容器, 蜡) 统计通过测试次数最多的烛芯，
///   次数相同时取 wick_id 较小者，保证结果确定
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    match read_schema_version(conn)? {
        Some(v) if v > CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                "数据库 schema_version={} 高于代码期望版本 {}，请确认程序版本",
                v,
                CURRENT_SCHEMA_VERSION
            );
        }
        _ => {}
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL DEFAULT 'global',
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS vessels (
    id TEXT PRIMARY KEY,
    item_id TEXT,
    name TEXT NOT NULL,
    volume_ml REAL NOT NULL,
    diameter_mm REAL NOT NULL,
    height_mm REAL NOT NULL,
    shape TEXT,
    material TEXT,
    double_wick INTEGER NOT NULL DEFAULT 0,
    heat_dissipation_factor REAL NOT NULL DEFAULT 1.0
);

CREATE TABLE IF NOT EXISTS wax_types (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    melt_point_celsius REAL NOT NULL,
    viscosity_index REAL NOT NULL,
    base_type TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fragrance_oils (
    id TEXT PRIMARY KEY,
    item_id TEXT,
    name TEXT NOT NULL,
    flash_point_celsius REAL NOT NULL,
    specific_gravity REAL,
    max_load_percentage REAL,
    heat_index REAL NOT NULL DEFAULT 0,
    fragrance_category TEXT,
    density_rating TEXT
);

CREATE TABLE IF NOT EXISTS wicks (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    series TEXT NOT NULL,
    size REAL,
    size_index INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_wicks_series ON wicks(series, size_index);

CREATE TABLE IF NOT EXISTS assemblies (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    vessel_id TEXT NOT NULL REFERENCES vessels(id),
    wax_type_id TEXT NOT NULL REFERENCES wax_types(id),
    fragrance_oil_id TEXT NOT NULL REFERENCES fragrance_oils(id),
    fragrance_load_percentage REAL,
    wick_id_1 TEXT REFERENCES wicks(id),
    approved_date TEXT,
    status TEXT
);
CREATE INDEX IF NOT EXISTS idx_assemblies_pair ON assemblies(vessel_id, wax_type_id);

CREATE TABLE IF NOT EXISTS catalog_assemblies (
    item_id TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    oz_fill REAL
);

CREATE TABLE IF NOT EXISTS wax_conversion_deltas (
    vessel_id TEXT NOT NULL REFERENCES vessels(id),
    old_wax_type_id TEXT NOT NULL REFERENCES wax_types(id),
    new_wax_type_id TEXT NOT NULL REFERENCES wax_types(id),
    wick_size_delta INTEGER NOT NULL,
    confidence_score REAL NOT NULL,
    sample_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (vessel_id, old_wax_type_id, new_wax_type_id)
);

CREATE TABLE IF NOT EXISTS test_results (
    id TEXT PRIMARY KEY,
    assembly_id TEXT NOT NULL,
    wick_id_tested TEXT NOT NULL,
    test_date TEXT NOT NULL,
    test_type TEXT NOT NULL,
    flame_height_mm REAL,
    melt_pool_mm_at_2h REAL,
    passed INTEGER NOT NULL,
    notes TEXT,
    tested_by TEXT
);
CREATE INDEX IF NOT EXISTS idx_test_results_assembly ON test_results(assembly_id);

CREATE TABLE IF NOT EXISTS wick_predictions (
    id TEXT PRIMARY KEY,
    assembly_id TEXT,
    vessel_id TEXT NOT NULL,
    wax_type_id TEXT NOT NULL,
    fragrance_id TEXT NOT NULL,
    fragrance_load_percentage REAL NOT NULL,
    predicted_wick_id TEXT NOT NULL,
    confidence_score REAL NOT NULL,
    model_version TEXT NOT NULL,
    verified INTEGER NOT NULL DEFAULT 0,
    verification_date TEXT,
    actual_wick_id TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_predictions_pending ON wick_predictions(verified, confidence_score);

CREATE TABLE IF NOT EXISTS test_priority_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    assembly_id TEXT NOT NULL,
    priority_score REAL NOT NULL,
    reason TEXT NOT NULL,
    completed INTEGER NOT NULL DEFAULT 0,
    completed_date TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ml_training_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    model_type TEXT NOT NULL,
    version TEXT NOT NULL,
    accuracy REAL NOT NULL,
    cv_score REAL,
    sample_size INTEGER NOT NULL,
    metrics TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE VIEW IF NOT EXISTS wick_majority_baseline AS
WITH passes AS (
    SELECT a.vessel_id, a.wax_type_id, t.wick_id_tested AS wick_id, COUNT(*) AS uses
    FROM test_results t
    JOIN assemblies a ON a.id = t.assembly_id
    WHERE t.passed = 1
    GROUP BY a.vessel_id, a.wax_type_id, t.wick_id_tested
),
ranked AS (
    SELECT
        vessel_id, wax_type_id, wick_id, uses,
        ROW_NUMBER() OVER (PARTITION BY vessel_id, wax_type_id ORDER BY uses DESC, wick_id ASC) AS rn,
        COUNT(*) OVER (PARTITION BY vessel_id, wax_type_id) AS wick_variety
    FROM passes
)
SELECT vessel_id, wax_type_id, wick_id AS recommended_wick, uses AS sample_size, wick_variety
FROM ranked
WHERE rn = 1;
"#;
