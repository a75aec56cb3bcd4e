// ==========================================
// 蜡烛烛芯推荐系统 - 应用状态
// ==========================================
// 职责: 打开数据库、建表, 组装仓储 / 引擎 / 模型句柄 / API
// 红线: 模型加载失败不阻塞启动（推荐引擎以启发式策略继续工作）
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::api::WickApi;
use crate::config::config_manager::ConfigManager;
use crate::config::EngineConfig;
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::{AssemblyCatalog, ModelHandle, SqliteAssemblyCatalog, SqliteAttributeStore};
use crate::importer::ReferenceImporter;
use crate::ml::{ModelStore, WickModelTrainer};

/// 应用数据子目录名
const APP_DIR_NAME: &str = "wick-advisor";

/// 应用状态
///
/// 包含 API 实例和共享资源, 所有组件共用一个数据库连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 模型目录
    pub model_dir: String,

    /// 生效的引擎配置
    pub engine_config: EngineConfig,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 属性存储（仓储聚合）
    pub store: Arc<SqliteAttributeStore>,

    /// 共享模型句柄（retrain 后热替换）
    pub model_handle: ModelHandle,

    /// 烛芯推荐 API
    pub wick_api: Arc<WickApi>,

    /// 参考数据导入器
    pub importer: Arc<ReferenceImporter>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - model_dir: 模型目录（None 时按 环境变量 → 配置 → 用户数据目录 解析）
    pub fn new(db_path: String, model_dir: Option<String>) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        init_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let engine_config = config_manager
            .load_engine_config()
            .map_err(|e| format!("加载引擎配置失败: {}", e))?;

        let model_dir = model_dir.unwrap_or_else(|| get_default_model_dir(&engine_config));

        // ==========================================
        // 仓储 / 模型 / 引擎
        // ==========================================
        let store = Arc::new(SqliteAttributeStore::from_connection(conn.clone()));
        let model_store = ModelStore::new(&model_dir);
        let model_handle = ModelHandle::load_latest(&model_store);

        let trainer = WickModelTrainer::new(store.clone(), model_store);
        let catalog: Arc<dyn AssemblyCatalog> =
            Arc::new(SqliteAssemblyCatalog::from_connection(conn.clone()));

        let wick_api = Arc::new(WickApi::new(
            store.clone(),
            model_handle.clone(),
            engine_config.clone(),
            trainer,
            Some(catalog),
        ));
        let importer = Arc::new(ReferenceImporter::from_connection(conn));

        tracing::info!(
            model_dir = %model_dir,
            model_loaded = model_handle.is_loaded(),
            "AppState 初始化完成"
        );

        Ok(Self {
            db_path,
            model_dir,
            engine_config,
            config_manager,
            store,
            model_handle,
            wick_api,
            importer,
        })
    }
}

// ==========================================
// 默认路径
// ==========================================

fn env_override(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 用户数据目录下的应用目录（不可用时为 None）
fn app_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join(APP_DIR_NAME))
}

/// 获取默认数据库路径
///
/// 顺序: WICK_ADVISOR_DB_PATH → 用户数据目录/wick-advisor/wick_advisor.db → ./wick_advisor.db
pub fn get_default_db_path() -> String {
    if let Some(path) = env_override("WICK_ADVISOR_DB_PATH") {
        return path;
    }

    let mut path = PathBuf::from("./wick_advisor.db");
    if let Some(dir) = app_data_dir() {
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("wick_advisor.db");
        }
    }
    path.to_string_lossy().to_string()
}

/// 获取默认模型目录
///
/// 顺序: WICK_ADVISOR_MODEL_DIR → 配置 wick.model_dir → 用户数据目录/wick-advisor/models → ./models
pub fn get_default_model_dir(config: &EngineConfig) -> String {
    if let Some(dir) = env_override("WICK_ADVISOR_MODEL_DIR") {
        return dir;
    }
    if let Some(dir) = config
        .model_dir
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        return dir.to_string();
    }
    app_data_dir()
        .map(|d| d.join("models"))
        .unwrap_or_else(|| PathBuf::from("./models"))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
        assert!(path.ends_with(".db"));
    }

    #[test]
    fn test_app_state_new_with_temp_db() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("wick.db").to_string_lossy().to_string();
        let model_dir = dir.path().join("models").to_string_lossy().to_string();

        let state = AppState::new(db_path, Some(model_dir.clone())).unwrap();
        assert_eq!(state.model_dir, model_dir);
        assert!(!state.model_handle.is_loaded());
        assert_eq!(state.engine_config, EngineConfig::default());
    }
}
