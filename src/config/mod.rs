// ==========================================
// 蜡烛烛芯推荐系统 - 配置层
// ==========================================
// 职责: 推荐引擎阈值、系列前缀表、模型目录
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod engine_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use engine_config::{default_series_prefixes, EngineConfig, SeriesPrefixRule};
