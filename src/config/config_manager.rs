// ==========================================
// 蜡烛烛芯推荐系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value, scope_id='global')
// ==========================================

use crate::config::engine_config::{EngineConfig, SeriesPrefixRule};
use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global 配置（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置的快照
    pub fn get_config_snapshot(&self) -> Result<HashMap<String, String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key",
        )?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }

    /// 读取数值配置，缺失时返回默认值
    ///
    /// 格式错误时记录告警并回退默认值（配置错误不阻断推荐）
    fn get_parsed_or<T: FromStr + Copy + std::fmt::Display>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, Box<dyn Error>> {
        match self.get_global_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!("配置值格式错误 key={} value={}，使用默认值 {}", key, raw, default);
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    /// 加载推荐引擎配置（缺失项使用默认值）
    pub fn load_engine_config(&self) -> Result<EngineConfig, Box<dyn Error>> {
        let defaults = EngineConfig::default();

        let series_prefixes = match self.get_global_config_value(config_keys::SERIES_PREFIXES)? {
            Some(raw) => match serde_json::from_str::<Vec<SeriesPrefixRule>>(&raw) {
                Ok(rules) if !rules.is_empty() => rules,
                Ok(_) => defaults.series_prefixes.clone(),
                Err(e) => {
                    tracing::warn!("烛芯系列前缀配置解析失败，使用默认表: {}", e);
                    defaults.series_prefixes.clone()
                }
            },
            None => defaults.series_prefixes.clone(),
        };

        Ok(EngineConfig {
            low_confidence_threshold: self.get_parsed_or(
                config_keys::LOW_CONFIDENCE_THRESHOLD,
                defaults.low_confidence_threshold,
            )?,
            max_recommendations: self
                .get_parsed_or(config_keys::MAX_RECOMMENDATIONS, defaults.max_recommendations)?,
            max_assembly_matches: self
                .get_parsed_or(config_keys::MAX_ASSEMBLY_MATCHES, defaults.max_assembly_matches)?,
            ml_top_k: self.get_parsed_or(config_keys::ML_TOP_K, defaults.ml_top_k)?,
            ml_min_probability: self
                .get_parsed_or(config_keys::ML_MIN_PROBABILITY, defaults.ml_min_probability)?,
            priority_limit: self.get_parsed_or(config_keys::PRIORITY_LIMIT, defaults.priority_limit)?,
            quick_check_fragrance_load: self.get_parsed_or(
                config_keys::QUICK_CHECK_FRAGRANCE_LOAD,
                defaults.quick_check_fragrance_load,
            )?,
            series_prefixes,
            model_dir: self
                .get_global_config_value(config_keys::MODEL_DIR)?
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    pub const LOW_CONFIDENCE_THRESHOLD: &str = "wick.low_confidence_threshold";
    pub const MAX_RECOMMENDATIONS: &str = "wick.max_recommendations";
    pub const MAX_ASSEMBLY_MATCHES: &str = "wick.max_assembly_matches";
    pub const ML_TOP_K: &str = "wick.ml_top_k";
    pub const ML_MIN_PROBABILITY: &str = "wick.ml_min_probability";
    pub const PRIORITY_LIMIT: &str = "wick.priority_limit";
    pub const QUICK_CHECK_FRAGRANCE_LOAD: &str = "wick.quick_check_fragrance_load";
    pub const MODEL_DIR: &str = "wick.model_dir";
    pub const SERIES_PREFIXES: &str = "wick.series_prefixes"; // JSON 数组
}
