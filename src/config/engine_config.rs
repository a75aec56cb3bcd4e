use serde::{Deserialize, Serialize};

/// 低置信阈值: 低于该值的推荐需要实物测试
pub const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f64 = 0.6;
/// 推荐列表上限
pub const DEFAULT_MAX_RECOMMENDATIONS: usize = 8;
/// 配方匹配策略的推荐上限
pub const DEFAULT_MAX_ASSEMBLY_MATCHES: usize = 6;
/// 模型策略取前 K 个类别
pub const DEFAULT_ML_TOP_K: usize = 5;
/// 模型策略的最低概率（严格大于）
pub const DEFAULT_ML_MIN_PROBABILITY: f64 = 0.10;
/// 测试优先级默认条数
pub const DEFAULT_PRIORITY_LIMIT: usize = 20;
/// 快速核对时默认加香比例 (%)
pub const DEFAULT_QUICK_CHECK_FRAGRANCE_LOAD: f64 = 8.5;

/// 烛芯系列前缀规则
///
/// `pattern` 为正则, 第一个捕获组为系列内尺寸编号;
/// 新增系列只需增加一条规则, 无需改代码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPrefixRule {
    pub series: String,
    pub pattern: String,
}

impl SeriesPrefixRule {
    pub fn new(series: &str, pattern: &str) -> Self {
        Self {
            series: series.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

/// 默认系列前缀表: CD / ECO / LX / HTP
pub fn default_series_prefixes() -> Vec<SeriesPrefixRule> {
    vec![
        SeriesPrefixRule::new("CD", r"cd[-\s]*(\d+)"),
        SeriesPrefixRule::new("ECO", r"eco[-\s]*(\d+)"),
        SeriesPrefixRule::new("LX", r"lx[-\s]*(\d+)"),
        SeriesPrefixRule::new("HTP", r"htp[-\s]*(\d+)"),
    ]
}

/// 推荐引擎配置
///
/// 存储位置：config_kv（scope_id='global'，key='wick.*'）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,

    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,

    #[serde(default = "default_max_assembly_matches")]
    pub max_assembly_matches: usize,

    #[serde(default = "default_ml_top_k")]
    pub ml_top_k: usize,

    #[serde(default = "default_ml_min_probability")]
    pub ml_min_probability: f64,

    #[serde(default = "default_priority_limit")]
    pub priority_limit: usize,

    #[serde(default = "default_quick_check_fragrance_load")]
    pub quick_check_fragrance_load: f64,

    #[serde(default = "default_series_prefixes")]
    pub series_prefixes: Vec<SeriesPrefixRule>,

    /// 模型目录（None 表示使用默认目录）
    #[serde(default)]
    pub model_dir: Option<String>,
}

fn default_low_confidence_threshold() -> f64 {
    DEFAULT_LOW_CONFIDENCE_THRESHOLD
}
fn default_max_recommendations() -> usize {
    DEFAULT_MAX_RECOMMENDATIONS
}
fn default_max_assembly_matches() -> usize {
    DEFAULT_MAX_ASSEMBLY_MATCHES
}
fn default_ml_top_k() -> usize {
    DEFAULT_ML_TOP_K
}
fn default_ml_min_probability() -> f64 {
    DEFAULT_ML_MIN_PROBABILITY
}
fn default_priority_limit() -> usize {
    DEFAULT_PRIORITY_LIMIT
}
fn default_quick_check_fragrance_load() -> f64 {
    DEFAULT_QUICK_CHECK_FRAGRANCE_LOAD
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            low_confidence_threshold: DEFAULT_LOW_CONFIDENCE_THRESHOLD,
            max_recommendations: DEFAULT_MAX_RECOMMENDATIONS,
            max_assembly_matches: DEFAULT_MAX_ASSEMBLY_MATCHES,
            ml_top_k: DEFAULT_ML_TOP_K,
            ml_min_probability: DEFAULT_ML_MIN_PROBABILITY,
            priority_limit: DEFAULT_PRIORITY_LIMIT,
            quick_check_fragrance_load: DEFAULT_QUICK_CHECK_FRAGRANCE_LOAD,
            series_prefixes: default_series_prefixes(),
            model_dir: None,
        }
    }
}
