// ==========================================
// 蜡烛烛芯推荐系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 决策支持系统 (推荐烛芯, 人工实物测试最终确认)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 推荐策略与测试优先级
pub mod engine;

// 模型层 - 烛芯分类模型训练与加载
pub mod ml;

// 导入层 - 参考数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{DensityRating, QuickCheckStatus, TestType, WaxBaseType};

// 领域实体
pub use domain::{
    Assembly, CatalogAssembly, FragranceOil, RecommendationRequest, TestData, TestPriority,
    TestResult, Vessel, WaxType, Wick, WickPrediction, WickRecommendation,
};

// 引擎
pub use engine::{
    AssemblyCatalog, AttributeStore, ModelHandle, SqliteAttributeStore, TestPrioritizer,
    TestResultRecorder, WickRecommender,
};

// 模型
pub use ml::{ModelStore, WickModelTrainer};

// API
pub use api::{ApiError, ApiResult, WickApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "蜡烛烛芯推荐系统";
