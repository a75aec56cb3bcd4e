// ==========================================
// 蜡烛烛芯推荐系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod assembly;
pub mod component;
pub mod prediction;
pub mod recommendation;
pub mod types;

// 重导出核心类型
pub use assembly::{Assembly, CatalogAssembly, MajorityBaseline, WaxConversionDelta};
pub use component::{FragranceOil, Vessel, WaxType, Wick};
pub use prediction::{
    PredictionMiss, TestData, TestPriorityEntry, TestResult, TrainingRun, UncertainPrediction,
    WickPrediction,
};
pub use recommendation::{RecommendationRequest, TestPriority, WickRecommendation};
pub use types::{DensityRating, QuickCheckStatus, TestType, WaxBaseType};
