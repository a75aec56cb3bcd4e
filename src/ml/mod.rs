// ==========================================
// 蜡烛烛芯推荐系统 - 模型层
// ==========================================
// 职责: 烛芯分类模型的训练、持久化、加载
// 红线: 模型不可用时推荐引擎照常工作
// ==========================================

pub mod artifact;
pub mod error;
pub mod features;
pub mod gbdt;
pub mod preprocessing;
pub mod split;
pub mod trainer;

pub use artifact::{LoadedModel, ModelArtifact, ModelStore};
pub use error::{MlError, MlResult};
pub use features::FeatureRow;
pub use gbdt::{GbdtParams, GradientBoostedClassifier, WickClassifier};
pub use preprocessing::{LabelEncoder, StandardScaler};
pub use trainer::{
    LearningCurves, PredictionErrorReport, TrainingMetrics, TrainingOutcome, WickModelTrainer,
};
