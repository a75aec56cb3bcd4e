// ==========================================
// 蜡烛烛芯推荐系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod assembly_repo;
pub mod component_repo;
pub mod error;
pub mod prediction_repo;
pub mod training_run_repo;

// 重导出核心仓储
pub use assembly_repo::{
    AssemblyRepository, MajorityBaselineView, TrainingRecord, WaxConversionView,
};
pub use component_repo::ComponentRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use prediction_repo::PredictionRepository;
pub use training_run_repo::TrainingRunRepository;
