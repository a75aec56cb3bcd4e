// ==========================================
// 蜡烛烛芯推荐系统 - 引擎层
// ==========================================
// 职责: 推荐策略、综合排序、测试优先级、测试结果回写
// 红线: Engine 不拼 SQL, 所有推荐必须输出 reasoning
// 红线: 单个策略失败不影响整体推荐
// ==========================================

pub mod aggregator;
pub mod assembly_pattern;
pub mod heuristics;
pub mod learned;
pub mod prioritizer;
pub mod recorder;
pub mod store;

// 重导出核心引擎
pub use aggregator::{merge_and_rank, WickRecommender};
pub use assembly_pattern::{
    AssemblyCatalog, AssemblyPatternMatcher, SeriesPrefixTable, SqliteAssemblyCatalog,
    StaticAssemblyCatalog,
};
pub use learned::ModelHandle;
pub use prioritizer::TestPrioritizer;
pub use recorder::{RecordOutcome, TestResultRecorder};
pub use store::{AttributeStore, SqliteAttributeStore};
