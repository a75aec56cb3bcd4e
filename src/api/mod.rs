// ==========================================
// 蜡烛烛芯推荐系统 - API 层
// ==========================================
// 职责: 进程内业务接口, 供上层路由/命令行调用
// ==========================================

pub mod error;
pub mod wick_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use wick_api::{
    FragranceHeatIndex, LogTestRequest, LogTestResponse, PredictRequest, PredictResponse,
    QuickCheckCandidate, QuickCheckRequest, QuickCheckResponse, RetrainResponse, WickApi,
    HEURISTIC_MODEL_VERSION,
};
