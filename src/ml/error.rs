// ==========================================
// 蜡烛烛芯推荐系统 - 模型层错误类型
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MlError {
    #[error("训练数据不足: {0}")]
    InsufficientData(String),

    #[error("特征维度不匹配: 期望 {expected}, 实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("未知特征: {0}")]
    UnknownFeature(String),

    #[error("模型不可用: {0}")]
    ModelUnavailable(String),

    #[error("模型文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("模型序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("数据访问失败: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type MlResult<T> = Result<T, MlError>;
