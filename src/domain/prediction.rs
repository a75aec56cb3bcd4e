// ==========================================
// 蜡烛烛芯推荐系统 - 预测与测试结果模型
// ==========================================
// 红线: 预测的 confidence_score 反映产生它的策略, 写入后不再改写
// 红线: 测试失败时 actual_wick_id 保持为空
// ==========================================

use crate::domain::types::TestType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// WickPrediction - 推荐记录
// ==========================================
// 对齐: wick_predictions 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WickPrediction {
    pub id: String,
    pub assembly_id: Option<String>,

    // ===== 请求输入 =====
    pub vessel_id: String,
    pub wax_type_id: String,
    pub fragrance_id: String,
    pub fragrance_load_percentage: f64,

    // ===== 推荐结果 =====
    pub predicted_wick_id: String,
    pub confidence_score: f64,
    pub model_version: String,

    // ===== 验证回写 =====
    pub verified: bool,
    pub verification_date: Option<DateTime<Utc>>,
    pub actual_wick_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl WickPrediction {
    /// 创建待验证的推荐记录
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        assembly_id: Option<String>,
        vessel_id: String,
        wax_type_id: String,
        fragrance_id: String,
        fragrance_load_percentage: f64,
        predicted_wick_id: String,
        confidence_score: f64,
        model_version: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            assembly_id,
            vessel_id,
            wax_type_id,
            fragrance_id,
            fragrance_load_percentage,
            predicted_wick_id,
            confidence_score,
            model_version,
            verified: false,
            verification_date: None,
            actual_wick_id: None,
            created_at: Utc::now(),
        }
    }
}

// ==========================================
// UncertainPrediction - 待验证低置信预测 (含配方信息)
// ==========================================
// 测试优先级排序的输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertainPrediction {
    pub prediction_id: String,
    pub confidence_score: f64,
    pub assembly_id: String,
    pub assembly_name: String,
    pub vessel_id: String,
    pub wax_type_id: String,
}

// ==========================================
// TestResult - 燃烧测试结果
// ==========================================
// 对齐: test_results 表, 只追加不修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: String,
    pub assembly_id: String,
    pub wick_id_tested: String,
    pub test_date: DateTime<Utc>,
    pub test_type: TestType,
    pub flame_height_mm: Option<f64>,
    pub melt_pool_mm_at_2h: Option<f64>,
    pub passed: bool,
    pub notes: Option<String>,
    pub tested_by: Option<String>,
}

/// 测试现场数据（记录测试结果时由调用方提供）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestData {
    #[serde(default)]
    pub test_type: TestType,
    pub flame_height_mm: Option<f64>,
    pub melt_pool_mm_at_2h: Option<f64>,
    pub notes: Option<String>,
    pub tested_by: Option<String>,
}

// ==========================================
// TestPriorityEntry - 测试队列记录
// ==========================================
// 对齐: test_priority_queue 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPriorityEntry {
    pub id: i64,
    pub assembly_id: String,
    pub priority_score: f64,
    pub reason: String,
    pub completed: bool,
    pub completed_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// TrainingRun - 模型训练记录
// ==========================================
// 对齐: ml_training_runs 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRun {
    pub model_type: String,
    pub version: String,
    pub accuracy: f64,
    pub cv_score: Option<f64>,
    pub sample_size: i64,
    pub metrics_json: String,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// PredictionError - 已验证但预测错误的记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionMiss {
    pub predicted_wick_id: String,
    pub actual_wick_id: String,
    pub confidence_score: f64,
    pub vessel_name: String,
    pub wax_name: String,
    pub fragrance_name: String,
}
