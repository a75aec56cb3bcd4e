// ==========================================
// 蜡烛烛芯推荐系统 - 引擎输出模型
// ==========================================
// 不落库: 推荐结果与测试优先级
// 红线: 每条推荐必须带非空 reasoning
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// WickRecommendation - 烛芯推荐
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WickRecommendation {
    pub wick_id: String,
    pub wick_name: String,
    pub confidence: f64, // 0.0 - 1.0
    pub reasoning: String,
    pub rank: usize, // 1 = 最优
}

impl WickRecommendation {
    pub fn new(
        wick_id: impl Into<String>,
        wick_name: impl Into<String>,
        confidence: f64,
        reasoning: impl Into<String>,
        rank: usize,
    ) -> Self {
        Self {
            wick_id: wick_id.into(),
            wick_name: wick_name.into(),
            confidence,
            reasoning: reasoning.into(),
            rank,
        }
    }
}

// ==========================================
// TestPriority - 测试优先级
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPriority {
    pub assembly_id: String,
    pub assembly_name: String,
    pub uncertainty_score: f64, // 1 - confidence
    pub information_gain: f64,
    pub reason: String,
}

// ==========================================
// RecommendationRequest - 推荐请求
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub vessel_id: String,
    pub wax_type_id: String,
    pub fragrance_id: String,
    pub fragrance_load: f64,

    // ===== 换蜡场景 (需同时提供) =====
    pub old_wax_id: Option<String>,
    pub current_wick_id: Option<String>,
}

impl RecommendationRequest {
    pub fn new(
        vessel_id: impl Into<String>,
        wax_type_id: impl Into<String>,
        fragrance_id: impl Into<String>,
        fragrance_load: f64,
    ) -> Self {
        Self {
            vessel_id: vessel_id.into(),
            wax_type_id: wax_type_id.into(),
            fragrance_id: fragrance_id.into(),
            fragrance_load,
            old_wax_id: None,
            current_wick_id: None,
        }
    }

    /// 附加换蜡信息
    pub fn with_conversion(
        mut self,
        old_wax_id: impl Into<String>,
        current_wick_id: impl Into<String>,
    ) -> Self {
        self.old_wax_id = Some(old_wax_id.into());
        self.current_wick_id = Some(current_wick_id.into());
        self
    }

    /// 换蜡参数是否齐全
    pub fn conversion_params(&self) -> Option<(&str, &str)> {
        match (self.old_wax_id.as_deref(), self.current_wick_id.as_deref()) {
            (Some(old_wax), Some(wick)) if !old_wax.is_empty() && !wick.is_empty() => {
                Some((old_wax, wick))
            }
            _ => None,
        }
    }
}
