// ==========================================
// 蜡烛烛芯推荐系统 - 模型特征定义
// ==========================================
// 红线: 训练与预测必须按特征名对齐, 不依赖位置
// ==========================================

use crate::domain::component::{FragranceOil, Vessel, WaxType};
use crate::ml::preprocessing::UNKNOWN_CATEGORY;

/// 数值特征（顺序即训练时的列顺序）
pub const NUMERIC_FEATURES: [&str; 10] = [
    "volume_ml",
    "diameter_mm",
    "height_mm",
    "double_wick",
    "heat_dissipation_factor",
    "melt_point_celsius",
    "viscosity_index",
    "flash_point_celsius",
    "heat_index",
    "fragrance_load_percentage",
];

/// 类别特征（原始列名）
pub const CATEGORICAL_FEATURES: [&str; 4] = [
    "vessel_shape",
    "vessel_material",
    "wax_base_type",
    "fragrance_category",
];

/// 编码后的特征名
pub fn encoded_feature_name(categorical: &str) -> String {
    format!("{}_encoded", categorical)
}

/// 完整特征名列表: 10 个数值特征 + 4 个编码类别特征
pub fn all_feature_names() -> Vec<String> {
    NUMERIC_FEATURES
        .iter()
        .map(|s| s.to_string())
        .chain(CATEGORICAL_FEATURES.iter().map(|c| encoded_feature_name(c)))
        .collect()
}

/// 单条样本的原始特征
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub numeric: [f64; 10],
    pub categorical: [String; 4],
}

impl FeatureRow {
    /// 由物料属性构建预测用特征（缺失类别记为 `unknown`）
    pub fn from_components(
        vessel: &Vessel,
        wax: &WaxType,
        fragrance: &FragranceOil,
        fragrance_load: f64,
    ) -> Self {
        let category = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(UNKNOWN_CATEGORY)
                .to_string()
        };

        Self {
            numeric: [
                vessel.volume_ml,
                vessel.diameter_mm,
                vessel.height_mm,
                if vessel.double_wick { 1.0 } else { 0.0 },
                vessel.heat_dissipation_factor,
                wax.melt_point_celsius,
                wax.viscosity_index,
                fragrance.flash_point_celsius,
                fragrance.heat_index,
                fragrance_load,
            ],
            categorical: [
                category(&vessel.shape),
                category(&vessel.material),
                wax.base_type.to_db_str().to_string(),
                category(&fragrance.category),
            ],
        }
    }

    pub fn numeric_value(&self, name: &str) -> Option<f64> {
        NUMERIC_FEATURES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.numeric[i])
    }

    pub fn categorical_value(&self, name: &str) -> Option<&str> {
        CATEGORICAL_FEATURES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.categorical[i].as_str())
    }
}
