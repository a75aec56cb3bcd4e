// ==========================================
// 蜡烛烛芯推荐系统 - 物料领域模型
// ==========================================
// 覆盖: 容器 / 蜡 / 香精 / 烛芯 四类参考数据
// 红线: 参考数据由产品目录导入, 推荐引擎只读不写
// ==========================================

use crate::domain::types::{DensityRating, WaxBaseType};
use serde::{Deserialize, Serialize};

// ==========================================
// Vessel - 容器
// ==========================================
// 对齐: vessels 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vessel {
    pub id: String,
    pub item_id: Option<String>, // ERP 物料号 (如 VES-8OZ-TUMBLER)
    pub name: String,

    // ===== 几何尺寸 =====
    pub volume_ml: f64,
    pub diameter_mm: f64,
    pub height_mm: f64,

    // ===== 分类 =====
    pub shape: Option<String>,    // tin / tumbler / jar ...
    pub material: Option<String>, // glass / metal / ceramic ...

    pub double_wick: bool,
    pub heat_dissipation_factor: f64, // 1.0 = 标准玻璃
}

impl Vessel {
    /// 校验几何字段（导入边界使用）
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("容器ID不能为空".to_string());
        }
        if self.volume_ml <= 0.0 || self.diameter_mm <= 0.0 || self.height_mm <= 0.0 {
            return Err(format!(
                "容器尺寸必须为正数: volume_ml={}, diameter_mm={}, height_mm={}",
                self.volume_ml, self.diameter_mm, self.height_mm
            ));
        }
        if self.heat_dissipation_factor <= 0.0 {
            return Err(format!(
                "散热系数必须为正数: {}",
                self.heat_dissipation_factor
            ));
        }
        Ok(())
    }
}

// ==========================================
// WaxType - 蜡
// ==========================================
// 对齐: wax_types 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaxType {
    pub id: String,
    pub name: String,
    pub melt_point_celsius: f64,
    pub viscosity_index: f64, // 0..1
    pub base_type: WaxBaseType,
}

impl WaxType {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("蜡ID不能为空".to_string());
        }
        if !(0.0..=1.0).contains(&self.viscosity_index) {
            return Err(format!("黏度指数超出范围 [0, 1]: {}", self.viscosity_index));
        }
        Ok(())
    }
}

// ==========================================
// FragranceOil - 香精
// ==========================================
// 对齐: fragrance_oils 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragranceOil {
    pub id: String,
    pub item_id: Option<String>,
    pub name: String,
    pub flash_point_celsius: f64,
    pub specific_gravity: Option<f64>,
    pub max_load_percentage: Option<f64>,

    /// 热指数: 负数 = 燃烧偏冷, 正数 = 燃烧偏热
    pub heat_index: f64,
    pub category: Option<String>,
    pub density_rating: DensityRating,
}

impl FragranceOil {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("香精ID不能为空".to_string());
        }
        if let Some(max_load) = self.max_load_percentage {
            if !(0.0..=100.0).contains(&max_load) {
                return Err(format!("最大加香比例超出范围 [0, 100]: {}", max_load));
            }
        }
        Ok(())
    }
}

// ==========================================
// Wick - 烛芯
// ==========================================
// 对齐: wicks 表
// 红线: size_index 在同一系列内随燃烧直径单调递增,
//       跨系列大致可比; 调整逻辑只在同系列内移动
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wick {
    pub id: String,
    pub name: String,   // 如 CD-6 / ECO-10
    pub series: String, // CD / ECO / LX / HTP ...
    pub size: Option<f64>,
    pub size_index: i32,
}

impl Wick {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("烛芯ID不能为空".to_string());
        }
        if self.series.trim().is_empty() {
            return Err(format!("烛芯 {} 缺少系列", self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vessel_validate_rejects_non_positive_geometry() {
        let vessel = Vessel {
            id: "v001".to_string(),
            item_id: None,
            name: "2.5oz Tin".to_string(),
            volume_ml: 74.0,
            diameter_mm: 0.0,
            height_mm: 35.0,
            shape: Some("tin".to_string()),
            material: Some("metal".to_string()),
            double_wick: false,
            heat_dissipation_factor: 1.2,
        };
        assert!(vessel.validate().is_err());
    }

    #[test]
    fn test_wax_validate_viscosity_range() {
        let mut wax = WaxType {
            id: "w001".to_string(),
            name: "Soy C3".to_string(),
            melt_point_celsius: 52.0,
            viscosity_index: 0.4,
            base_type: WaxBaseType::Soy,
        };
        assert!(wax.validate().is_ok());
        wax.viscosity_index = 1.5;
        assert!(wax.validate().is_err());
    }
}
