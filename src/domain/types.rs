// ==========================================
// 蜡烛烛芯推荐系统 - 领域类型定义
// ==========================================
// 职责: 蜡基类型、香精密度、测试类型等枚举
// 约定: 数据库存储为小写字符串, from_str 兼容大小写
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 蜡基类型 (Wax Base Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaxBaseType {
    Soy,      // 大豆蜡
    Coconut,  // 椰子蜡
    Paraffin, // 石蜡
    Blend,    // 混合蜡
    Beeswax,  // 蜂蜡
    Other,    // 其他/未登记
}

impl WaxBaseType {
    /// 数据库存储字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            WaxBaseType::Soy => "soy",
            WaxBaseType::Coconut => "coconut",
            WaxBaseType::Paraffin => "paraffin",
            WaxBaseType::Blend => "blend",
            WaxBaseType::Beeswax => "beeswax",
            WaxBaseType::Other => "other",
        }
    }

    /// 从字符串解析（未知值归为 Other）
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "soy" => WaxBaseType::Soy,
            "coconut" => WaxBaseType::Coconut,
            "paraffin" => WaxBaseType::Paraffin,
            "blend" => WaxBaseType::Blend,
            "beeswax" => WaxBaseType::Beeswax,
            _ => WaxBaseType::Other,
        }
    }
}

impl fmt::Display for WaxBaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 香精密度等级 (Density Rating)
// ==========================================
// 红线: light 不减小烛芯（欠芯比过芯更危险）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DensityRating {
    Light,
    Medium,
    Heavy,
}

impl DensityRating {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DensityRating::Light => "light",
            DensityRating::Medium => "medium",
            DensityRating::Heavy => "heavy",
        }
    }

    /// 从字符串解析
    ///
    /// 未登记或无法识别时按 medium 处理（不产生额外调整）
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "light" => DensityRating::Light,
            "heavy" => DensityRating::Heavy,
            _ => DensityRating::Medium,
        }
    }
}

impl Default for DensityRating {
    fn default() -> Self {
        DensityRating::Medium
    }
}

impl fmt::Display for DensityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 燃烧测试类型 (Test Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    QualityCheck, // 常规质检
    BurnTest,     // 完整燃烧测试
    Conversion,   // 换蜡验证
}

impl TestType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TestType::QualityCheck => "quality_check",
            TestType::BurnTest => "burn_test",
            TestType::Conversion => "conversion",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "burn_test" => TestType::BurnTest,
            "conversion" => TestType::Conversion,
            _ => TestType::QualityCheck,
        }
    }
}

impl Default for TestType {
    fn default() -> Self {
        TestType::QualityCheck
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 快速核对结论 (Quick Check Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuickCheckStatus {
    Recommended,    // 排名前三
    Possible,       // 在推荐列表中但非最优
    NotRecommended, // 不在推荐列表中
}

impl fmt::Display for QuickCheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuickCheckStatus::Recommended => write!(f, "recommended"),
            QuickCheckStatus::Possible => write!(f, "possible"),
            QuickCheckStatus::NotRecommended => write!(f, "not_recommended"),
        }
    }
}
