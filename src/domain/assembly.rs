// ==========================================
// 蜡烛烛芯推荐系统 - 配方与历史经验模型
// ==========================================
// 覆盖: 配方(Assembly) / ERP 成品 BOM / 多数投票基线 / 换蜡增量
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Assembly - 蜡烛配方
// ==========================================
// 容器 + 蜡 + 香精 + 加香比例 + 实际使用烛芯
// 对齐: assemblies 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub id: String,
    pub name: String,
    pub vessel_id: String,
    pub wax_type_id: String,
    pub fragrance_oil_id: String,
    pub fragrance_load_percentage: Option<f64>,
    pub wick_id: Option<String>,
    pub approved_date: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

impl Assembly {
    /// 已批准且记录了烛芯的配方才能作为训练样本
    pub fn is_training_sample(&self) -> bool {
        self.approved_date.is_some() && self.wick_id.is_some()
    }
}

// ==========================================
// CatalogAssembly - 外部系统成品 BOM 记录
// ==========================================
// 来源: ERP 导出 (catalog_assemblies 表 / 内存列表)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogAssembly {
    pub item_id: String,      // 物料号, 如 CDL-8OZ-VANILLA-CD12
    pub display_name: String, // 展示名
    pub oz_fill: Option<f64>, // 灌装量 (oz)
}

// ==========================================
// MajorityBaseline - 多数投票基线
// ==========================================
// 来源: wick_majority_baseline 视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MajorityBaseline {
    pub vessel_id: String,
    pub wax_type_id: String,
    pub recommended_wick_id: String,
    pub sample_size: i64,  // 推荐烛芯的通过次数
    pub wick_variety: i64, // 通过测试的不同烛芯数
}

// ==========================================
// WaxConversionDelta - 换蜡烛芯增量
// ==========================================
// (容器, 旧蜡, 新蜡) → size_index 偏移
// 红线: 引擎只读, 由外部维护
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaxConversionDelta {
    pub vessel_id: String,
    pub old_wax_type_id: String,
    pub new_wax_type_id: String,
    pub wick_size_delta: i32,
    pub confidence_score: f64,
    pub sample_count: i64,
}
