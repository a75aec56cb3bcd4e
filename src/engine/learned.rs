// ==========================================
// 蜡烛烛芯推荐系统 - 模型预测策略
// ==========================================
// 职责: 通过可替换的模型句柄调用分类器, 输出前 K 个烛芯
// 红线: 无模型 / 特征准备失败 / 推理失败 → 空列表, 不影响其他策略
// ==========================================

use std::sync::{Arc, RwLock};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::domain::recommendation::{RecommendationRequest, WickRecommendation};
use crate::engine::store::AttributeStore;
use crate::ml::artifact::{LoadedModel, ModelStore};
use crate::ml::features::FeatureRow;

// ==========================================
// ModelHandle - 可热替换的模型句柄
// ==========================================

/// 共享模型句柄
///
/// 克隆后指向同一个槽位; `swap` 之后所有持有者立即看到新模型。
#[derive(Clone, Default)]
pub struct ModelHandle {
    slot: Arc<RwLock<Option<Arc<LoadedModel>>>>,
}

impl ModelHandle {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_model(model: LoadedModel) -> Self {
        let handle = Self::default();
        handle.swap(model);
        handle
    }

    /// 从模型目录加载 latest; 失败时返回空句柄并记录告警
    pub fn load_latest(store: &ModelStore) -> Self {
        match store.load_latest() {
            Ok(artifact) => {
                info!(version = %artifact.version, dir = %store.dir().display(), "已加载烛芯模型");
                Self::with_model(LoadedModel::from_artifact(artifact))
            }
            Err(e) => {
                warn!(dir = %store.dir().display(), error = %e, "烛芯模型不可用, 模型策略将不产生推荐");
                Self::empty()
            }
        }
    }

    /// 替换模型, 返回旧模型
    pub fn swap(&self, model: LoadedModel) -> Option<Arc<LoadedModel>> {
        let mut guard = self.slot.write().unwrap_or_else(|p| p.into_inner());
        guard.replace(Arc::new(model))
    }

    pub fn clear(&self) -> Option<Arc<LoadedModel>> {
        let mut guard = self.slot.write().unwrap_or_else(|p| p.into_inner());
        guard.take()
    }

    pub fn current(&self) -> Option<Arc<LoadedModel>> {
        let guard = self.slot.read().unwrap_or_else(|p| p.into_inner());
        guard.clone()
    }

    pub fn version(&self) -> Option<String> {
        self.current().map(|m| m.version.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("version", &self.version())
            .finish()
    }
}

// ==========================================
// 策略
// ==========================================

/// 概率最高的 K 个类别中, 概率严格大于阈值的部分（概率降序, 并列保持类别顺序）
pub fn top_classes(probas: &[(String, f64)], top_k: usize, min_probability: f64) -> Vec<(String, f64)> {
    let mut order: Vec<usize> = (0..probas.len()).collect();
    order.sort_by(|&a, &b| probas[b].1.total_cmp(&probas[a].1));
    order
        .into_iter()
        .take(top_k)
        .filter(|&i| probas[i].1 > min_probability)
        .map(|i| probas[i].clone())
        .collect()
}

/// 模型预测策略
pub fn ml_predictions(
    store: &dyn AttributeStore,
    handle: &ModelHandle,
    request: &RecommendationRequest,
    top_k: usize,
    min_probability: f64,
) -> anyhow::Result<Vec<WickRecommendation>> {
    let model = match handle.current() {
        Some(m) => m,
        None => {
            debug!("模型策略: 未加载模型");
            return Ok(Vec::new());
        }
    };

    let vessel = store.vessel(&request.vessel_id).context("查询容器失败")?;
    let wax = store.wax_type(&request.wax_type_id).context("查询蜡失败")?;
    let fragrance = store.fragrance(&request.fragrance_id).context("查询香精失败")?;
    let (vessel, wax, fragrance) = match (vessel, wax, fragrance) {
        (Some(v), Some(w), Some(f)) => (v, w, f),
        _ => {
            debug!(
                vessel_id = %request.vessel_id,
                wax_type_id = %request.wax_type_id,
                fragrance_id = %request.fragrance_id,
                "模型策略: 物料属性缺失, 无法构建特征"
            );
            return Ok(Vec::new());
        }
    };

    let row = FeatureRow::from_components(&vessel, &wax, &fragrance, request.fragrance_load);
    let probas = model.predict(&row).context("模型推理失败")?;

    let mut recommendations = Vec::new();
    for (wick_id, probability) in top_classes(&probas, top_k, min_probability) {
        let wick_name = store
            .wick(&wick_id)
            .context("查询烛芯失败")?
            .map(|w| w.name)
            .unwrap_or_else(|| wick_id.clone());
        let rank = recommendations.len() + 1;
        recommendations.push(WickRecommendation::new(
            wick_id,
            wick_name,
            probability,
            format!("ML model prediction (v{})", model.version),
            rank,
        ));
    }
    Ok(recommendations)
}
