// ==========================================
// 蜡烛烛芯推荐系统 - 启发式策略
// ==========================================
// 职责: 多数投票 / 换蜡增量 / 热指数修正
// 红线: 缺失参考数据 = 不贡献推荐, 不是错误
// 红线: 尺寸映射只在同一系列内进行
// ==========================================

use crate::domain::component::Wick;
use crate::domain::recommendation::WickRecommendation;
use crate::domain::types::DensityRating;
use crate::engine::store::AttributeStore;
use crate::repository::RepositoryResult;
use tracing::debug;

/// 多数投票置信度上限
pub const MAJORITY_CONFIDENCE_CAP: f64 = 0.95;
/// 热指数修正后的置信度折扣
pub const HEAT_ADJUSTMENT_CONFIDENCE_FACTOR: f64 = 0.9;

// ==========================================
// 纯函数
// ==========================================

/// 多数投票置信度: min(0.95, 0.5 + n * 0.05)
pub fn majority_confidence(sample_count: i64) -> f64 {
    let n = sample_count.max(0) as f64;
    (0.5 + n * 0.05).min(MAJORITY_CONFIDENCE_CAP)
}

/// 热指数修正量（size_index 步数）
///
/// - heat_index < -0.5 → +1（冷燃香精需要更大烛芯）
/// - heat_index >  0.5 → -1
/// - heavy → 额外 +1; light → 0（不做减小）
pub fn heat_index_adjustment(heat_index: f64, density: DensityRating) -> i32 {
    let mut adjustment = 0;
    if heat_index < -0.5 {
        adjustment = 1;
    } else if heat_index > 0.5 {
        adjustment = -1;
    }

    match density {
        DensityRating::Heavy => adjustment += 1,
        DensityRating::Medium | DensityRating::Light => {}
    }

    adjustment
}

/// 在同系列候选中选择 size_index 最接近目标的烛芯
///
/// 距离相同时取较小的 size_index, 再按 id 升序
pub fn nearest_in_series(candidates: &[Wick], target_index: i32) -> Option<&Wick> {
    candidates.iter().min_by(|a, b| {
        let da = a.size_index.abs_diff(target_index);
        let db = b.size_index.abs_diff(target_index);
        da.cmp(&db)
            .then(a.size_index.cmp(&b.size_index))
            .then_with(|| a.id.cmp(&b.id))
    })
}

/// 带符号的步数描述（+2 / -1）
pub fn signed_steps(delta: i32) -> String {
    format!("{:+}", delta)
}

// ==========================================
// 策略
// ==========================================

/// 多数投票策略
///
/// 查询 (容器, 蜡) 组合下通过测试次数最多的烛芯, 至多返回 1 条
pub fn majority_vote_recommendation(
    store: &dyn AttributeStore,
    vessel_id: &str,
    wax_type_id: &str,
) -> RepositoryResult<Option<WickRecommendation>> {
    let baseline = match store.majority_baseline(vessel_id, wax_type_id)? {
        Some(b) => b,
        None => {
            debug!(vessel_id, wax_type_id, "多数投票: 无历史通过记录");
            return Ok(None);
        }
    };

    let wick = match store.wick(&baseline.recommended_wick_id)? {
        Some(w) => w,
        None => {
            debug!(wick_id = %baseline.recommended_wick_id, "多数投票: 基线烛芯不在烛芯目录中");
            return Ok(None);
        }
    };

    Ok(Some(WickRecommendation::new(
        wick.id,
        wick.name,
        majority_confidence(baseline.sample_size),
        format!(
            "Based on {} successful historical uses with this vessel and wax combination",
            baseline.sample_size
        ),
        1,
    )))
}

/// 换蜡增量策略
///
/// 当前使用 (容器, 旧蜡, 烛芯), 换成新蜡后在同系列内按增量移动尺寸。
/// 增量为 0 或不存在时不贡献推荐（0 与"未观测"不可区分）。
pub fn wax_conversion_recommendation(
    store: &dyn AttributeStore,
    vessel_id: &str,
    old_wax_id: &str,
    new_wax_id: &str,
    current_wick_id: &str,
) -> RepositoryResult<Option<WickRecommendation>> {
    let delta = match store.wax_conversion_delta(vessel_id, old_wax_id, new_wax_id)? {
        Some(d) if d.wick_size_delta != 0 => d,
        Some(_) => {
            debug!(vessel_id, old_wax_id, new_wax_id, "换蜡增量为 0, 视为无信号");
            return Ok(None);
        }
        None => {
            debug!(vessel_id, old_wax_id, new_wax_id, "换蜡增量: 无记录");
            return Ok(None);
        }
    };

    let current = match store.wick(current_wick_id)? {
        Some(w) => w,
        None => {
            debug!(current_wick_id, "换蜡增量: 当前烛芯不存在");
            return Ok(None);
        }
    };

    let target_index = current.size_index.saturating_add(delta.wick_size_delta);
    let series = store.wicks_in_series(&current.series)?;
    let closest = match nearest_in_series(&series, target_index) {
        Some(w) => w.clone(),
        None => {
            debug!(series = %current.series, "换蜡增量: 系列内无可选烛芯");
            return Ok(None);
        }
    };

    Ok(Some(WickRecommendation::new(
        closest.id,
        closest.name,
        delta.confidence_score,
        format!(
            "Wax conversion heuristic: {} sizes based on {} tests",
            signed_steps(delta.wick_size_delta),
            delta.sample_count
        ),
        1,
    )))
}

/// 查询香精的热指数修正量（香精不存在 → 0）
pub fn heat_adjustment_for_fragrance(
    store: &dyn AttributeStore,
    fragrance_id: &str,
) -> RepositoryResult<i32> {
    match store.fragrance(fragrance_id)? {
        Some(f) => Ok(heat_index_adjustment(f.heat_index, f.density_rating)),
        None => {
            debug!(fragrance_id, "热指数修正: 香精不存在");
            Ok(0)
        }
    }
}

/// 对候选列表统一施加热指数修正
///
/// 每个候选在同系列内移动 adjustment 步, 置信度 × 0.9, 理由追加修正说明。
/// 查不到烛芯或系列的候选（如成品匹配合成的 id）无法移动尺寸,
/// 但同样打折并追加说明, 不能以未修正的置信度排在已修正候选之前。
pub fn apply_heat_adjustment(
    store: &dyn AttributeStore,
    candidates: Vec<WickRecommendation>,
    adjustment: i32,
) -> Vec<WickRecommendation> {
    if adjustment == 0 {
        return candidates;
    }

    candidates
        .into_iter()
        .map(|rec| match resolve_adjusted_wick(store, &rec.wick_id, adjustment) {
            Ok(Some(target)) => adjusted(&rec, target.id, target.name, adjustment),
            Ok(None) => {
                debug!(wick_id = %rec.wick_id, "热指数修正: 烛芯不在目录中, 仅折减置信度");
                adjusted(&rec, rec.wick_id.clone(), rec.wick_name.clone(), adjustment)
            }
            Err(e) => {
                tracing::warn!(wick_id = %rec.wick_id, error = %e, "热指数修正查询失败, 仅折减置信度");
                adjusted(&rec, rec.wick_id.clone(), rec.wick_name.clone(), adjustment)
            }
        })
        .collect()
}

/// 同系列内移动 adjustment 步后的烛芯
fn resolve_adjusted_wick(
    store: &dyn AttributeStore,
    wick_id: &str,
    adjustment: i32,
) -> RepositoryResult<Option<Wick>> {
    let wick = match store.wick(wick_id)? {
        Some(w) => w,
        None => return Ok(None),
    };
    let series = store.wicks_in_series(&wick.series)?;
    Ok(nearest_in_series(&series, wick.size_index.saturating_add(adjustment)).cloned())
}

fn adjusted(
    rec: &WickRecommendation,
    wick_id: String,
    wick_name: String,
    adjustment: i32,
) -> WickRecommendation {
    WickRecommendation::new(
        wick_id,
        wick_name,
        rec.confidence * HEAT_ADJUSTMENT_CONFIDENCE_FACTOR,
        format!(
            "{} + heat index adjustment ({})",
            rec.reasoning,
            signed_steps(adjustment)
        ),
        rec.rank,
    )
}
