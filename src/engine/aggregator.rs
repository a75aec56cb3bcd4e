// ==========================================
// 蜡烛烛芯推荐系统 - 综合推荐引擎
// ==========================================
// 职责: 按顺序运行 成品匹配 → 多数投票 → 换蜡增量 → 模型预测,
//       统一施加热指数修正, 按置信度排序、去重、重排名、截断
// 红线: 任何策略失败只影响该策略自身, 入口永不返回错误
// 红线: 推荐结果不持久化（由调用方写入 wick_predictions）
// ==========================================

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::config::engine_config::EngineConfig;
use crate::domain::recommendation::{RecommendationRequest, WickRecommendation};
use crate::engine::assembly_pattern::{AssemblyCatalog, AssemblyPatternMatcher, SeriesPrefixTable};
use crate::engine::heuristics;
use crate::engine::learned::{self, ModelHandle};
use crate::engine::store::AttributeStore;

/// 合并候选: 置信度降序（稳定排序）, 同一烛芯只保留最高置信度, 重排名 1..N, 截断
pub fn merge_and_rank(
    mut candidates: Vec<WickRecommendation>,
    max_recommendations: usize,
) -> Vec<WickRecommendation> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut seen = HashSet::new();
    candidates.retain(|rec| seen.insert(rec.wick_id.clone()));

    for (i, rec) in candidates.iter_mut().enumerate() {
        rec.rank = i + 1;
    }
    candidates.truncate(max_recommendations);
    candidates
}

// ==========================================
// WickRecommender - 综合推荐引擎
// ==========================================

pub struct WickRecommender {
    store: Arc<dyn AttributeStore>,
    model: ModelHandle,
    config: EngineConfig,
    matcher: AssemblyPatternMatcher,
}

impl WickRecommender {
    pub fn new(store: Arc<dyn AttributeStore>, model: ModelHandle, config: EngineConfig) -> Self {
        let matcher = AssemblyPatternMatcher::new(
            SeriesPrefixTable::from_rules(&config.series_prefixes),
            config.max_assembly_matches,
        );
        Self {
            store,
            model,
            config,
            matcher,
        }
    }

    pub fn model_handle(&self) -> &ModelHandle {
        &self.model
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AttributeStore> {
        &self.store
    }

    // ==========================================
    // 单策略入口（失败 → 空, 记录原因）
    // ==========================================

    pub fn majority_vote_recommendation(
        &self,
        vessel_id: &str,
        wax_type_id: &str,
    ) -> Option<WickRecommendation> {
        match heuristics::majority_vote_recommendation(self.store.as_ref(), vessel_id, wax_type_id) {
            Ok(rec) => rec,
            Err(e) => {
                warn!(error = %e, "多数投票策略失败");
                None
            }
        }
    }

    pub fn wax_conversion_recommendation(
        &self,
        vessel_id: &str,
        old_wax_id: &str,
        new_wax_id: &str,
        current_wick_id: &str,
    ) -> Option<WickRecommendation> {
        match heuristics::wax_conversion_recommendation(
            self.store.as_ref(),
            vessel_id,
            old_wax_id,
            new_wax_id,
            current_wick_id,
        ) {
            Ok(rec) => rec,
            Err(e) => {
                warn!(error = %e, "换蜡增量策略失败");
                None
            }
        }
    }

    pub fn assembly_based_recommendations(
        &self,
        vessel_id: &str,
        wax_type_id: &str,
        fragrance_id: &str,
        catalog: Option<&dyn AssemblyCatalog>,
    ) -> Vec<WickRecommendation> {
        match self.matcher.recommend(
            self.store.as_ref(),
            catalog,
            vessel_id,
            wax_type_id,
            fragrance_id,
        ) {
            Ok(recs) => recs,
            Err(e) => {
                warn!(error = %e, "成品匹配策略失败");
                Vec::new()
            }
        }
    }

    pub fn ml_predictions(&self, request: &RecommendationRequest) -> Vec<WickRecommendation> {
        match learned::ml_predictions(
            self.store.as_ref(),
            &self.model,
            request,
            self.config.ml_top_k,
            self.config.ml_min_probability,
        ) {
            Ok(recs) => recs,
            Err(e) => {
                warn!(error = %e, "模型预测策略失败");
                Vec::new()
            }
        }
    }

    /// 香精热指数修正量（查询失败 → 0）
    pub fn heat_index_adjustment(&self, fragrance_id: &str) -> i32 {
        match heuristics::heat_adjustment_for_fragrance(self.store.as_ref(), fragrance_id) {
            Ok(adj) => adj,
            Err(e) => {
                warn!(error = %e, "热指数查询失败, 不做修正");
                0
            }
        }
    }

    // ==========================================
    // 综合推荐
    // ==========================================

    /// 综合推荐
    ///
    /// 所有策略都没有贡献时返回空列表, 调用方应视为"需要实物测试"
    #[instrument(skip(self, request, catalog), fields(
        vessel_id = %request.vessel_id,
        wax_type_id = %request.wax_type_id,
        fragrance_id = %request.fragrance_id
    ))]
    pub fn get_comprehensive_recommendations(
        &self,
        request: &RecommendationRequest,
        catalog: Option<&dyn AssemblyCatalog>,
    ) -> Vec<WickRecommendation> {
        let mut candidates = Vec::new();

        // 1. 成品匹配
        candidates.extend(self.assembly_based_recommendations(
            &request.vessel_id,
            &request.wax_type_id,
            &request.fragrance_id,
            catalog,
        ));

        // 2. 多数投票
        if let Some(rec) = self.majority_vote_recommendation(&request.vessel_id, &request.wax_type_id) {
            candidates.push(rec);
        }

        // 3. 换蜡增量（需同时提供旧蜡与当前烛芯）
        if let Some((old_wax_id, current_wick_id)) = request.conversion_params() {
            if let Some(rec) = self.wax_conversion_recommendation(
                &request.vessel_id,
                old_wax_id,
                &request.wax_type_id,
                current_wick_id,
            ) {
                candidates.push(rec);
            }
        }

        // 4. 模型预测
        candidates.extend(self.ml_predictions(request));

        // 5. 热指数修正（对全部候选统一施加一次）
        let adjustment = self.heat_index_adjustment(&request.fragrance_id);
        let candidates = heuristics::apply_heat_adjustment(self.store.as_ref(), candidates, adjustment);

        let raw_count = candidates.len();
        let ranked = merge_and_rank(candidates, self.config.max_recommendations);
        debug!(raw_count, returned = ranked.len(), heat_adjustment = adjustment, "综合推荐完成");
        ranked
    }
}
