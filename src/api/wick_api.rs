// ==========================================
// 蜡烛烛芯推荐系统 - 烛芯推荐 API
// ==========================================
// 职责: 进程内调用门面, 把请求 DTO 翻译为引擎调用
// 覆盖: 推荐 / 测试优先级 / 测试回写 / 快速核对 / 分析 / 重新训练
// 红线: 推荐列表为空是正常结果, 以 needs_testing 告知调用方
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::prediction::{TestData, WickPrediction};
use crate::domain::recommendation::{RecommendationRequest, TestPriority, WickRecommendation};
use crate::domain::types::{DensityRating, QuickCheckStatus, TestType};
use crate::engine::{
    AssemblyCatalog, AttributeStore, ModelHandle, RecordOutcome, SqliteAttributeStore,
    TestPrioritizer, TestResultRecorder, WickRecommender,
};
use crate::config::EngineConfig;
use crate::ml::artifact::LoadedModel;
use crate::ml::trainer::{FeatureImportance, LearningCurves, PredictionErrorReport, WickModelTrainer};
use crate::repository::{MajorityBaselineView, WaxConversionView};

/// 无模型时记录的推荐来源版本
pub const HEURISTIC_MODEL_VERSION: &str = "heuristic_v1";

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn require_non_empty(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidInput(format!("缺少必填字段: {}", field)));
    }
    Ok(())
}

// ==========================================
// DTO
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub vessel_id: String,
    pub wax_type_id: String,
    pub fragrance_id: String,
    pub fragrance_load: f64,
    #[serde(default)]
    pub old_wax_id: Option<String>,
    #[serde(default)]
    pub current_wick_id: Option<String>,
    /// 关联配方（有则预测进入测试优先级候选集）
    #[serde(default)]
    pub assembly_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub recommendations: Vec<WickRecommendation>,
    pub needs_testing: bool,
    pub model_version: String,
    /// 落库的预测记录 ID（无推荐或写入失败时为空）
    pub prediction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogTestRequest {
    pub assembly_id: String,
    /// 烛芯名称（如 ECO-10）
    pub wick_tested: String,
    #[serde(rename = "pass")]
    pub passed: bool,
    #[serde(default)]
    pub flame_height_mm: Option<f64>,
    #[serde(default, rename = "melt_pool_mm_2h")]
    pub melt_pool_mm_at_2h: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tested_by: Option<String>,
    #[serde(default)]
    pub test_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogTestResponse {
    pub wick_id: String,
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickCheckRequest {
    pub vessel: String,
    pub wax: String,
    pub fragrance: String,
    pub wick: String,
    /// 缺省使用配置 wick.quick_check_fragrance_load
    #[serde(default)]
    pub fragrance_load: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickCheckCandidate {
    pub wick: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickCheckResponse {
    pub status: QuickCheckStatus,
    pub message: String,
    pub top_recommendations: Vec<QuickCheckCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragranceHeatIndex {
    pub id: String,
    pub name: String,
    pub heat_index: f64,
    pub density_rating: DensityRating,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainResponse {
    pub model_version: String,
    pub accuracy: f64,
    pub cv_score_mean: Option<f64>,
    pub sample_size: usize,
    pub feature_importance: Vec<FeatureImportance>,
    pub artifact_path: Option<String>,
}

// ==========================================
// WickApi
// ==========================================
pub struct WickApi {
    store: Arc<SqliteAttributeStore>,
    recommender: WickRecommender,
    prioritizer: TestPrioritizer,
    recorder: TestResultRecorder,
    trainer: WickModelTrainer,
    catalog: Option<Arc<dyn AssemblyCatalog>>,
}

impl WickApi {
    pub fn new(
        store: Arc<SqliteAttributeStore>,
        model: ModelHandle,
        config: EngineConfig,
        trainer: WickModelTrainer,
        catalog: Option<Arc<dyn AssemblyCatalog>>,
    ) -> Self {
        let dyn_store: Arc<dyn AttributeStore> = store.clone();
        let prioritizer = TestPrioritizer::new(dyn_store.clone(), config.low_confidence_threshold);
        let recorder = TestResultRecorder::new(dyn_store.clone());
        let recommender = WickRecommender::new(dyn_store, model, config);
        Self {
            store,
            recommender,
            prioritizer,
            recorder,
            trainer,
            catalog,
        }
    }

    pub fn recommender(&self) -> &WickRecommender {
        &self.recommender
    }

    pub fn model_handle(&self) -> &ModelHandle {
        self.recommender.model_handle()
    }

    fn config(&self) -> &EngineConfig {
        self.recommender.config()
    }

    fn recommend(&self, request: &RecommendationRequest) -> Vec<WickRecommendation> {
        self.recommender
            .get_comprehensive_recommendations(request, self.catalog.as_deref())
    }

    // ==========================================
    // 推荐
    // ==========================================

    /// 烛芯推荐
    ///
    /// 最优推荐写入 wick_predictions 待验证; 写入失败只告警, 推荐照常返回
    #[instrument(skip(self, request), fields(vessel_id = %request.vessel_id))]
    pub fn predict(&self, request: PredictRequest) -> ApiResult<PredictResponse> {
        require_non_empty("vessel_id", &request.vessel_id)?;
        require_non_empty("wax_type_id", &request.wax_type_id)?;
        require_non_empty("fragrance_id", &request.fragrance_id)?;
        if !request.fragrance_load.is_finite() || !(0.0..=100.0).contains(&request.fragrance_load) {
            return Err(ApiError::InvalidInput(format!(
                "加香比例超出范围 [0, 100]: {}",
                request.fragrance_load
            )));
        }

        let mut rec_request = RecommendationRequest::new(
            request.vessel_id.clone(),
            request.wax_type_id.clone(),
            request.fragrance_id.clone(),
            request.fragrance_load,
        );
        rec_request.old_wax_id = request.old_wax_id.clone();
        rec_request.current_wick_id = request.current_wick_id.clone();

        let recommendations = self.recommend(&rec_request);
        let model_version = self
            .model_handle()
            .version()
            .unwrap_or_else(|| HEURISTIC_MODEL_VERSION.to_string());

        let prediction_id = recommendations.first().and_then(|top| {
            let prediction = WickPrediction::new_pending(
                request.assembly_id.clone(),
                request.vessel_id.clone(),
                request.wax_type_id.clone(),
                request.fragrance_id.clone(),
                request.fragrance_load,
                top.wick_id.clone(),
                top.confidence,
                model_version.clone(),
            );
            match self.store.prediction_repo.insert_prediction(&prediction) {
                Ok(()) => Some(prediction.id),
                Err(e) => {
                    warn!(error = %e, "预测记录写入失败");
                    None
                }
            }
        });

        let needs_testing = recommendations
            .first()
            .map_or(true, |top| top.confidence < self.config().low_confidence_threshold);

        let recommendations = recommendations
            .into_iter()
            .map(|mut rec| {
                rec.confidence = round_to(rec.confidence, 3);
                rec
            })
            .collect();

        Ok(PredictResponse {
            recommendations,
            needs_testing,
            model_version,
            prediction_id,
        })
    }

    // ==========================================
    // 测试优先级与回写
    // ==========================================

    /// 测试优先级（limit 缺省取配置 wick.priority_limit）
    pub fn test_priorities(&self, limit: Option<usize>) -> Vec<TestPriority> {
        let limit = limit.unwrap_or(self.config().priority_limit);
        self.prioritizer
            .get_test_priorities(limit)
            .into_iter()
            .map(|mut p| {
                p.uncertainty_score = round_to(p.uncertainty_score, 3);
                p.information_gain = round_to(p.information_gain, 3);
                p
            })
            .collect()
    }

    /// 将当前优先级写入测试队列
    pub fn refresh_test_queue(&self, limit: Option<usize>) -> ApiResult<usize> {
        let limit = limit.unwrap_or(self.config().priority_limit);
        Ok(self.prioritizer.refresh_queue(limit)?)
    }

    /// 记录测试结果（烛芯按名称解析）
    #[instrument(skip(self, request), fields(assembly_id = %request.assembly_id))]
    pub fn log_test(&self, request: LogTestRequest) -> ApiResult<LogTestResponse> {
        require_non_empty("assembly_id", &request.assembly_id)?;
        require_non_empty("wick_tested", &request.wick_tested)?;

        let wick = self
            .store
            .wick_by_name(request.wick_tested.trim())?
            .ok_or_else(|| ApiError::InvalidInput(format!("未知烛芯: {}", request.wick_tested)))?;

        let test_data = TestData {
            test_type: request
                .test_type
                .as_deref()
                .map(TestType::from_str)
                .unwrap_or_default(),
            flame_height_mm: request.flame_height_mm,
            melt_pool_mm_at_2h: request.melt_pool_mm_at_2h,
            notes: request.notes,
            tested_by: request.tested_by,
        };

        let outcome = self.recorder.record_test_result(
            &request.assembly_id,
            &wick.id,
            &test_data,
            request.passed,
        );
        Ok(LogTestResponse {
            wick_id: wick.id,
            outcome,
        })
    }

    // ==========================================
    // 快速核对
    // ==========================================

    /// 按名称核对拟用烛芯
    ///
    /// 排名前三为 recommended, 在列表中为 possible, 否则 not_recommended
    pub fn quick_check(&self, request: QuickCheckRequest) -> ApiResult<QuickCheckResponse> {
        let components = &self.store.component_repo;
        let vessel = components.find_vessel_by_name(&request.vessel)?;
        let wax = components.find_wax_type_by_name(&request.wax)?;
        let fragrance = components.find_fragrance_by_name(&request.fragrance)?;
        let wick = components.find_wick_by_name(&request.wick)?;

        let (vessel, wax, fragrance, wick) = match (vessel, wax, fragrance, wick) {
            (Some(v), Some(w), Some(f), Some(k)) => (v, w, f, k),
            (v, w, f, k) => {
                let missing: Vec<&str> = [
                    (v.is_none(), request.vessel.as_str()),
                    (w.is_none(), request.wax.as_str()),
                    (f.is_none(), request.fragrance.as_str()),
                    (k.is_none(), request.wick.as_str()),
                ]
                .into_iter()
                .filter_map(|(absent, name)| absent.then_some(name))
                .collect();
                return Err(ApiError::NotFound(format!(
                    "物料不存在: {}",
                    missing.join(", ")
                )));
            }
        };

        let fragrance_load = request
            .fragrance_load
            .unwrap_or(self.config().quick_check_fragrance_load);
        let recommendations = self.recommend(&RecommendationRequest::new(
            vessel.id,
            wax.id,
            fragrance.id,
            fragrance_load,
        ));

        let matched = recommendations.iter().find(|r| r.wick_id == wick.id);
        let (status, message) = match matched {
            Some(m) if m.rank <= 3 => (
                QuickCheckStatus::Recommended,
                format!("Good choice! {}", m.reasoning),
            ),
            Some(m) => (
                QuickCheckStatus::Possible,
                format!("Possible but not optimal (rank {}). {}", m.rank, m.reasoning),
            ),
            None => (
                QuickCheckStatus::NotRecommended,
                match recommendations.first() {
                    Some(top) => format!("Not recommended. Try {} instead.", top.wick_name),
                    None => "No recommendations available".to_string(),
                },
            ),
        };

        Ok(QuickCheckResponse {
            status,
            message,
            top_recommendations: recommendations
                .iter()
                .take(3)
                .map(|r| QuickCheckCandidate {
                    wick: r.wick_name.clone(),
                    confidence: round_to(r.confidence, 2),
                })
                .collect(),
        })
    }

    // ==========================================
    // 分析
    // ==========================================

    pub fn fragrance_heat_index(&self, fragrance_id: &str) -> ApiResult<FragranceHeatIndex> {
        let fragrance = self
            .store
            .fragrance(fragrance_id)?
            .ok_or_else(|| ApiError::NotFound(format!("香精(id={})不存在", fragrance_id)))?;
        Ok(FragranceHeatIndex {
            id: fragrance.id,
            name: fragrance.name,
            heat_index: fragrance.heat_index,
            density_rating: fragrance.density_rating,
            category: fragrance.category,
        })
    }

    pub fn wax_conversion_analytics(
        &self,
        vessel_id: Option<&str>,
    ) -> ApiResult<Vec<WaxConversionView>> {
        Ok(self.store.assembly_repo.list_wax_conversions(vessel_id)?)
    }

    pub fn majority_baseline(&self) -> ApiResult<Vec<MajorityBaselineView>> {
        Ok(self.store.assembly_repo.list_majority_baselines()?)
    }

    pub fn prediction_errors(&self) -> ApiResult<PredictionErrorReport> {
        Ok(self.trainer.analyze_prediction_errors()?)
    }

    pub fn learning_curves(&self) -> ApiResult<LearningCurves> {
        Ok(self.trainer.learning_curves()?)
    }

    // ==========================================
    // 重新训练
    // ==========================================

    /// 训练并保存新模型, 成功后热替换推荐引擎的模型句柄
    #[instrument(skip(self))]
    pub fn retrain(&self) -> ApiResult<RetrainResponse> {
        let outcome = self.trainer.train_and_save_model()?;
        let metrics = outcome.metrics;
        let response = RetrainResponse {
            model_version: metrics.version.clone(),
            accuracy: metrics.accuracy,
            cv_score_mean: metrics.cv_score_mean,
            sample_size: metrics.sample_size,
            feature_importance: metrics.feature_importance,
            artifact_path: outcome
                .artifact_path
                .map(|p| p.display().to_string()),
        };

        let previous = self
            .model_handle()
            .swap(LoadedModel::from_artifact(outcome.artifact));
        info!(
            version = %response.model_version,
            previous = ?previous.map(|m| m.version.clone()),
            "烛芯模型已热替换"
        );
        Ok(response)
    }
}
