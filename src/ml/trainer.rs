// ==========================================
// 蜡烛烛芯推荐系统 - 模型训练器（离线批处理）
// ==========================================
// 流程: 读取已批准配方 → 补全缺失值 → 编码 → 标准化 →
//       分层 80/20 划分 → 带早停训练 → 准确率 / 5 折交叉验证 / 特征重要度 →
//       保存制品 → 记录 ml_training_runs
// ==========================================

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::prediction::TrainingRun;
use crate::ml::artifact::{version_tag, ModelArtifact, ModelStore, MODEL_TYPE};
use crate::ml::error::{MlError, MlResult};
use crate::ml::features::{all_feature_names, FeatureRow, CATEGORICAL_FEATURES, NUMERIC_FEATURES};
use crate::ml::gbdt::{accuracy, GbdtParams, GradientBoostedClassifier};
use crate::ml::preprocessing::{impute_categorical, impute_numeric, LabelEncoder, StandardScaler};
use crate::ml::split::{mean_and_std, stratified_k_fold, stratified_train_test_split, DEFAULT_SEED};
use crate::engine::store::{AttributeStore, SqliteAttributeStore};
use crate::repository::TrainingRecord;

/// ml_training_runs.model_type
pub const TRAINING_RUN_MODEL_TYPE: &str = "wick_predictor";
pub const TEST_RATIO: f64 = 0.2;
pub const CV_FOLDS: usize = 5;
/// 学习曲线取最近的训练次数
pub const LEARNING_CURVE_RUNS: usize = 20;
/// 错误分析中的低置信阈值
pub const LOW_CONFIDENCE_ERROR_THRESHOLD: f64 = 0.5;
const TOP_PATTERNS: usize = 5;

// ==========================================
// 结果结构
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub version: String,
    pub accuracy: f64,
    pub cv_score_mean: Option<f64>,
    pub cv_score_std: Option<f64>,
    pub sample_size: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub n_classes: usize,
    pub boosting_rounds: usize,
    /// 重要度降序
    pub feature_importance: Vec<FeatureImportance>,
    pub top_features: Vec<String>,
}

#[derive(Debug)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub metrics: TrainingMetrics,
    pub artifact_path: Option<PathBuf>,
}

/// 编码并标准化后的数据集
#[derive(Debug, Clone)]
pub struct EncodedDataset {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<usize>,
    pub target_encoder: LabelEncoder,
    pub scaler: StandardScaler,
    pub categorical_encoders: BTreeMap<String, LabelEncoder>,
    pub feature_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub name: String,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionErrorReport {
    pub error_count: usize,
    pub top_vessels: Vec<ErrorCount>,
    pub top_waxes: Vec<ErrorCount>,
    pub low_confidence_errors: usize,
    pub low_confidence_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPoint {
    pub version: String,
    pub accuracy: f64,
    pub cv_score: Option<f64>,
    pub sample_size: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningCurves {
    /// 新 → 旧
    pub runs: Vec<LearningPoint>,
    pub current_accuracy: Option<f64>,
    /// 最新 - 最旧（少于 2 次训练为 0）
    pub improvement: f64,
}

// ==========================================
// 纯函数: 数据准备
// ==========================================

/// 补全缺失值并转换为特征行
///
/// 数值列用中位数, 类别列用众数（无众数用 `unknown`）, 双芯缺失视为 false
pub fn build_feature_rows(records: &[TrainingRecord]) -> (Vec<FeatureRow>, Vec<String>) {
    let numeric_columns: Vec<Vec<f64>> = vec![
        impute_numeric(&records.iter().map(|r| r.volume_ml).collect::<Vec<_>>()),
        impute_numeric(&records.iter().map(|r| r.diameter_mm).collect::<Vec<_>>()),
        impute_numeric(&records.iter().map(|r| r.height_mm).collect::<Vec<_>>()),
        records
            .iter()
            .map(|r| if r.double_wick.unwrap_or(false) { 1.0 } else { 0.0 })
            .collect(),
        impute_numeric(&records.iter().map(|r| r.heat_dissipation_factor).collect::<Vec<_>>()),
        impute_numeric(&records.iter().map(|r| r.melt_point_celsius).collect::<Vec<_>>()),
        impute_numeric(&records.iter().map(|r| r.viscosity_index).collect::<Vec<_>>()),
        impute_numeric(&records.iter().map(|r| r.flash_point_celsius).collect::<Vec<_>>()),
        impute_numeric(&records.iter().map(|r| r.heat_index).collect::<Vec<_>>()),
        impute_numeric(&records.iter().map(|r| r.fragrance_load_percentage).collect::<Vec<_>>()),
    ];
    let categorical_columns: Vec<Vec<String>> = vec![
        impute_categorical(&records.iter().map(|r| r.vessel_shape.clone()).collect::<Vec<_>>()),
        impute_categorical(&records.iter().map(|r| r.vessel_material.clone()).collect::<Vec<_>>()),
        impute_categorical(&records.iter().map(|r| r.wax_base_type.clone()).collect::<Vec<_>>()),
        impute_categorical(&records.iter().map(|r| r.fragrance_category.clone()).collect::<Vec<_>>()),
    ];

    let rows = (0..records.len())
        .map(|i| {
            let mut numeric = [0.0; NUMERIC_FEATURES.len()];
            for (j, column) in numeric_columns.iter().enumerate() {
                numeric[j] = column[i];
            }
            FeatureRow {
                numeric,
                categorical: [
                    categorical_columns[0][i].clone(),
                    categorical_columns[1][i].clone(),
                    categorical_columns[2][i].clone(),
                    categorical_columns[3][i].clone(),
                ],
            }
        })
        .collect();
    let labels = records.iter().map(|r| r.wick_id.clone()).collect();
    (rows, labels)
}

/// 编码类别特征与目标, 拟合标准化器
pub fn encode_dataset(rows: &[FeatureRow], labels: &[String]) -> MlResult<EncodedDataset> {
    let mut categorical_encoders = BTreeMap::new();
    for (j, name) in CATEGORICAL_FEATURES.iter().enumerate() {
        let values: Vec<&str> = rows.iter().map(|r| r.categorical[j].as_str()).collect();
        categorical_encoders.insert(name.to_string(), LabelEncoder::fit(&values));
    }

    let raw: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| {
            let mut v: Vec<f64> = row.numeric.to_vec();
            for (j, name) in CATEGORICAL_FEATURES.iter().enumerate() {
                let code = categorical_encoders
                    .get(*name)
                    .map(|enc| enc.transform_or_unknown(&row.categorical[j]))
                    .unwrap_or(0);
                v.push(code as f64);
            }
            v
        })
        .collect();

    let scaler = StandardScaler::fit(&raw)?;
    let x = scaler.transform_all(&raw)?;

    let target_encoder = LabelEncoder::fit(labels);
    let y = labels
        .iter()
        .map(|l| {
            target_encoder
                .transform(l)
                .ok_or_else(|| MlError::InsufficientData(format!("目标编码失败: {}", l)))
        })
        .collect::<MlResult<Vec<usize>>>()?;

    Ok(EncodedDataset {
        x,
        y,
        target_encoder,
        scaler,
        categorical_encoders,
        feature_names: all_feature_names(),
    })
}

fn select(x: &[Vec<f64>], y: &[usize], idx: &[usize]) -> (Vec<Vec<f64>>, Vec<usize>) {
    (
        idx.iter().map(|&i| x[i].clone()).collect(),
        idx.iter().map(|&i| y[i]).collect(),
    )
}

fn top_counts<'a>(names: impl Iterator<Item = &'a str>) -> Vec<ErrorCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for n in names {
        *counts.entry(n).or_insert(0) += 1;
    }
    let mut sorted: Vec<ErrorCount> = counts
        .into_iter()
        .map(|(name, errors)| ErrorCount {
            name: name.to_string(),
            errors,
        })
        .collect();
    sorted.sort_by(|a, b| b.errors.cmp(&a.errors).then_with(|| a.name.cmp(&b.name)));
    sorted.truncate(TOP_PATTERNS);
    sorted
}

// ==========================================
// WickModelTrainer
// ==========================================

/// 模型训练器
///
/// 读路径（训练样本 / 错误分析 / 训练历史）直接走仓储,
/// 训练记录写入经 `AttributeStore` 接口。
pub struct WickModelTrainer {
    store: Arc<SqliteAttributeStore>,
    model_store: ModelStore,
    params: GbdtParams,
    seed: u64,
}

impl WickModelTrainer {
    pub fn new(store: Arc<SqliteAttributeStore>, model_store: ModelStore) -> Self {
        Self {
            store,
            model_store,
            params: GbdtParams::default(),
            seed: DEFAULT_SEED,
        }
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>, model_store: ModelStore) -> Self {
        Self::new(Arc::new(SqliteAttributeStore::from_connection(conn)), model_store)
    }

    pub fn with_params(mut self, params: GbdtParams) -> Self {
        self.params = params;
        self
    }

    pub fn model_store(&self) -> &ModelStore {
        &self.model_store
    }

    /// 训练样本: 已批准且记录了烛芯的配方 JOIN 物料属性
    pub fn prepare_training_data(&self) -> MlResult<Vec<TrainingRecord>> {
        Ok(self.store.assembly_repo.list_training_records()?)
    }

    /// 训练（不落盘）
    #[instrument(skip(self, records), fields(samples = records.len()))]
    pub fn train(&self, records: &[TrainingRecord]) -> MlResult<TrainingOutcome> {
        if records.len() < 2 {
            return Err(MlError::InsufficientData(format!(
                "已批准配方数量不足: {}",
                records.len()
            )));
        }

        let (rows, labels) = build_feature_rows(records);
        let data = encode_dataset(&rows, &labels)?;
        let n_classes = data.target_encoder.len();
        if n_classes < 2 {
            return Err(MlError::InsufficientData(format!(
                "烛芯类别不足 2 个: {}",
                n_classes
            )));
        }

        let (train_idx, test_idx) = stratified_train_test_split(&data.y, TEST_RATIO, self.seed)?;
        let (x_train, y_train) = select(&data.x, &data.y, &train_idx);
        let (x_test, y_test) = select(&data.x, &data.y, &test_idx);

        let classifier = GradientBoostedClassifier::fit(
            &x_train,
            &y_train,
            n_classes,
            Some((&x_test, &y_test)),
            &self.params,
        )?;
        let test_accuracy = accuracy(&classifier, &x_test, &y_test)?;

        // 交叉验证使用早停确定的轮数
        let (cv_score_mean, cv_score_std) = match self.cross_validate(&data, n_classes, classifier.best_iteration())? {
            Some((mean, std)) => (Some(mean), Some(std)),
            None => {
                warn!("样本过少, 跳过交叉验证");
                (None, None)
            }
        };

        let mut feature_importance: Vec<FeatureImportance> = data
            .feature_names
            .iter()
            .zip(classifier.feature_importances())
            .map(|(feature, &importance)| FeatureImportance {
                feature: feature.clone(),
                importance,
            })
            .collect();
        feature_importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        let top_features = feature_importance
            .iter()
            .take(5)
            .map(|f| f.feature.clone())
            .collect();

        let created_at = Utc::now();
        let version = version_tag(created_at);
        let metrics = TrainingMetrics {
            version: version.clone(),
            accuracy: test_accuracy,
            cv_score_mean,
            cv_score_std,
            sample_size: records.len(),
            train_size: train_idx.len(),
            test_size: test_idx.len(),
            n_classes,
            boosting_rounds: classifier.best_iteration(),
            feature_importance,
            top_features,
        };

        info!(
            version = %version,
            accuracy = test_accuracy,
            n_classes,
            rounds = classifier.best_iteration(),
            "烛芯模型训练完成"
        );

        let artifact = ModelArtifact {
            version,
            model_type: MODEL_TYPE.to_string(),
            created_at,
            classifier,
            target_encoder: data.target_encoder,
            scaler: data.scaler,
            categorical_encoders: data.categorical_encoders,
            feature_names: data.feature_names,
        };

        Ok(TrainingOutcome {
            artifact,
            metrics,
            artifact_path: None,
        })
    }

    fn cross_validate(
        &self,
        data: &EncodedDataset,
        n_classes: usize,
        rounds: usize,
    ) -> MlResult<Option<(f64, f64)>> {
        let folds = match stratified_k_fold(&data.y, CV_FOLDS, self.seed) {
            Some(f) => f,
            None => return Ok(None),
        };
        let params = GbdtParams {
            n_rounds: rounds.max(1),
            ..self.params.clone()
        };

        let mut scores = Vec::with_capacity(folds.len());
        for (train_idx, test_idx) in folds {
            let (x_train, y_train) = select(&data.x, &data.y, &train_idx);
            let (x_test, y_test) = select(&data.x, &data.y, &test_idx);
            let model = GradientBoostedClassifier::fit(&x_train, &y_train, n_classes, None, &params)?;
            scores.push(accuracy(&model, &x_test, &y_test)?);
        }
        Ok(mean_and_std(&scores))
    }

    /// 完整流程: 准备数据 → 训练 → 保存 → 记录训练历史
    #[instrument(skip(self))]
    pub fn train_and_save_model(&self) -> MlResult<TrainingOutcome> {
        let records = self.prepare_training_data()?;
        let mut outcome = self.train(&records)?;
        let path = self.model_store.save(&outcome.artifact)?;
        outcome.artifact_path = Some(path);

        let run = TrainingRun {
            model_type: TRAINING_RUN_MODEL_TYPE.to_string(),
            version: outcome.metrics.version.clone(),
            accuracy: outcome.metrics.accuracy,
            cv_score: outcome.metrics.cv_score_mean,
            sample_size: outcome.metrics.sample_size as i64,
            metrics_json: serde_json::to_string(&outcome.metrics)?,
            created_at: outcome.artifact.created_at,
        };
        self.store.insert_training_run(&run)?;

        Ok(outcome)
    }

    /// 预测错误分析（已验证且预测烛芯与实际不一致）
    pub fn analyze_prediction_errors(&self) -> MlResult<PredictionErrorReport> {
        let misses = self.store.prediction_repo.list_prediction_misses()?;
        let error_count = misses.len();

        let low_confidence_errors = misses
            .iter()
            .filter(|m| m.confidence_score < LOW_CONFIDENCE_ERROR_THRESHOLD)
            .count();
        let low_confidence_percentage = if error_count == 0 {
            0.0
        } else {
            low_confidence_errors as f64 / error_count as f64 * 100.0
        };

        Ok(PredictionErrorReport {
            error_count,
            top_vessels: top_counts(misses.iter().map(|m| m.vessel_name.as_str())),
            top_waxes: top_counts(misses.iter().map(|m| m.wax_name.as_str())),
            low_confidence_errors,
            low_confidence_percentage,
        })
    }

    /// 最近训练记录的准确率变化
    pub fn learning_curves(&self) -> MlResult<LearningCurves> {
        let runs: Vec<LearningPoint> = self
            .store
            .training_run_repo
            .list_recent(TRAINING_RUN_MODEL_TYPE, LEARNING_CURVE_RUNS)?
            .into_iter()
            .map(|r| LearningPoint {
                version: r.version,
                accuracy: r.accuracy,
                cv_score: r.cv_score,
                sample_size: r.sample_size,
                created_at: r.created_at,
            })
            .collect();

        let current_accuracy = runs.first().map(|r| r.accuracy);
        let improvement = match (runs.first(), runs.last()) {
            (Some(newest), Some(oldest)) if runs.len() > 1 => newest.accuracy - oldest.accuracy,
            _ => 0.0,
        };

        Ok(LearningCurves {
            runs,
            current_accuracy,
            improvement,
        })
    }
}
