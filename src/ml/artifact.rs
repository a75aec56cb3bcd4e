// ==========================================
// 蜡烛烛芯推荐系统 - 模型制品
// ==========================================
// 职责: 模型 + 编码器 + 标准化器 + 特征名 作为一个整体持久化
// 文件: wick_predictor_<YYYYMMDD_HHMMSS_微秒>.json + wick_predictor_latest.json
// ==========================================

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ml::error::{MlError, MlResult};
use crate::ml::features::{FeatureRow, CATEGORICAL_FEATURES};
use crate::ml::gbdt::{GradientBoostedClassifier, WickClassifier};
use crate::ml::preprocessing::{LabelEncoder, StandardScaler};

pub const ARTIFACT_PREFIX: &str = "wick_predictor_";
pub const LATEST_ARTIFACT_FILE: &str = "wick_predictor_latest.json";
pub const MODEL_TYPE: &str = "gradient_boosted_trees";

/// 持久化的模型制品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub model_type: String,
    pub created_at: DateTime<Utc>,
    pub classifier: GradientBoostedClassifier,
    /// 目标编码器: 类别下标 → 烛芯 id
    pub target_encoder: LabelEncoder,
    pub scaler: StandardScaler,
    /// 原始类别列名 → 编码器
    pub categorical_encoders: BTreeMap<String, LabelEncoder>,
    pub feature_names: Vec<String>,
}

/// 版本号（训练时间, 精确到微秒）
///
/// 定长格式, 字典序即时间序; 同一秒内的多次训练不会互相覆盖
pub fn version_tag(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d_%H%M%S_%6f").to_string()
}

// ==========================================
// LoadedModel - 可供推荐器使用的模型
// ==========================================

pub struct LoadedModel {
    pub version: String,
    pub classifier: Box<dyn WickClassifier>,
    /// 类别下标 → 烛芯 id
    pub classes: Vec<String>,
    pub scaler: StandardScaler,
    pub categorical_encoders: BTreeMap<String, LabelEncoder>,
    pub feature_names: Vec<String>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("version", &self.version)
            .field("classes", &self.classes.len())
            .field("feature_names", &self.feature_names)
            .finish()
    }
}

impl LoadedModel {
    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self {
            version: artifact.version,
            classes: artifact.target_encoder.classes().to_vec(),
            classifier: Box::new(artifact.classifier),
            scaler: artifact.scaler,
            categorical_encoders: artifact.categorical_encoders,
            feature_names: artifact.feature_names,
        }
    }

    /// 按制品中的特征名顺序构建并标准化特征向量
    pub fn feature_vector(&self, row: &FeatureRow) -> MlResult<Vec<f64>> {
        let mut raw = Vec::with_capacity(self.feature_names.len());
        for name in &self.feature_names {
            if let Some(v) = row.numeric_value(name) {
                raw.push(v);
                continue;
            }

            let categorical = name
                .strip_suffix("_encoded")
                .filter(|c| CATEGORICAL_FEATURES.contains(c))
                .ok_or_else(|| MlError::UnknownFeature(name.clone()))?;
            let value = row
                .categorical_value(categorical)
                .ok_or_else(|| MlError::UnknownFeature(name.clone()))?;
            let code = self
                .categorical_encoders
                .get(categorical)
                .map(|enc| enc.transform_or_unknown(value))
                .unwrap_or(0);
            raw.push(code as f64);
        }
        self.scaler.transform(&raw)
    }

    /// 各烛芯的概率（与 classes 对齐）
    pub fn predict(&self, row: &FeatureRow) -> MlResult<Vec<(String, f64)>> {
        let features = self.feature_vector(row)?;
        let probas = self.classifier.predict_proba(&features)?;
        if probas.len() != self.classes.len() {
            return Err(MlError::DimensionMismatch {
                expected: self.classes.len(),
                actual: probas.len(),
            });
        }
        Ok(self.classes.iter().cloned().zip(probas).collect())
    }
}

// ==========================================
// ModelStore - 模型目录
// ==========================================

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn versioned_path(&self, version: &str) -> PathBuf {
        self.dir.join(format!("{}{}.json", ARTIFACT_PREFIX, version))
    }

    fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_ARTIFACT_FILE)
    }

    /// 保存版本文件并刷新 latest
    ///
    /// 返回版本文件路径
    pub fn save(&self, artifact: &ModelArtifact) -> MlResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string(artifact)?;

        let path = self.versioned_path(&artifact.version);
        fs::write(&path, &json)?;
        fs::write(self.latest_path(), &json)?;

        info!(version = %artifact.version, path = %path.display(), "模型制品已保存");
        Ok(path)
    }

    pub fn load_version(&self, version: &str) -> MlResult<ModelArtifact> {
        Self::read(&self.versioned_path(version))
    }

    pub fn load_latest(&self) -> MlResult<ModelArtifact> {
        Self::read(&self.latest_path())
    }

    fn read(path: &Path) -> MlResult<ModelArtifact> {
        if !path.exists() {
            return Err(MlError::ModelUnavailable(path.display().to_string()));
        }
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// 已保存的版本号（升序, 不含 latest）
    pub fn list_versions(&self) -> MlResult<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions: Vec<String> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name != LATEST_ARTIFACT_FILE)
            .filter_map(|name| {
                name.strip_prefix(ARTIFACT_PREFIX)
                    .and_then(|rest| rest.strip_suffix(".json"))
                    .map(|v| v.to_string())
            })
            .collect();
        versions.sort();
        Ok(versions)
    }
}
