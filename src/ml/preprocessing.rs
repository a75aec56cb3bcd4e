// ==========================================
// 蜡烛烛芯推荐系统 - 特征预处理
// ==========================================
// 职责: 缺失值补全 / 类别编码 / 标准化
// ==========================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::ml::error::{MlError, MlResult};

/// 类别缺失且无众数时的占位值
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// 类别编码器（类别按字典序排列, 编码 = 下标）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<S: AsRef<str>>(values: &[S]) -> Self {
        let classes: BTreeSet<String> = values.iter().map(|v| v.as_ref().to_string()).collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn transform(&self, value: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(value)).ok()
    }

    /// 编码; 未见过的类别回退到 `unknown`（若存在）, 否则为 0
    pub fn transform_or_unknown(&self, value: &str) -> usize {
        self.transform(value)
            .or_else(|| self.transform(UNKNOWN_CATEGORY))
            .unwrap_or(0)
    }

    pub fn inverse(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(|s| s.as_str())
    }
}

/// 标准化器: (x - mean) / std, 总体标准差; std 为 0 时按 1 处理
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> MlResult<Self> {
        let first = rows
            .first()
            .ok_or_else(|| MlError::InsufficientData("标准化需要至少 1 行数据".to_string()))?;
        let n_features = first.len();
        let n = rows.len() as f64;

        let mut means = vec![0.0; n_features];
        for row in rows {
            check_dim(n_features, row.len())?;
            for (j, v) in row.iter().enumerate() {
                means[j] += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut stds = vec![0.0; n_features];
        for row in rows {
            for (j, v) in row.iter().enumerate() {
                stds[j] += (v - means[j]).powi(2);
            }
        }
        for s in stds.iter_mut() {
            *s = (*s / n).sqrt();
            if *s < 1e-12 {
                *s = 1.0;
            }
        }

        Ok(Self { means, stds })
    }

    /// 不做变换的标准化器
    pub fn identity(n_features: usize) -> Self {
        Self {
            means: vec![0.0; n_features],
            stds: vec![1.0; n_features],
        }
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }

    pub fn transform(&self, row: &[f64]) -> MlResult<Vec<f64>> {
        check_dim(self.means.len(), row.len())?;
        Ok(row
            .iter()
            .zip(self.means.iter().zip(self.stds.iter()))
            .map(|(v, (m, s))| (v - m) / s)
            .collect())
    }

    pub fn transform_all(&self, rows: &[Vec<f64>]) -> MlResult<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}

fn check_dim(expected: usize, actual: usize) -> MlResult<()> {
    if expected != actual {
        return Err(MlError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// 中位数（偶数个取中间两数均值）; 无值返回 None
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// 众数（并列取字典序最小）; 无值返回 None
pub fn mode<S: AsRef<str>>(values: &[S]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v.as_ref()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
        .map(|(v, _)| v.to_string())
}

/// 数值列补全: 缺失值用中位数（全缺失用 0）
pub fn impute_numeric(column: &[Option<f64>]) -> Vec<f64> {
    let present: Vec<f64> = column.iter().flatten().copied().collect();
    let fill = median(&present).unwrap_or(0.0);
    column.iter().map(|v| v.unwrap_or(fill)).collect()
}

/// 类别列补全: 缺失值用众数（全缺失用 `unknown`）
pub fn impute_categorical(column: &[Option<String>]) -> Vec<String> {
    let present: Vec<&str> = column
        .iter()
        .flatten()
        .map(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .collect();
    let fill = mode(&present).unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
    column
        .iter()
        .map(|v| match v {
            Some(s) if !s.trim().is_empty() => s.clone(),
            _ => fill.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_encoder_sorted_and_unknown_fallback() {
        let enc = LabelEncoder::fit(&["tumbler", "jar", "tin", "jar"]);
        assert_eq!(enc.classes(), &["jar", "tin", "tumbler"]);
        assert_eq!(enc.transform("tin"), Some(1));
        assert_eq!(enc.transform_or_unknown("bowl"), 0);

        let enc = LabelEncoder::fit(&["jar", UNKNOWN_CATEGORY, "tin"]);
        assert_eq!(enc.transform_or_unknown("bowl"), enc.transform(UNKNOWN_CATEGORY).unwrap());
        assert_eq!(enc.inverse(0), Some("jar"));
    }

    #[test]
    fn test_standard_scaler_population_std() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();
        let scaled = scaler.transform(&[3.0, 5.0]).unwrap();
        assert!((scaled[0] - 1.0).abs() < 1e-9);
        assert!(scaled[1].abs() < 1e-9);
        assert!(matches!(
            scaler.transform(&[1.0]),
            Err(MlError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_imputation() {
        assert_eq!(impute_numeric(&[Some(1.0), None, Some(3.0), Some(10.0)]), vec![1.0, 3.0, 3.0, 10.0]);
        assert_eq!(impute_numeric(&[None, None]), vec![0.0, 0.0]);

        let cats = impute_categorical(&[Some("glass".to_string()), None, Some("glass".to_string()), Some("metal".to_string())]);
        assert_eq!(cats, vec!["glass", "glass", "glass", "metal"]);
        assert_eq!(impute_categorical(&[None, None]), vec![UNKNOWN_CATEGORY, UNKNOWN_CATEGORY]);
    }

    #[test]
    fn test_mode_tie_is_deterministic() {
        assert_eq!(mode(&["b", "a", "b", "a"]), Some("a".to_string()));
        assert_eq!(mode::<&str>(&[]), None);
    }
}
