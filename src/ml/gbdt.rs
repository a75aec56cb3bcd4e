// ==========================================
// 蜡烛烛芯推荐系统 - 梯度提升树分类器
// ==========================================
// 多分类 softmax 提升, 每轮每个类别一棵二阶回归树
// 树节点存放在 arena (Vec<TreeNode>) 中, 根节点下标为 0
// ==========================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ml::error::{MlError, MlResult};

/// 分类器接口（推荐器只依赖该 trait, 便于替换与测试）
pub trait WickClassifier: Send + Sync {
    /// 输入已标准化的特征向量, 返回各类别概率（与类别下标对齐）
    fn predict_proba(&self, features: &[f64]) -> MlResult<Vec<f64>>;

    fn n_classes(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtParams {
    pub n_rounds: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// L2 叶子正则
    pub lambda: f64,
    pub min_child_weight: f64,
    /// 验证集 log loss 连续多少轮未改善即停止
    pub early_stopping_rounds: usize,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_rounds: 100,
            max_depth: 6,
            learning_rate: 0.1,
            lambda: 1.0,
            min_child_weight: 1e-3,
            early_stopping_rounds: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let v = x.get(*feature).copied().unwrap_or(0.0);
                    idx = if v <= *threshold { *left } else { *right };
                }
                None => return 0.0,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// 单棵树的构建上下文
struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a GbdtParams,
    nodes: Vec<TreeNode>,
    gains: &'a mut [f64],
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

impl<'a> TreeBuilder<'a> {
    fn leaf_value(&self, samples: &[usize]) -> f64 {
        let (g, h) = self.sums(samples);
        -g / (h + self.params.lambda)
    }

    fn sums(&self, samples: &[usize]) -> (f64, f64) {
        samples
            .iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + self.grad[i], h + self.hess[i]))
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    /// 精确贪心分裂搜索
    fn find_split(&self, samples: &[usize]) -> Option<BestSplit> {
        let n_features = self.x.first().map(|r| r.len()).unwrap_or(0);
        let (g_total, h_total) = self.sums(samples);
        let parent = self.score(g_total, h_total);

        let mut best: Option<(usize, f64, f64)> = None;
        let mut order: Vec<usize> = samples.to_vec();

        for feature in 0..n_features {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for pos in 0..order.len().saturating_sub(1) {
                let i = order[pos];
                g_left += self.grad[i];
                h_left += self.hess[i];

                let v = self.x[i][feature];
                let next = self.x[order[pos + 1]][feature];
                if next <= v {
                    continue;
                }

                let g_right = g_total - g_left;
                let h_right = h_total - h_left;
                if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                    continue;
                }

                let gain = 0.5
                    * (self.score(g_left, h_left) + self.score(g_right, h_right) - parent);
                if gain > 1e-12 && best.map(|(_, _, bg)| gain > bg).unwrap_or(true) {
                    best = Some((feature, (v + next) / 2.0, gain));
                }
            }
        }

        best.map(|(feature, threshold, gain)| {
            let (left, right): (Vec<usize>, Vec<usize>) = samples
                .iter()
                .partition(|&&i| self.x[i][feature] <= threshold);
            BestSplit {
                feature,
                threshold,
                gain,
                left,
                right,
            }
        })
    }

    fn build(&mut self, samples: &[usize], depth: usize) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value: self.leaf_value(samples),
        });

        if depth >= self.params.max_depth || samples.len() < 2 {
            return idx;
        }

        if let Some(split) = self.find_split(samples) {
            self.gains[split.feature] += split.gain;
            let left = self.build(&split.left, depth + 1);
            let right = self.build(&split.right, depth + 1);
            self.nodes[idx] = TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
        }
        idx
    }
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

fn log_loss(probas: &[Vec<f64>], y: &[usize]) -> f64 {
    let total: f64 = probas
        .iter()
        .zip(y)
        .map(|(p, &label)| -p.get(label).copied().unwrap_or(0.0).max(1e-15).ln())
        .sum();
    total / y.len().max(1) as f64
}

// ==========================================
// GradientBoostedClassifier
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    n_classes: usize,
    n_features: usize,
    learning_rate: f64,
    /// rounds[r][k] = 第 r 轮第 k 类的树
    rounds: Vec<Vec<RegressionTree>>,
    feature_importances: Vec<f64>,
    best_iteration: usize,
}

impl GradientBoostedClassifier {
    /// 训练
    ///
    /// `eval` 提供时在验证集上做早停, 保留验证 log loss 最优的轮数
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        eval: Option<(&[Vec<f64>], &[usize])>,
        params: &GbdtParams,
    ) -> MlResult<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(MlError::InsufficientData(format!(
                "样本数与标签数不一致或为空: {} / {}",
                x.len(),
                y.len()
            )));
        }
        if n_classes < 2 {
            return Err(MlError::InsufficientData(format!("类别数不足: {}", n_classes)));
        }
        let n_features = x[0].len();
        if let Some(row) = x.iter().find(|r| r.len() != n_features) {
            return Err(MlError::DimensionMismatch {
                expected: n_features,
                actual: row.len(),
            });
        }
        if let Some(&bad) = y.iter().find(|&&label| label >= n_classes) {
            return Err(MlError::InsufficientData(format!("标签越界: {}", bad)));
        }

        let mut model = Self {
            n_classes,
            n_features,
            learning_rate: params.learning_rate,
            rounds: Vec::new(),
            feature_importances: vec![0.0; n_features],
            best_iteration: 0,
        };

        let n = x.len();
        let mut train_scores = vec![vec![0.0; n_classes]; n];
        let mut eval_scores = eval.map(|(ex, _)| vec![vec![0.0; n_classes]; ex.len()]);
        let mut gains = vec![0.0; n_features];
        let mut round_gains: Vec<Vec<f64>> = Vec::new();

        let mut best_loss = f64::INFINITY;
        let mut best_rounds = 0;
        let mut stale = 0;

        let all: Vec<usize> = (0..n).collect();
        for round in 0..params.n_rounds {
            let probas: Vec<Vec<f64>> = train_scores.iter().map(|s| softmax(s)).collect();
            let mut trees = Vec::with_capacity(n_classes);
            let mut this_round = vec![0.0; n_features];

            for k in 0..n_classes {
                let grad: Vec<f64> = (0..n)
                    .map(|i| probas[i][k] - if y[i] == k { 1.0 } else { 0.0 })
                    .collect();
                let hess: Vec<f64> = (0..n)
                    .map(|i| (probas[i][k] * (1.0 - probas[i][k])).max(1e-16))
                    .collect();

                let mut builder = TreeBuilder {
                    x,
                    grad: &grad,
                    hess: &hess,
                    params,
                    nodes: Vec::new(),
                    gains: &mut this_round,
                };
                builder.build(&all, 0);
                let tree = RegressionTree {
                    nodes: builder.nodes,
                };

                for (i, row) in x.iter().enumerate() {
                    train_scores[i][k] += params.learning_rate * tree.predict(row);
                }
                if let (Some(scores), Some((ex, _))) = (eval_scores.as_mut(), eval) {
                    for (i, row) in ex.iter().enumerate() {
                        scores[i][k] += params.learning_rate * tree.predict(row);
                    }
                }
                trees.push(tree);
            }
            model.rounds.push(trees);
            round_gains.push(this_round);

            if let (Some(scores), Some((_, ey))) = (eval_scores.as_ref(), eval) {
                let probas: Vec<Vec<f64>> = scores.iter().map(|s| softmax(s)).collect();
                let loss = log_loss(&probas, ey);
                if loss < best_loss - 1e-12 {
                    best_loss = loss;
                    best_rounds = round + 1;
                    stale = 0;
                } else {
                    stale += 1;
                    if stale >= params.early_stopping_rounds {
                        debug!(round, best_rounds, best_loss, "验证集 log loss 不再下降, 提前停止");
                        break;
                    }
                }
            }
        }

        if eval.is_some() && best_rounds > 0 {
            model.rounds.truncate(best_rounds);
            round_gains.truncate(best_rounds);
        }
        model.best_iteration = model.rounds.len();

        for rg in &round_gains {
            for (total, g) in gains.iter_mut().zip(rg) {
                *total += g;
            }
        }
        let sum: f64 = gains.iter().sum();
        if sum > 0.0 {
            gains.iter_mut().for_each(|g| *g /= sum);
        }
        model.feature_importances = gains;

        Ok(model)
    }

    fn raw_scores(&self, x: &[f64]) -> Vec<f64> {
        let mut scores = vec![0.0; self.n_classes];
        for trees in &self.rounds {
            for (k, tree) in trees.iter().enumerate() {
                scores[k] += self.learning_rate * tree.predict(x);
            }
        }
        scores
    }

    pub fn predict(&self, x: &[f64]) -> MlResult<usize> {
        let probas = self.predict_proba(x)?;
        Ok(probas
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.total_cmp(b).then(ib.cmp(ia)))
            .map(|(i, _)| i)
            .unwrap_or(0))
    }

    /// 归一化的增益重要度（与特征下标对齐, 总和为 1; 无分裂时全 0）
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// 实际保留的轮数
    pub fn best_iteration(&self) -> usize {
        self.best_iteration
    }
}

impl WickClassifier for GradientBoostedClassifier {
    fn predict_proba(&self, features: &[f64]) -> MlResult<Vec<f64>> {
        if features.len() != self.n_features {
            return Err(MlError::DimensionMismatch {
                expected: self.n_features,
                actual: features.len(),
            });
        }
        Ok(softmax(&self.raw_scores(features)))
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }
}

/// 分类准确率
pub fn accuracy(model: &GradientBoostedClassifier, x: &[Vec<f64>], y: &[usize]) -> MlResult<f64> {
    if x.is_empty() {
        return Ok(0.0);
    }
    let mut correct = 0usize;
    for (row, &label) in x.iter().zip(y) {
        if model.predict(row)? == label {
            correct += 1;
        }
    }
    Ok(correct as f64 / x.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 三个可分的簇: 特征 0 决定类别, 特征 1 为噪声
    fn clusters() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..10 {
            let noise = (i % 3) as f64;
            x.push(vec![-2.0 + i as f64 * 0.01, noise]);
            y.push(0);
            x.push(vec![0.0 + i as f64 * 0.01, noise]);
            y.push(1);
            x.push(vec![2.0 + i as f64 * 0.01, noise]);
            y.push(2);
        }
        (x, y)
    }

    #[test]
    fn test_fit_separable_clusters() {
        let (x, y) = clusters();
        let params = GbdtParams {
            n_rounds: 30,
            ..GbdtParams::default()
        };
        let model = GradientBoostedClassifier::fit(&x, &y, 3, None, &params).unwrap();

        assert_eq!(accuracy(&model, &x, &y).unwrap(), 1.0);
        let p = model.predict_proba(&[2.05, 1.0]).unwrap();
        assert_eq!(p.len(), 3);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(p[2] > 0.5);

        // 特征 0 决定类别, 重要度应占主导
        let imp = model.feature_importances();
        assert!(imp[0] > imp[1]);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_early_stopping_truncates_rounds() {
        let (x, y) = clusters();
        let params = GbdtParams {
            n_rounds: 200,
            early_stopping_rounds: 5,
            ..GbdtParams::default()
        };
        // 验证集标签与训练集相反, 验证损失会很快开始上升
        let flipped: Vec<usize> = y.iter().map(|&l| 2 - l).collect();
        let model =
            GradientBoostedClassifier::fit(&x, &y, 3, Some((&x, &flipped)), &params).unwrap();
        assert!(model.best_iteration() < 200);
    }

    #[test]
    fn test_dimension_and_label_checks() {
        let (x, y) = clusters();
        let model =
            GradientBoostedClassifier::fit(&x, &y, 3, None, &GbdtParams { n_rounds: 2, ..GbdtParams::default() })
                .unwrap();
        assert!(matches!(
            model.predict_proba(&[1.0]),
            Err(MlError::DimensionMismatch { expected: 2, actual: 1 })
        ));
        assert!(GradientBoostedClassifier::fit(&x, &y, 1, None, &GbdtParams::default()).is_err());
        assert!(GradientBoostedClassifier::fit(&[], &[], 2, None, &GbdtParams::default()).is_err());
    }

    #[test]
    fn test_serde_roundtrip_preserves_predictions() {
        let (x, y) = clusters();
        let model =
            GradientBoostedClassifier::fit(&x, &y, 3, None, &GbdtParams { n_rounds: 5, ..GbdtParams::default() })
                .unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: GradientBoostedClassifier = serde_json::from_str(&json).unwrap();
        let before = model.predict_proba(&x[4]).unwrap();
        let after = restored.predict_proba(&x[4]).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
