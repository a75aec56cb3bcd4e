// ==========================================
// 蜡烛烛芯推荐系统 - 分层划分
// ==========================================
// 职责: 分层训练/测试划分, 分层 K 折
// 约束: 固定种子, 结果可复现
// ==========================================

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::ml::error::{MlError, MlResult};

/// 默认随机种子
pub const DEFAULT_SEED: u64 = 42;

fn group_by_class(labels: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(i);
    }
    groups
}

/// 分层训练/测试划分
///
/// - 每个类别按比例抽取测试样本（至少 1 个, 且至少留 1 个在训练集）
/// - 只有 1 个样本的类别全部留在训练集
/// - 测试集为空时返回 `InsufficientData`
///
/// 返回 (train_indices, test_indices), 均为升序
pub fn stratified_train_test_split(
    labels: &[usize],
    test_ratio: f64,
    seed: u64,
) -> MlResult<(Vec<usize>, Vec<usize>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for (_, mut indices) in group_by_class(labels) {
        indices.shuffle(&mut rng);
        let n = indices.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_ratio).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    if test.is_empty() {
        return Err(MlError::InsufficientData(
            "分层划分后测试集为空（每个烛芯至少需要 2 个样本）".to_string(),
        ));
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok((train, test))
}

/// 分层 K 折
///
/// 折数 = min(k, 样本数); 少于 2 折时返回 None。
/// 每个类别洗牌后轮转分配到各折, 跨类别延续偏移以平衡折大小。
pub fn stratified_k_fold(
    labels: &[usize],
    k: usize,
    seed: u64,
) -> Option<Vec<(Vec<usize>, Vec<usize>)>> {
    let n_folds = k.min(labels.len());
    if n_folds < 2 {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut fold_of = vec![0usize; labels.len()];
    let mut offset = 0usize;
    for (_, mut indices) in group_by_class(labels) {
        indices.shuffle(&mut rng);
        for (pos, idx) in indices.into_iter().enumerate() {
            fold_of[idx] = (offset + pos) % n_folds;
        }
        offset += 1;
    }

    let folds = (0..n_folds)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..labels.len()).partition(|&i| fold_of[i] == fold);
            (train, test)
        })
        .filter(|(train, test)| !train.is_empty() && !test.is_empty())
        .collect();
    Some(folds)
}

/// 均值与总体标准差
pub fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}
