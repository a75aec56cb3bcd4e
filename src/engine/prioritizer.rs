// ==========================================
// 蜡烛烛芯推荐系统 - 测试优先级引擎
// ==========================================
// 职责: 从待验证的低置信预测中估计信息增益, 给出下一批实物测试
// 红线: 置信度只决定候选集合, 信息增益决定优先顺序
// ==========================================

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::domain::recommendation::TestPriority;
use crate::engine::store::AttributeStore;
use crate::repository::RepositoryResult;

/// 信息增益: (1 - 置信度) × ln(同类配方数 + 1)
pub fn information_gain(confidence: f64, similar_assembly_count: i64) -> f64 {
    (1.0 - confidence) * ((similar_assembly_count as f64) + 1.0).ln()
}

pub fn priority_reason(confidence: f64) -> String {
    format!(
        "Low confidence ({:.1}%) prediction needs verification",
        confidence * 100.0
    )
}

pub struct TestPrioritizer {
    store: Arc<dyn AttributeStore>,
    confidence_threshold: f64,
}

impl TestPrioritizer {
    pub fn new(store: Arc<dyn AttributeStore>, confidence_threshold: f64) -> Self {
        Self {
            store,
            confidence_threshold,
        }
    }

    /// 同 (容器, 蜡) 组合的配方数; 为 0 或查询失败时按 1 计
    fn similar_count(&self, vessel_id: &str, wax_type_id: &str) -> i64 {
        match self.store.count_assemblies(vessel_id, wax_type_id) {
            Ok(count) if count > 0 => count,
            Ok(_) => 1,
            Err(e) => {
                warn!(vessel_id, wax_type_id, error = %e, "同类配方计数失败, 按 1 计");
                1
            }
        }
    }

    /// 测试优先级（信息增益降序）
    #[instrument(skip(self))]
    pub fn get_test_priorities(&self, limit: usize) -> Vec<TestPriority> {
        let uncertain = match self
            .store
            .uncertain_predictions(self.confidence_threshold, limit)
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "查询低置信预测失败");
                return Vec::new();
            }
        };

        let mut priorities: Vec<TestPriority> = uncertain
            .into_iter()
            .map(|pred| {
                let similar = self.similar_count(&pred.vessel_id, &pred.wax_type_id);
                TestPriority {
                    assembly_id: pred.assembly_id,
                    assembly_name: pred.assembly_name,
                    uncertainty_score: 1.0 - pred.confidence_score,
                    information_gain: information_gain(pred.confidence_score, similar),
                    reason: priority_reason(pred.confidence_score),
                }
            })
            .collect();

        priorities.sort_by(|a, b| b.information_gain.total_cmp(&a.information_gain));
        debug!(count = priorities.len(), "测试优先级计算完成");
        priorities
    }

    /// 将优先级写入测试队列（已有未完成队列项的配方跳过）
    ///
    /// 返回新入队数量
    pub fn refresh_queue(&self, limit: usize) -> RepositoryResult<usize> {
        let mut enqueued = 0;
        let mut queued = std::collections::HashSet::new();
        for priority in self.get_test_priorities(limit) {
            if !queued.insert(priority.assembly_id.clone()) {
                continue;
            }
            if self.store.has_open_priority(&priority.assembly_id)? {
                continue;
            }
            self.store.enqueue_priority(
                &priority.assembly_id,
                priority.information_gain,
                &priority.reason,
            )?;
            enqueued += 1;
        }
        info!(enqueued, "测试队列已刷新");
        Ok(enqueued)
    }
}
