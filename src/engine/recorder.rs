// ==========================================
// 蜡烛烛芯推荐系统 - 测试结果记录
// ==========================================
// 三步写入, 互不依赖:
//   1. 追加测试结果
//   2. 将配方的待验证预测标记为已验证（仅通过时写入 actual_wick_id）
//   3. 完成配方的测试队列项
// 红线: 任一步失败只记录日志, 其余步骤照常执行（不做事务）
//       失败窗口内可能出现"有测试结果但预测未验证"的状态, 下次记录时自愈
// ==========================================

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::domain::prediction::{TestData, TestResult};
use crate::engine::store::AttributeStore;

/// 每一步的执行结果（None = 该步失败）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub test_result_id: Option<String>,
    pub predictions_verified: Option<usize>,
    pub queue_entries_completed: Option<usize>,
}

impl RecordOutcome {
    pub fn is_complete(&self) -> bool {
        self.test_result_id.is_some()
            && self.predictions_verified.is_some()
            && self.queue_entries_completed.is_some()
    }
}

pub struct TestResultRecorder {
    store: Arc<dyn AttributeStore>,
}

impl TestResultRecorder {
    pub fn new(store: Arc<dyn AttributeStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, test_data))]
    pub fn record_test_result(
        &self,
        assembly_id: &str,
        wick_id_tested: &str,
        test_data: &TestData,
        passed: bool,
    ) -> RecordOutcome {
        let now = Utc::now();

        // 1. 测试结果
        let result = TestResult {
            id: uuid::Uuid::new_v4().to_string(),
            assembly_id: assembly_id.to_string(),
            wick_id_tested: wick_id_tested.to_string(),
            test_date: now,
            test_type: test_data.test_type,
            flame_height_mm: test_data.flame_height_mm,
            melt_pool_mm_at_2h: test_data.melt_pool_mm_at_2h,
            passed,
            notes: test_data.notes.clone(),
            tested_by: test_data.tested_by.clone(),
        };
        let test_result_id = match self.store.insert_test_result(&result) {
            Ok(()) => Some(result.id),
            Err(e) => {
                error!(assembly_id, error = %e, "写入测试结果失败");
                None
            }
        };

        // 2. 验证预测; 失败的测试不断言正确烛芯
        let actual_wick_id = if passed { Some(wick_id_tested) } else { None };
        let predictions_verified =
            match self
                .store
                .mark_predictions_verified(assembly_id, actual_wick_id, now)
            {
                Ok(n) => Some(n),
                Err(e) => {
                    error!(assembly_id, error = %e, "更新预测验证状态失败");
                    None
                }
            };

        // 3. 完成队列项
        let queue_entries_completed = match self.store.complete_priorities(assembly_id, now) {
            Ok(n) => Some(n),
            Err(e) => {
                error!(assembly_id, error = %e, "更新测试队列失败");
                None
            }
        };

        let outcome = RecordOutcome {
            test_result_id,
            predictions_verified,
            queue_entries_completed,
        };
        info!(
            assembly_id,
            wick_id_tested,
            passed,
            complete = outcome.is_complete(),
            "测试结果已记录"
        );
        outcome
    }
}
