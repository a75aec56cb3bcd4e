// ==========================================
// 蜡烛烛芯推荐系统 - 引擎层属性存储
// ==========================================
// 职责: 聚合推荐引擎所需的全部数据访问（点查 / 过滤查询 / 写入）
// 红线: Engine 不拼 SQL, 只通过 AttributeStore 访问数据
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::domain::assembly::{MajorityBaseline, WaxConversionDelta};
use crate::domain::component::{FragranceOil, Vessel, WaxType, Wick};
use crate::domain::prediction::{TestResult, TrainingRun, UncertainPrediction};
use crate::repository::{
    AssemblyRepository, ComponentRepository, PredictionRepository, RepositoryResult,
    TrainingRunRepository,
};

/// 推荐引擎的数据访问接口
///
/// 任何实现该 trait 的类型都可以注入推荐器 / 优先级器 / 记录器,
/// 测试时可替换为内存实现。
pub trait AttributeStore: Send + Sync {
    // ----- 点查 -----
    fn vessel(&self, id: &str) -> RepositoryResult<Option<Vessel>>;
    fn wax_type(&self, id: &str) -> RepositoryResult<Option<WaxType>>;
    fn fragrance(&self, id: &str) -> RepositoryResult<Option<FragranceOil>>;
    fn wick(&self, id: &str) -> RepositoryResult<Option<Wick>>;
    fn wick_by_name(&self, name: &str) -> RepositoryResult<Option<Wick>>;

    // ----- 过滤查询 -----
    /// 同系列烛芯（size_index 升序）
    fn wicks_in_series(&self, series: &str) -> RepositoryResult<Vec<Wick>>;
    fn majority_baseline(
        &self,
        vessel_id: &str,
        wax_type_id: &str,
    ) -> RepositoryResult<Option<MajorityBaseline>>;
    fn wax_conversion_delta(
        &self,
        vessel_id: &str,
        old_wax_type_id: &str,
        new_wax_type_id: &str,
    ) -> RepositoryResult<Option<WaxConversionDelta>>;
    fn count_assemblies(&self, vessel_id: &str, wax_type_id: &str) -> RepositoryResult<i64>;
    /// 待验证的低置信预测（置信度升序）
    fn uncertain_predictions(
        &self,
        confidence_threshold: f64,
        limit: usize,
    ) -> RepositoryResult<Vec<UncertainPrediction>>;
    fn has_open_priority(&self, assembly_id: &str) -> RepositoryResult<bool>;

    // ----- 写入 -----
    fn insert_test_result(&self, result: &TestResult) -> RepositoryResult<()>;
    fn mark_predictions_verified(
        &self,
        assembly_id: &str,
        actual_wick_id: Option<&str>,
        verified_at: DateTime<Utc>,
    ) -> RepositoryResult<usize>;
    fn complete_priorities(
        &self,
        assembly_id: &str,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<usize>;
    fn enqueue_priority(
        &self,
        assembly_id: &str,
        priority_score: f64,
        reason: &str,
    ) -> RepositoryResult<i64>;
    fn insert_training_run(&self, run: &TrainingRun) -> RepositoryResult<i64>;
}

// ==========================================
// SqliteAttributeStore - 基于仓储集合的实现
// ==========================================

/// SQLite 属性存储
///
/// 聚合 4 个仓储, 共享同一个连接。
#[derive(Clone)]
pub struct SqliteAttributeStore {
    pub component_repo: Arc<ComponentRepository>,
    pub assembly_repo: Arc<AssemblyRepository>,
    pub prediction_repo: Arc<PredictionRepository>,
    pub training_run_repo: Arc<TrainingRunRepository>,
}

impl SqliteAttributeStore {
    /// 从共享连接创建（所有仓储共用一个连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            component_repo: Arc::new(ComponentRepository::from_connection(conn.clone())),
            assembly_repo: Arc::new(AssemblyRepository::from_connection(conn.clone())),
            prediction_repo: Arc::new(PredictionRepository::from_connection(conn.clone())),
            training_run_repo: Arc::new(TrainingRunRepository::from_connection(conn)),
        }
    }

    /// 从已有仓储创建
    pub fn new(
        component_repo: Arc<ComponentRepository>,
        assembly_repo: Arc<AssemblyRepository>,
        prediction_repo: Arc<PredictionRepository>,
        training_run_repo: Arc<TrainingRunRepository>,
    ) -> Self {
        Self {
            component_repo,
            assembly_repo,
            prediction_repo,
            training_run_repo,
        }
    }
}

impl AttributeStore for SqliteAttributeStore {
    fn vessel(&self, id: &str) -> RepositoryResult<Option<Vessel>> {
        self.component_repo.find_vessel_by_id(id)
    }

    fn wax_type(&self, id: &str) -> RepositoryResult<Option<WaxType>> {
        self.component_repo.find_wax_type_by_id(id)
    }

    fn fragrance(&self, id: &str) -> RepositoryResult<Option<FragranceOil>> {
        self.component_repo.find_fragrance_by_id(id)
    }

    fn wick(&self, id: &str) -> RepositoryResult<Option<Wick>> {
        self.component_repo.find_wick_by_id(id)
    }

    fn wick_by_name(&self, name: &str) -> RepositoryResult<Option<Wick>> {
        self.component_repo.find_wick_by_name(name)
    }

    fn wicks_in_series(&self, series: &str) -> RepositoryResult<Vec<Wick>> {
        self.component_repo.list_wicks_by_series(series)
    }

    fn majority_baseline(
        &self,
        vessel_id: &str,
        wax_type_id: &str,
    ) -> RepositoryResult<Option<MajorityBaseline>> {
        self.assembly_repo.find_majority_baseline(vessel_id, wax_type_id)
    }

    fn wax_conversion_delta(
        &self,
        vessel_id: &str,
        old_wax_type_id: &str,
        new_wax_type_id: &str,
    ) -> RepositoryResult<Option<WaxConversionDelta>> {
        self.assembly_repo
            .find_wax_conversion_delta(vessel_id, old_wax_type_id, new_wax_type_id)
    }

    fn count_assemblies(&self, vessel_id: &str, wax_type_id: &str) -> RepositoryResult<i64> {
        self.assembly_repo.count_by_vessel_and_wax(vessel_id, wax_type_id)
    }

    fn uncertain_predictions(
        &self,
        confidence_threshold: f64,
        limit: usize,
    ) -> RepositoryResult<Vec<UncertainPrediction>> {
        self.prediction_repo
            .list_uncertain_predictions(confidence_threshold, limit)
    }

    fn has_open_priority(&self, assembly_id: &str) -> RepositoryResult<bool> {
        self.prediction_repo.has_open_priority(assembly_id)
    }

    fn insert_test_result(&self, result: &TestResult) -> RepositoryResult<()> {
        self.prediction_repo.insert_test_result(result)
    }

    fn mark_predictions_verified(
        &self,
        assembly_id: &str,
        actual_wick_id: Option<&str>,
        verified_at: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        self.prediction_repo
            .mark_verified_by_assembly(assembly_id, actual_wick_id, verified_at)
    }

    fn complete_priorities(
        &self,
        assembly_id: &str,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        self.prediction_repo
            .complete_priorities_by_assembly(assembly_id, completed_at)
    }

    fn enqueue_priority(
        &self,
        assembly_id: &str,
        priority_score: f64,
        reason: &str,
    ) -> RepositoryResult<i64> {
        self.prediction_repo
            .enqueue_priority(assembly_id, priority_score, reason)
    }

    fn insert_training_run(&self, run: &TrainingRun) -> RepositoryResult<i64> {
        self.training_run_repo.insert(run)
    }
}
