//! Composite orchestrator - concurrent evaluation of independent units
//!
//! ```text
//!  units ──▶ JoinSet (task per unit) ──▶ Accumulator (Mutex) ──▶ ResultStore
//!                 │
//!          shared deadline
//! ```
//!
//! Each unit runs in its own task. A task checks the shared deadline once,
//! before it starts evaluating; after that the evaluation runs to completion.
//! Units that never started are reported as abandoned and contribute nothing.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, UnitSplit};
use crate::error::{ErrorKind, Result, STATUS_OK};
use crate::evaluator::{evaluate, EvaluationOutcome};
use crate::store::{NewRecord, ResultStore};

/// Separator used when the units of one request are stored as a single text
pub const UNIT_SEPARATOR: &str = "; ";

/// Lifecycle of one composite request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeState {
    Pending,
    Running,
    Completed,
    TimedOut,
}

/// What happened to one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Evaluated(EvaluationOutcome),
    /// Deadline passed before the unit started
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Position in the submitted unit list
    pub index: usize,
    pub expression: String,
    pub status: UnitStatus,
}

impl UnitReport {
    pub fn outcome(&self) -> Option<&EvaluationOutcome> {
        match &self.status {
            UnitStatus::Evaluated(outcome) => Some(outcome),
            UnitStatus::Abandoned => None,
        }
    }
}

/// Aggregate of one composite request
///
/// `aggregate_value`, `last_error` and `status_code` are the lossy summary:
/// a sum of successful values plus whichever failure was recorded last in
/// completion order. `units` keeps every unit's own outcome in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    pub aggregate_value: f64,
    pub last_error: Option<ErrorKind>,
    pub status_code: u16,
    pub state: CompositeState,
    pub units: Vec<UnitReport>,
}

impl CompositeResult {
    /// Units whose evaluation failed
    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.units
            .iter()
            .filter(|u| u.outcome().is_some_and(|o| !o.is_success()))
    }

    pub fn abandoned_count(&self) -> usize {
        self.units
            .iter()
            .filter(|u| u.status == UnitStatus::Abandoned)
            .count()
    }
}

/// Shared running state, the only mutable state touched by unit tasks
struct Accumulator {
    sum: f64,
    last_error: Option<ErrorKind>,
    status_code: u16,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            sum: 0.0,
            last_error: None,
            status_code: STATUS_OK,
        }
    }
}

impl Accumulator {
    fn record(&mut self, outcome: &EvaluationOutcome) {
        match outcome.error {
            None => self.sum += outcome.value,
            Some(kind) => {
                self.last_error = Some(kind);
                self.status_code = outcome.status_code;
            },
        }
    }
}

/// Split one text into whitespace-separated units
///
/// Legacy behaviour: `"2 + 3"` becomes three units, two of them invalid.
/// Prefer passing units explicitly.
pub fn legacy_units(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Evaluate independent units concurrently under one shared deadline
///
/// A deadline too large to represent (e.g. `Duration::MAX`) never fires.
pub async fn evaluate_composite(units: Vec<String>, deadline: Duration) -> CompositeResult {
    run_units(units, deadline, evaluate).await
}

type UnitEvaluator = fn(&str) -> EvaluationOutcome;

async fn run_units(
    units: Vec<String>,
    deadline: Duration,
    evaluate_unit: UnitEvaluator,
) -> CompositeResult {
    let unit_count = units.len();
    let deadline_at = Instant::now().checked_add(deadline);
    let deadline_passed = move || deadline_at.is_some_and(|at| Instant::now() >= at);
    let accumulator = Arc::new(Mutex::new(Accumulator::default()));

    debug!(
        "Composite request {:?}: {} units, deadline {:?}",
        CompositeState::Pending,
        unit_count,
        deadline
    );

    let mut tasks = JoinSet::new();
    for (index, expression) in units.iter().cloned().enumerate() {
        let accumulator = Arc::clone(&accumulator);
        tasks.spawn(async move {
            if deadline_passed() {
                debug!("Unit {} abandoned: deadline passed before start", index);
                return UnitReport {
                    index,
                    expression,
                    status: UnitStatus::Abandoned,
                };
            }

            let outcome = evaluate_unit(&expression);
            if let Some(kind) = outcome.error {
                warn!("Unit {} '{}' failed: {:?}", index, expression, kind);
            } else {
                debug!("Unit {} '{}' = {}", index, expression, outcome.value);
            }
            accumulator.lock().record(&outcome);

            UnitReport {
                index,
                expression,
                status: UnitStatus::Evaluated(outcome),
            }
        });
    }

    debug!("Composite request {:?}", CompositeState::Running);

    // Running evaluations are not interruptible; every task is awaited.
    let mut reports = Vec::with_capacity(unit_count);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => warn!("Unit task did not finish: {}", e),
        }
    }
    let deadline_hit = deadline_passed();

    // A task that panicked left no report; its unit counts as an internal failure
    if reports.len() < unit_count {
        let mut reported = vec![false; unit_count];
        for report in &reports {
            reported[report.index] = true;
        }
        for (index, expression) in units.into_iter().enumerate() {
            if reported[index] {
                continue;
            }
            let outcome = EvaluationOutcome::failure(ErrorKind::InternalFailure);
            accumulator.lock().record(&outcome);
            reports.push(UnitReport {
                index,
                expression,
                status: UnitStatus::Evaluated(outcome),
            });
        }
    }

    reports.sort_by_key(|r| r.index);

    let state = if deadline_hit || reports.iter().any(|r| r.status == UnitStatus::Abandoned) {
        CompositeState::TimedOut
    } else {
        CompositeState::Completed
    };

    let acc = accumulator.lock();
    let result = CompositeResult {
        aggregate_value: acc.sum,
        last_error: acc.last_error,
        status_code: acc.status_code,
        state,
        units: reports,
    };
    drop(acc);

    info!(
        "Composite request {:?}: {} units, {} abandoned, value {}, status {}",
        result.state,
        unit_count,
        result.abandoned_count(),
        result.aggregate_value,
        result.status_code
    );
    result
}

/// A stored composite request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub expression_id: i64,
    pub result: CompositeResult,
}

/// Composite orchestrator bound to a result store
pub struct CompositeEvaluator<S: ResultStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: ResultStore> CompositeEvaluator<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Evaluate `units` under the configured deadline and persist the aggregate
    ///
    /// Unit failures are recorded in the result; only a store failure fails
    /// the call, as [`ErrorKind::InternalFailure`].
    pub async fn submit(&self, user_id: i64, units: Vec<String>) -> Result<Submission> {
        let expression_text = units.join(UNIT_SEPARATOR);
        let result = evaluate_composite(units, self.config.deadline()).await;

        let record = self
            .store
            .insert(NewRecord {
                user_id,
                expression_text,
                result: result.aggregate_value,
                status_code: result.status_code,
                created_at: Utc::now(),
            })
            .await?;
        info!(
            "Saved calculation {} for user {} (status {})",
            record.expression_id, user_id, record.status_code
        );

        Ok(Submission {
            expression_id: record.expression_id,
            result,
        })
    }

    /// Submit a single text, split into units per [`EngineConfig::unit_split`]
    pub async fn submit_text(&self, user_id: i64, text: &str) -> Result<Submission> {
        let units = match self.config.unit_split {
            UnitSplit::Explicit => vec![text.to_string()],
            UnitSplit::Whitespace => legacy_units(text),
        };
        self.submit(user_id, units).await
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::error::{CalcError, StoreError};
    use crate::store::{MemoryResultStore, PersistableRecord, StoreResult};
    use tracing_test::traced_test;

    fn units(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    const LONG: Duration = Duration::from_secs(10);

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sum_of_successful_units() {
        let exprs = units(&["2+3*4", "(2+3)*(4+1)", "10/4", "1,5"]);
        let expected: f64 = exprs.iter().map(|e| evaluate(e).value).sum();

        let result = evaluate_composite(exprs, LONG).await;
        assert_eq!(result.state, CompositeState::Completed);
        assert_eq!(result.aggregate_value, expected);
        assert_eq!(result.aggregate_value, 14.0 + 25.0 + 2.5 + 1.5);
        assert_eq!(result.last_error, None);
        assert_eq!(result.status_code, 200);
        assert_eq!(result.units.len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sum_independent_of_completion_order() {
        let exprs: Vec<String> = (1..=200).map(|i| format!("{}*2", i)).collect();
        let result = evaluate_composite(exprs, LONG).await;
        assert_eq!(result.aggregate_value, (1..=200).map(|i| (i * 2) as f64).sum::<f64>());
    }

    #[tokio::test]
    async fn test_failures_do_not_fail_request() {
        let result = evaluate_composite(units(&["1+1", "3+a", "4"]), LONG).await;
        assert_eq!(result.state, CompositeState::Completed);
        assert_eq!(result.aggregate_value, 6.0);
        assert_eq!(result.last_error, Some(ErrorKind::InvalidCharacter));
        assert_eq!(result.status_code, 422);

        let failed: Vec<usize> = result.failures().map(|u| u.index).collect();
        assert_eq!(failed, vec![1]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_unit_is_logged() {
        evaluate_composite(units(&["3+a"]), LONG).await;
        assert!(logs_contain("'3+a' failed: InvalidCharacter"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_error_is_one_of_the_failures() {
        let result = evaluate_composite(units(&["5/0", "3+a", "2"]), LONG).await;
        let last = result.last_error.unwrap();
        assert!(matches!(
            last,
            ErrorKind::DivisionByZero | ErrorKind::InvalidCharacter
        ));
        assert_eq!(result.status_code, 422);
        assert_eq!(result.aggregate_value, 2.0);
    }

    #[tokio::test]
    async fn test_units_reported_in_input_order() {
        let result = evaluate_composite(units(&["3", "1", "2"]), LONG).await;
        let exprs: Vec<&str> = result.units.iter().map(|u| u.expression.as_str()).collect();
        assert_eq!(exprs, vec!["3", "1", "2"]);
    }

    #[tokio::test]
    async fn test_expired_deadline_abandons_everything() {
        let result = evaluate_composite(units(&["1+1", "3+a"]), Duration::ZERO).await;
        assert_eq!(result.state, CompositeState::TimedOut);
        assert_eq!(result.abandoned_count(), 2);
        assert_eq!(result.aggregate_value, 0.0);
        // No error is fabricated for units that never ran
        assert_eq!(result.last_error, None);
        assert_eq!(result.status_code, 200);
    }

    #[tokio::test]
    async fn test_unrepresentable_deadline_never_fires() {
        let result = evaluate_composite(units(&["1+1", "2*3"]), Duration::MAX).await;
        assert_eq!(result.state, CompositeState::Completed);
        assert_eq!(result.aggregate_value, 8.0);
        assert_eq!(result.abandoned_count(), 0);
    }

    // Blocks the worker on "slow" so later units start after the deadline
    fn slow_evaluate(expression: &str) -> EvaluationOutcome {
        if expression == "slow" {
            std::thread::sleep(Duration::from_millis(150));
            return evaluate("40");
        }
        evaluate(expression)
    }

    // Current-thread runtime: unit tasks run one after another in spawn order
    #[tokio::test]
    async fn test_deadline_mid_request() {
        let result = run_units(
            units(&["1+1", "slow", "2+2"]),
            Duration::from_millis(50),
            slow_evaluate,
        )
        .await;

        assert_eq!(result.state, CompositeState::TimedOut);
        // Started before the deadline: counted, including the one that
        // finished after it
        assert_eq!(result.units[0].outcome().map(|o| o.value), Some(2.0));
        assert_eq!(result.units[1].outcome().map(|o| o.value), Some(40.0));
        // Started after the deadline: abandoned
        assert_eq!(result.units[2].status, UnitStatus::Abandoned);
        assert_eq!(result.aggregate_value, 42.0);
        assert_eq!(result.last_error, None);
        assert_eq!(result.status_code, 200);
    }

    fn panicking_evaluate(expression: &str) -> EvaluationOutcome {
        if expression == "boom" {
            panic!("evaluator bug");
        }
        evaluate(expression)
    }

    #[tokio::test]
    async fn test_panicked_unit_is_reported() {
        let result = run_units(units(&["1+1", "boom", "3"]), LONG, panicking_evaluate).await;

        assert_eq!(result.units.len(), 3);
        assert_eq!(result.units[1].index, 1);
        assert_eq!(result.units[1].expression, "boom");
        let outcome = result.units[1].outcome().unwrap();
        assert_eq!(outcome.error, Some(ErrorKind::InternalFailure));
        assert_eq!(result.aggregate_value, 5.0);
        assert_eq!(result.last_error, Some(ErrorKind::InternalFailure));
        assert_eq!(result.status_code, 500);
        assert_eq!(result.state, CompositeState::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_for_one_user() {
        let evaluator = Arc::new(CompositeEvaluator::new(
            Arc::new(MemoryResultStore::new()),
            EngineConfig::default(),
        ));
        let mut tasks = JoinSet::new();
        for i in 0..16 {
            let evaluator = Arc::clone(&evaluator);
            tasks.spawn(async move { evaluator.submit(5, vec![format!("{}+1", i)]).await });
        }

        let mut ids = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            ids.push(joined.unwrap().unwrap().expression_id);
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=16).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn test_empty_unit_list() {
        let result = evaluate_composite(Vec::new(), LONG).await;
        assert_eq!(result.state, CompositeState::Completed);
        assert_eq!(result.aggregate_value, 0.0);
        assert!(result.units.is_empty());
    }

    #[test]
    fn test_legacy_units_split_on_whitespace() {
        assert_eq!(legacy_units("2 + 3 * 2"), units(&["2", "+", "3", "*", "2"]));
        assert_eq!(legacy_units("  1+1\t(2*3)  "), units(&["1+1", "(2*3)"]));
    }

    #[tokio::test]
    async fn test_submit_persists_aggregate() {
        let store = Arc::new(MemoryResultStore::new());
        let evaluator = CompositeEvaluator::new(Arc::clone(&store), EngineConfig::default());

        let first = evaluator.submit(42, units(&["1+1", "2*3"])).await.unwrap();
        let second = evaluator.submit(42, units(&["9/0"])).await.unwrap();
        assert_eq!(first.expression_id, 1);
        assert_eq!(second.expression_id, 2);

        let stored = store.get(42, 1).await.unwrap().unwrap();
        assert_eq!(stored.expression_text, "1+1; 2*3");
        assert_eq!(stored.result, 8.0);
        assert_eq!(stored.status_code, 200);

        let stored = store.get(42, 2).await.unwrap().unwrap();
        assert_eq!(stored.status_code, 422);
    }

    #[tokio::test]
    async fn test_submit_text_legacy_split() {
        let store = Arc::new(MemoryResultStore::new());
        let config = EngineConfig {
            unit_split: UnitSplit::Whitespace,
            ..Default::default()
        };
        let evaluator = CompositeEvaluator::new(store, config);

        let submission = evaluator.submit_text(1, "1+1 2*3 (4)").await.unwrap();
        assert_eq!(submission.result.units.len(), 3);
        assert_eq!(submission.result.aggregate_value, 12.0);

        let explicit = CompositeEvaluator::new(
            Arc::new(MemoryResultStore::new()),
            EngineConfig::default(),
        );
        let submission = explicit.submit_text(1, "1 + 1").await.unwrap();
        assert_eq!(submission.result.units.len(), 1);
        assert_eq!(submission.result.aggregate_value, 2.0);
    }

    struct FailingStore;

    impl ResultStore for FailingStore {
        async fn next_expression_id(&self, _user_id: i64) -> StoreResult<i64> {
            Ok(1)
        }

        async fn insert(&self, _record: NewRecord) -> StoreResult<PersistableRecord> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        async fn store(&self, _record: &PersistableRecord) -> StoreResult<()> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        async fn get(&self, _user_id: i64, _id: i64) -> StoreResult<Option<PersistableRecord>> {
            Ok(None)
        }

        async fn list_for_user(&self, _user_id: i64) -> StoreResult<Vec<PersistableRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let evaluator = CompositeEvaluator::new(Arc::new(FailingStore), EngineConfig::default());
        let err = evaluator.submit(1, units(&["1+1"])).await.unwrap_err();
        assert!(matches!(err, CalcError::Internal(_)));
        assert_eq!(err.kind(), ErrorKind::InternalFailure);
        assert_eq!(err.status_code(), 500);
    }
}
