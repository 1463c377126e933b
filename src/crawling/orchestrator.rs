//! # Crawling Orchestrator
//!
//! Drains a fully materialized list of work units through a fixed number of
//! workers, one per pooled session. Each worker repeatedly takes the next
//! unit, leases a session, runs the task executor and hands the session back.
//! The run ends once every worker has returned, after which the pool is
//! closed.

use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::crawling::executor::{TaskExecutor, panic_message};
use crate::crawling::session_pool::SessionPool;
use crate::domain::{AuditRecord, AuditStatus, OrchestratorError, WorkUnit, WorkUnitSource};

/// Summary of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub units_total: usize,
    pub units_completed: usize,
    /// Never started because the run was cancelled
    pub units_skipped: usize,
    /// Keys of units whose task panicked outside any single target
    pub units_panicked: Vec<String>,
    pub sessions_closed: usize,
    pub records: Vec<AuditRecord>,
}

impl RunReport {
    #[must_use]
    pub fn count(&self, status: AuditStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Record count per status; every status is present
    #[must_use]
    pub fn status_counts(&self) -> BTreeMap<AuditStatus, usize> {
        AuditStatus::ALL.iter().map(|&status| (status, self.count(status))).collect()
    }

    pub fn records_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a AuditRecord> + 'a {
        self.records.iter().filter(move |r| r.work_unit_key == key)
    }

    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[derive(Default)]
struct WorkerOutcome {
    records: Vec<AuditRecord>,
    completed: usize,
    panicked: Vec<String>,
}

/// Bounded-concurrency dispatcher; concurrency equals the pool size
pub struct CrawlingOrchestrator {
    pool: SessionPool,
    executor: Arc<TaskExecutor>,
    cancellation_token: CancellationToken,
}

impl CrawlingOrchestrator {
    #[must_use]
    pub fn new(pool: SessionPool, executor: Arc<TaskExecutor>) -> Self {
        Self {
            pool,
            executor,
            cancellation_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Token checked before each work unit is started
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Lists the source once, then runs. A listing failure is fatal and the
    /// pool is still closed.
    pub async fn run_from_source(self, source: &dyn WorkUnitSource) -> Result<RunReport, OrchestratorError> {
        let work_units = match source.list().await {
            Ok(units) => units,
            Err(e) => {
                error!("❌ Could not list work units: {}", e);
                if let Err(close_err) = self.pool.close().await {
                    warn!("⚠️ Pool close after source failure: {}", close_err);
                }
                return Err(e.into());
            }
        };
        info!("📋 {} work units listed", work_units.len());
        Ok(self.run(work_units).await)
    }

    /// Processes every unit with at most `pool.size()` in flight, waits for
    /// all of them, then closes the pool.
    pub async fn run(self, work_units: Vec<WorkUnit>) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let units_total = work_units.len();
        let concurrency = self.pool.size();
        info!(
            "🚀 Run {} starting: {} work units, {} concurrent sessions",
            run_id, units_total, concurrency
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(work_units)));
        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency.min(units_total) {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&queue),
                self.pool.clone(),
                Arc::clone(&self.executor),
                self.cancellation_token.clone(),
            ));
        }

        let mut outcome = WorkerOutcome::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(worker) => {
                    outcome.records.extend(worker.records);
                    outcome.completed += worker.completed;
                    outcome.panicked.extend(worker.panicked);
                }
                Err(e) => error!("💥 Worker task failed: {}", e),
            }
        }

        let units_skipped = queue.lock().unwrap_or_else(PoisonError::into_inner).len();
        let sessions_closed = match self.pool.close().await {
            Ok(closed) => closed,
            Err(e) => {
                warn!("⚠️ Session pool close failed: {}", e);
                0
            }
        };

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            units_total,
            units_completed: outcome.completed,
            units_skipped,
            units_panicked: outcome.panicked,
            sessions_closed,
            records: outcome.records,
        };
        info!(
            "🏁 Run {} finished in {}s: {} completed, {} skipped, {} panicked, {} records ({} successful)",
            report.run_id,
            report.duration().num_seconds(),
            report.units_completed,
            report.units_skipped,
            report.units_panicked.len(),
            report.records.len(),
            report.count(AuditStatus::Success)
        );
        report
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<WorkUnit>>>,
    pool: SessionPool,
    executor: Arc<TaskExecutor>,
    cancellation_token: CancellationToken,
) -> WorkerOutcome {
    let mut outcome = WorkerOutcome::default();
    loop {
        if cancellation_token.is_cancelled() {
            info!("🛑 Worker {} stopping: run cancelled", worker_id);
            break;
        }
        let Some(work_unit) = next_unit(&queue) else {
            break;
        };

        let mut lease = match pool.lease().await {
            Ok(lease) => lease,
            Err(e) => {
                error!("❌ Worker {} could not lease a session: {}", worker_id, e);
                requeue(&queue, work_unit);
                break;
            }
        };
        debug!("👷 Worker {} took {} on session {}", worker_id, work_unit, lease.session_id());

        let Some(session) = lease.session_mut() else {
            requeue(&queue, work_unit);
            break;
        };
        let result = AssertUnwindSafe(executor.execute(&work_unit, session))
            .catch_unwind()
            .await;
        pool.release(lease);

        match result {
            Ok(records) => {
                outcome.records.extend(records);
                outcome.completed += 1;
            }
            Err(panic) => {
                error!("💥 Task for {} panicked: {}", work_unit, panic_message(panic.as_ref()));
                outcome.panicked.push(work_unit.key().to_string());
            }
        }
    }
    outcome
}

fn next_unit(queue: &Mutex<VecDeque<WorkUnit>>) -> Option<WorkUnit> {
    queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
}

fn requeue(queue: &Mutex<VecDeque<WorkUnit>>, work_unit: WorkUnit) {
    queue.lock().unwrap_or_else(PoisonError::into_inner).push_front(work_unit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawling::audit_recorder::AuditRecorder;
    use crate::crawling::executor::ExecutorPolicy;
    use crate::domain::ExtractionSpecTable;
    use crate::domain::TemplateParams;
    use crate::infrastructure::table_normalizer::TableNormalizer;
    use crate::test_utils::{FailingSource, MockSessionFactory, MockSite, RecordingLedger, RecordingStore, work_units};
    use std::time::Duration;

    async fn orchestrator(site: &Arc<MockSite>, size: usize) -> (CrawlingOrchestrator, Arc<RecordingStore>) {
        let store = RecordingStore::new();
        let executor = TaskExecutor::new(
            Arc::new(ExtractionSpecTable::baseball_reference()),
            TemplateParams { season: 2021 },
            TableNormalizer::default(),
            store.clone(),
            AuditRecorder::new(RecordingLedger::new(), Duration::from_secs(1)),
            ExecutorPolicy::immediate(),
        );
        let pool = SessionPool::initialize(size, &MockSessionFactory::new(Arc::clone(site)))
            .await
            .unwrap();
        (CrawlingOrchestrator::new(pool, Arc::new(executor)), store)
    }

    #[tokio::test]
    async fn test_run_processes_every_unit_and_closes_pool() {
        let site = MockSite::new();
        let (orchestrator, store) = orchestrator(&site, 2).await;

        let report = orchestrator.run(work_units(&["NYY", "BOS", "TBR"])).await;

        assert_eq!(report.units_completed, 3);
        assert_eq!(report.records.len(), 3 * 8);
        assert_eq!(report.count(AuditStatus::Success), 24);
        assert_eq!(store.persist_count(), 24);
        assert_eq!(report.sessions_closed, 2);
        assert_eq!(site.close_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_run_still_closes_pool() {
        let site = MockSite::new();
        let (orchestrator, _) = orchestrator(&site, 3).await;
        let report = orchestrator.run(Vec::new()).await;
        assert_eq!(report.units_total, 0);
        assert_eq!(site.close_count(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_units() {
        let site = MockSite::new();
        let (orchestrator, store) = orchestrator(&site, 1).await;
        orchestrator.cancellation_token().cancel();

        let report = orchestrator.run(work_units(&["NYY", "BOS"])).await;

        assert_eq!(report.units_completed, 0);
        assert_eq!(report.units_skipped, 2);
        assert_eq!(store.persist_count(), 0);
        assert_eq!(site.close_count(), 1);
    }

    #[tokio::test]
    async fn test_panicking_unit_does_not_stop_the_run() {
        let site = MockSite::new();
        site.panic_on_navigation("/BOS/");
        let (orchestrator, _) = orchestrator(&site, 1).await;

        let report = orchestrator.run(work_units(&["NYY", "BOS", "SEA"])).await;

        assert_eq!(report.units_panicked, vec!["BOS".to_string()]);
        assert_eq!(report.units_completed, 2);
        assert_eq!(report.records_for("SEA").count(), 8);
        assert_eq!(site.close_count(), 1);
    }

    #[tokio::test]
    async fn test_source_failure_is_fatal() {
        let site = MockSite::new();
        let (orchestrator, _) = orchestrator(&site, 2).await;
        let err = orchestrator.run_from_source(&FailingSource).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Source(_)));
        assert_eq!(site.close_count(), 2);
    }
}
