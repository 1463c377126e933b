//! # Task Executor
//!
//! Runs every dataset of the extraction spec table for one work unit on one
//! leased session:
//!
//! ```text
//! for dataset in table order:
//!     navigate (retry on failure, fixed backoff)
//!         └─ gave up → one NAVIGATE_TIMEOUT record, next dataset
//!     for target in declared order:
//!         wait → read markup → normalize → persist → audit
//!     jitter sleep (also after the last one: the session's next unit follows)
//! ```
//!
//! Each target yields exactly one `AuditRecord`. Nothing a target or a
//! dataset does can stop the remaining ones from running.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::crawling::audit_recorder::AuditRecorder;
use crate::domain::{
    AuditRecord, AuditStatus, DatasetSpec, ExtractionSpecTable, ExtractionTarget, PageSession, RawExtraction,
    SessionError, Store, TemplateParams, WorkUnit,
};
use crate::infrastructure::config::CrawlerConfig;
use crate::infrastructure::table_normalizer::TableNormalizer;

/// Timeouts, navigation retry and inter-dataset pacing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorPolicy {
    pub navigate_timeout: Duration,
    /// Extra attempts after the first failed navigation
    pub navigate_retries: u32,
    pub navigate_backoff: Duration,
    pub element_timeout: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl ExecutorPolicy {
    #[must_use]
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            navigate_timeout: Duration::from_secs(config.navigate_timeout_secs),
            navigate_retries: config.navigate_retries,
            navigate_backoff: Duration::from_secs(config.navigate_backoff_secs),
            element_timeout: Duration::from_secs(config.element_timeout_secs),
            jitter_min: Duration::from_secs(config.dataset_jitter_min_secs),
            jitter_max: Duration::from_secs(config.dataset_jitter_max_secs),
        }
    }

    /// No waiting between attempts or datasets; short timeouts.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            navigate_timeout: Duration::from_secs(5),
            navigate_retries: 1,
            navigate_backoff: Duration::ZERO,
            element_timeout: Duration::from_secs(5),
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
        }
    }

    /// Uniform draw from `[jitter_min, jitter_max]`
    #[must_use]
    pub fn jitter_delay(&self) -> Duration {
        let min = millis(self.jitter_min);
        let max = millis(self.jitter_max);
        if max <= min {
            return self.jitter_min;
        }
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

impl Default for ExecutorPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Per-work-unit pipeline; shared by every worker
pub struct TaskExecutor {
    specs: Arc<ExtractionSpecTable>,
    params: TemplateParams,
    normalizer: TableNormalizer,
    store: Arc<dyn Store>,
    recorder: AuditRecorder,
    policy: ExecutorPolicy,
}

impl TaskExecutor {
    #[must_use]
    pub fn new(
        specs: Arc<ExtractionSpecTable>,
        params: TemplateParams,
        normalizer: TableNormalizer,
        store: Arc<dyn Store>,
        recorder: AuditRecorder,
        policy: ExecutorPolicy,
    ) -> Self {
        Self {
            specs,
            params,
            normalizer,
            store,
            recorder,
            policy,
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &ExecutorPolicy {
        &self.policy
    }

    #[must_use]
    pub fn specs(&self) -> &ExtractionSpecTable {
        &self.specs
    }

    /// Runs every dataset for `work_unit` and returns the audit records in
    /// emission order. Never fails; every problem becomes a record.
    pub async fn execute(&self, work_unit: &WorkUnit, session: &mut dyn PageSession) -> Vec<AuditRecord> {
        let span = info_span!("work_unit", key = %work_unit.key(), id = %work_unit.id());
        async move {
            info!("🏁 Starting {}", work_unit);
            let datasets = self.specs.datasets();
            let mut records = Vec::with_capacity(self.specs.target_count());

            for dataset in datasets {
                let dataset_span = info_span!("dataset", kind = %dataset.dataset_kind);
                self.run_dataset(work_unit, dataset, session, &mut records)
                    .instrument(dataset_span)
                    .await;

                // The session goes straight on to its next page, possibly for another unit.
                self.pause_after_dataset().await;
            }

            let succeeded = records.iter().filter(|r| r.status.is_success()).count();
            info!(
                "✅ Finished {}: {} of {} records succeeded",
                work_unit,
                succeeded,
                records.len()
            );
            records
        }
        .instrument(span)
        .await
    }

    async fn run_dataset(
        &self,
        work_unit: &WorkUnit,
        dataset: &DatasetSpec,
        session: &mut dyn PageSession,
        records: &mut Vec<AuditRecord>,
    ) {
        let url = dataset.render_url(work_unit.key(), &self.params);
        if let Err(e) = self.navigate_with_retry(session, &url).await {
            warn!("🚫 Giving up on {} for {}: {}", dataset.dataset_kind, work_unit.key(), e);
            let cause = match e {
                SessionError::NavigateTimeout { .. } => None,
                other => Some(other.to_string()),
            };
            let record = AuditRecord::navigate_timeout(work_unit.key(), dataset.dataset_kind, cause.as_deref());
            self.emit(record, records).await;
            return;
        }

        for target in &dataset.targets {
            let outcome = AssertUnwindSafe(self.run_target(work_unit, target, session))
                .catch_unwind()
                .await;
            let record = outcome.unwrap_or_else(|panic| {
                let cause = panic_message(panic.as_ref());
                error!("💥 Target {} panicked: {}", target.locator, cause);
                AuditRecord::extraction_failed(work_unit.key(), target, &format!("panicked: {cause}"))
            });
            self.emit(record, records).await;
        }
    }

    /// First attempt plus `navigate_retries` retries, `navigate_backoff`
    /// apart. `SessionError::Closed` is not retried.
    async fn navigate_with_retry(&self, session: &mut dyn PageSession, url: &str) -> Result<(), SessionError> {
        let mut attempt = 0;
        loop {
            debug!("🌐 Navigating to {} (attempt {})", url, attempt + 1);
            let result = tokio::time::timeout(
                self.policy.navigate_timeout,
                session.navigate(url, self.policy.navigate_timeout),
            )
            .await
            .unwrap_or_else(|_| Err(SessionError::NavigateTimeout { url: url.to_string() }));

            match result {
                Ok(()) => return Ok(()),
                Err(SessionError::Closed) => return Err(SessionError::Closed),
                Err(e) if attempt < self.policy.navigate_retries => {
                    attempt += 1;
                    warn!(
                        "⏳ Navigation failed ({}); retry {}/{} in {:?}",
                        e, attempt, self.policy.navigate_retries, self.policy.navigate_backoff
                    );
                    sleep_unless_zero(self.policy.navigate_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// wait → read → normalize → persist for one target
    async fn run_target(
        &self,
        work_unit: &WorkUnit,
        target: &ExtractionTarget,
        session: &mut dyn PageSession,
    ) -> AuditRecord {
        let key = work_unit.key();
        let waited = tokio::time::timeout(
            self.policy.element_timeout,
            session.wait_for_element(&target.locator, self.policy.element_timeout),
        )
        .await;

        let element = match waited {
            Ok(Ok(element)) => element,
            Ok(Err(SessionError::ElementTimeout { .. })) | Err(_) => {
                warn!("⌛ {} never appeared", target.locator);
                return AuditRecord::element_timeout(key, target, None);
            }
            Ok(Err(e)) => {
                warn!("⌛ {} could not be resolved: {}", target.locator, e);
                return AuditRecord::element_timeout(key, target, Some(&e.to_string()));
            }
        };

        let raw = RawExtraction {
            work_unit_key: key.to_string(),
            target: target.clone(),
            markup: element.read_markup().to_string(),
        };
        let rows = match self.normalizer.normalize_raw(&raw) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("🧩 {} produced no usable table: {}", target.locator, e);
                return AuditRecord::extraction_failed(key, target, &e.to_string());
            }
        };

        match self.store.persist(&rows).await {
            Ok(written) => {
                debug!("💾 {} rows written to {}", written, target.destination_table);
                AuditRecord::success(key, target)
            }
            Err(e) => {
                error!("💾 Persist to {} failed: {}", target.destination_table, e);
                AuditRecord::persist_failed(key, target, e.to_string())
            }
        }
    }

    async fn emit(&self, record: AuditRecord, records: &mut Vec<AuditRecord>) {
        if record.status != AuditStatus::Success {
            debug!("📌 {} {:?}", record.status, record.error_detail);
        }
        self.recorder.record(&record).await;
        records.push(record);
    }

    async fn pause_after_dataset(&self) {
        let delay = self.policy.jitter_delay();
        debug!("😴 Pausing {:?} before next page", delay);
        sleep_unless_zero(delay).await;
    }
}

async fn sleep_unless_zero(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
