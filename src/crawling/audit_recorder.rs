//! Best-effort audit writes
//!
//! Wraps an `AuditLedger` so that a failing or stalled ledger never changes
//! the outcome of the task that produced the record.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::domain::{AuditLedger, AuditRecord};

#[derive(Clone)]
pub struct AuditRecorder {
    ledger: Arc<dyn AuditLedger>,
    write_timeout: Duration,
}

impl AuditRecorder {
    #[must_use]
    pub fn new(ledger: Arc<dyn AuditLedger>, write_timeout: Duration) -> Self {
        Self { ledger, write_timeout }
    }

    /// Appends `record`; returns whether the ledger accepted it.
    pub async fn record(&self, record: &AuditRecord) -> bool {
        match tokio::time::timeout(self.write_timeout, self.ledger.append(record)).await {
            Ok(Ok(())) => {
                debug!(
                    target: "audit",
                    "📝 {} {} {}",
                    record.work_unit_key,
                    record.destination_table.as_deref().unwrap_or(record.dataset_kind.as_str()),
                    record.status
                );
                true
            }
            Ok(Err(e)) => {
                error!(
                    target: "audit",
                    "❌ Lost audit record {} for {} ({:?}): {}",
                    record.status, record.work_unit_key, record.destination_table, e
                );
                false
            }
            Err(_) => {
                error!(
                    target: "audit",
                    "⏰ Audit write for {} timed out after {:?}; record {} dropped",
                    record.work_unit_key, self.write_timeout, record.status
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("write_timeout", &self.write_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DatasetKind, ExtractionTarget};
    use crate::test_utils::{FailingLedger, RecordingLedger, StalledLedger};

    fn record() -> AuditRecord {
        let target = ExtractionTarget::new(DatasetKind::Pitching, "#team_pitching", "pitching");
        AuditRecord::success("NYY", &target)
    }

    #[tokio::test]
    async fn test_record_reaches_ledger() {
        let ledger = RecordingLedger::new();
        let recorder = AuditRecorder::new(ledger.clone(), Duration::from_secs(1));
        assert!(recorder.record(&record()).await);
        assert_eq!(ledger.records(), vec![record()]);
    }

    #[tokio::test]
    async fn test_ledger_failure_is_swallowed() {
        let ledger = FailingLedger::new();
        let recorder = AuditRecorder::new(ledger.clone(), Duration::from_secs(1));
        assert!(!recorder.record(&record()).await);
        assert_eq!(ledger.attempts(), 1);
    }

    #[tokio::test]
    async fn test_stalled_ledger_is_abandoned() {
        let recorder = AuditRecorder::new(Arc::new(StalledLedger), Duration::from_millis(20));
        assert!(!recorder.record(&record()).await);
    }
}
