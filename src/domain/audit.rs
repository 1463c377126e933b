//! # Audit Records
//!
//! One record per (work unit, extraction target) outcome, plus one per
//! dataset whose page could not be loaded. Records are never mutated.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::extraction_spec::{DatasetKind, ExtractionTarget};

/// Outcome class; the numeric ids are the ledger's `statusid` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Success,
    PersistFailed,
    NavigateTimeout,
    ElementTimeout,
    ExtractionFailed,
}

impl AuditStatus {
    pub const ALL: [Self; 5] = [
        Self::Success,
        Self::PersistFailed,
        Self::NavigateTimeout,
        Self::ElementTimeout,
        Self::ExtractionFailed,
    ];

    #[must_use]
    pub const fn status_id(self) -> i16 {
        match self {
            Self::Success => 0,
            Self::PersistFailed => 1,
            Self::NavigateTimeout => 2,
            Self::ElementTimeout => 3,
            Self::ExtractionFailed => 4,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::PersistFailed => "PERSIST_FAILED",
            Self::NavigateTimeout => "NAVIGATE_TIMEOUT",
            Self::ElementTimeout => "ELEMENT_TIMEOUT",
            Self::ExtractionFailed => "EXTRACTION_FAILED",
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub work_unit_key: String,
    pub status: AuditStatus,
    pub dataset_kind: DatasetKind,
    pub destination_table: Option<String>,
    pub error_detail: Option<String>,
}

impl AuditRecord {
    #[must_use]
    pub fn success(work_unit_key: &str, target: &ExtractionTarget) -> Self {
        Self::for_target(work_unit_key, AuditStatus::Success, target, None)
    }

    #[must_use]
    pub fn persist_failed(work_unit_key: &str, target: &ExtractionTarget, cause: String) -> Self {
        Self::for_target(work_unit_key, AuditStatus::PersistFailed, target, Some(cause))
    }

    #[must_use]
    pub fn element_timeout(work_unit_key: &str, target: &ExtractionTarget, cause: Option<&str>) -> Self {
        let detail = match cause {
            Some(cause) => format!("html table - {}: {cause}", target.locator),
            None => format!("html table - {}", target.locator),
        };
        Self::for_target(work_unit_key, AuditStatus::ElementTimeout, target, Some(detail))
    }

    #[must_use]
    pub fn extraction_failed(work_unit_key: &str, target: &ExtractionTarget, cause: &str) -> Self {
        let detail = format!("html table - {}: {cause}", target.locator);
        Self::for_target(work_unit_key, AuditStatus::ExtractionFailed, target, Some(detail))
    }

    /// Dataset-level record: the page never loaded, so no target was attempted
    #[must_use]
    pub fn navigate_timeout(work_unit_key: &str, dataset_kind: DatasetKind, cause: Option<&str>) -> Self {
        let detail = match cause {
            Some(cause) => format!("Timeout on get request. {cause}"),
            None => "Timeout on get request.".to_string(),
        };
        Self {
            work_unit_key: work_unit_key.to_string(),
            status: AuditStatus::NavigateTimeout,
            dataset_kind,
            destination_table: None,
            error_detail: Some(detail),
        }
    }

    fn for_target(
        work_unit_key: &str,
        status: AuditStatus,
        target: &ExtractionTarget,
        error_detail: Option<String>,
    ) -> Self {
        Self {
            work_unit_key: work_unit_key.to_string(),
            status,
            dataset_kind: target.dataset_kind,
            destination_table: Some(target.destination_table.clone()),
            error_detail,
        }
    }
}
