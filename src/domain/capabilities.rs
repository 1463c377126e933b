//! # Capability Traits
//!
//! External collaborators the crawler is written against. Concrete
//! implementations live in `infrastructure`; in-memory doubles in
//! `test_utils`.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::audit::AuditRecord;
use crate::domain::errors::{LedgerError, PersistError, SessionError, SourceError};
use crate::domain::row_set::NormalizedRowSet;
use crate::domain::work_unit::WorkUnit;

/// Element resolved by `PageSession::wait_for_element`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    locator: String,
    outer_html: String,
}

impl ElementHandle {
    #[must_use]
    pub const fn new(locator: String, outer_html: String) -> Self {
        Self { locator, outer_html }
    }

    #[must_use]
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Outer HTML of the resolved element
    #[must_use]
    pub fn read_markup(&self) -> &str {
        &self.outer_html
    }
}

/// One stateful page-loading session (a browser tab, an HTTP session, ...).
///
/// Sessions keep the last loaded page; `wait_for_element` resolves against it.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Loads `url`; on success it becomes the current page.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), SessionError>;

    /// Waits up to `timeout` for `locator` to resolve on the current page.
    async fn wait_for_element(&mut self, locator: &str, timeout: Duration) -> Result<ElementHandle, SessionError>;

    /// Releases the underlying resources. Called exactly once by the pool.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Creates the sessions owned by the pool
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, session_id: usize) -> Result<Box<dyn PageSession>, SessionError>;
}

/// Destination for normalized row sets. Appends; not idempotent.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the number of rows written.
    async fn persist(&self, rows: &NormalizedRowSet) -> Result<u64, PersistError>;
}

/// Append-only outcome ledger
#[async_trait]
pub trait AuditLedger: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), LedgerError>;
}

/// Inventory of work units, listed once per run
#[async_trait]
pub trait WorkUnitSource: Send + Sync {
    async fn list(&self) -> Result<Vec<WorkUnit>, SourceError>;
}
