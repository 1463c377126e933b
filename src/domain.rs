//! Domain module - data model, error taxonomy and capability traits
//!
//! Each module is its own file in the domain/ directory; commonly used
//! items are re-exported here.

pub mod audit;
pub mod capabilities;
pub mod errors;
pub mod extraction_spec;
pub mod row_set;
pub mod work_unit;

pub use audit::{AuditRecord, AuditStatus};
pub use capabilities::{AuditLedger, ElementHandle, PageSession, SessionFactory, Store, WorkUnitSource};
pub use errors::{
    LedgerError, NormalizeError, OrchestratorError, PersistError, SessionError, SessionPoolError,
    SourceError, SpecTableError,
};
pub use extraction_spec::{DatasetKind, DatasetSpec, ExtractionSpecTable, ExtractionTarget, TemplateParams};
pub use row_set::{Cell, NormalizedRowSet, RawExtraction};
pub use work_unit::{WorkUnit, WorkUnitId};
