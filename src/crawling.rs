//! # Crawling
//!
//! The concurrent part of the harvester (explicit module files, no mod.rs):
//! - `session_pool`: fixed set of page sessions, leased one task at a time
//! - `executor`: per-work-unit dataset pipeline with retry and pacing
//! - `audit_recorder`: ledger writes that never fail the pipeline
//! - `orchestrator`: bounded dispatch of work units across the pool

pub mod audit_recorder;
pub mod executor;
pub mod orchestrator;
pub mod session_pool;

pub use audit_recorder::AuditRecorder;
pub use executor::{ExecutorPolicy, TaskExecutor};
pub use orchestrator::{CrawlingOrchestrator, RunReport};
pub use session_pool::{SessionLease, SessionPool, SessionPoolStats};
