//! Infrastructure layer: HTML parsing, page sessions, PostgreSQL adapters,
//! configuration and logging.

pub mod config;
pub mod database_connection;
pub mod http_session;
pub mod logging;
pub mod pg_audit_ledger;
pub mod pg_store;
pub mod pg_work_unit_source;
pub mod static_source;
pub mod table_normalizer;

// Re-export commonly used items
pub use config::{AppConfig, ConfigError, ConfigManager};
pub use database_connection::DatabaseConnection;
pub use http_session::{HttpPageSession, HttpSessionFactory};
pub use logging::{LoggingGuard, init_logging, init_logging_with_config};
pub use pg_audit_ledger::PgAuditLedger;
pub use pg_store::PgStore;
pub use pg_work_unit_source::PgWorkUnitSource;
pub use static_source::StaticWorkUnitSource;
pub use table_normalizer::TableNormalizer;
