//! Statsheet Harvester - concurrent extraction of team stat tables
//!
//! A fixed pool of page sessions works through a list of work units (teams).
//! For each unit every dataset page of the extraction table is loaded, each
//! target table is normalized and appended to its destination, and every
//! outcome lands in an audit ledger.

// Module declarations
pub mod crawling;
pub mod domain;
pub mod infrastructure;
pub mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::crawling::{AuditRecorder, CrawlingOrchestrator, ExecutorPolicy, RunReport, SessionPool, TaskExecutor};
use crate::domain::{TemplateParams, WorkUnitSource};
use crate::infrastructure::{
    AppConfig, DatabaseConnection, HttpSessionFactory, PgAuditLedger, PgStore, PgWorkUnitSource,
    StaticWorkUnitSource, TableNormalizer,
};

/// Wires the PostgreSQL adapters and HTTP sessions described by `config`,
/// runs every work unit and returns the report.
pub async fn run(config: &AppConfig, cancellation_token: CancellationToken) -> Result<RunReport> {
    let database = DatabaseConnection::from_config(config).await?;
    run_on(config, database, cancellation_token).await
}

/// Runs against an open database and closes it whether or not the run succeeds.
pub async fn run_on(
    config: &AppConfig,
    database: DatabaseConnection,
    cancellation_token: CancellationToken,
) -> Result<RunReport> {
    let result = run_with(config, &database, cancellation_token).await;
    database.close().await;
    result
}

async fn run_with(
    config: &AppConfig,
    database: &DatabaseConnection,
    cancellation_token: CancellationToken,
) -> Result<RunReport> {
    let pool = database.pool().clone();
    let schema = config.database.schema.as_str();

    let source: Box<dyn WorkUnitSource> = if !config.crawler.work_units.is_empty() {
        info!("📋 Using {} work units from configuration", config.crawler.work_units.len());
        Box::new(StaticWorkUnitSource::from_keys(&config.crawler.work_units))
    } else if let Some(query) = &config.database.work_unit_query {
        Box::new(PgWorkUnitSource::with_query(pool.clone(), query.clone()))
    } else {
        Box::new(PgWorkUnitSource::new(pool.clone(), schema))
    };

    let recorder = AuditRecorder::new(
        Arc::new(PgAuditLedger::new(pool.clone(), schema)),
        Duration::from_secs(config.database.audit_write_timeout_secs),
    );
    let executor = TaskExecutor::new(
        Arc::new(config.spec_table()),
        TemplateParams {
            season: config.crawler.season,
        },
        TableNormalizer::new(&config.normalizer.key_column),
        Arc::new(PgStore::new(pool, schema, config.database.insert_chunk_size)),
        recorder,
        ExecutorPolicy::from_config(&config.crawler),
    );

    let sessions = SessionPool::initialize(
        config.crawler.concurrency,
        &HttpSessionFactory::new(config.http.clone()),
    )
    .await
    .context("Failed to start page sessions")?;

    let report = CrawlingOrchestrator::new(sessions, Arc::new(executor))
        .with_cancellation(cancellation_token)
        .run_from_source(source.as_ref())
        .await
        .context("Run aborted")?;

    Ok(report)
}
