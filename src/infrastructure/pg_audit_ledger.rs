//! PostgreSQL audit ledger
//!
//! One row per record in `<schema>.audit`; the work unit key is resolved to
//! the team id at insert time. Dataset-level records (NAVIGATE_TIMEOUT) have
//! no destination and leave `tablename` NULL.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{AuditLedger, AuditRecord, LedgerError};
use crate::infrastructure::database_connection::quote_ident;

pub struct PgAuditLedger {
    pool: PgPool,
    insert_sql: String,
}

impl PgAuditLedger {
    #[must_use]
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            insert_sql: insert_statement(schema),
        }
    }
}

fn insert_statement(schema: &str) -> String {
    let schema = quote_ident(schema);
    format!(
        "INSERT INTO {schema}.audit (statusid, teamid, tablename, error) \
         VALUES ($1, (SELECT id FROM {schema}.team WHERE teamabbrev = $2), $3, $4)"
    )
}

/// `statusid`, team key, `tablename`, `error` in statement order
fn audit_values(record: &AuditRecord) -> (i16, &str, Option<&str>, Option<&str>) {
    (
        record.status.status_id(),
        &record.work_unit_key,
        record.destination_table.as_deref(),
        record.error_detail.as_deref(),
    )
}

#[async_trait]
impl AuditLedger for PgAuditLedger {
    async fn append(&self, record: &AuditRecord) -> Result<(), LedgerError> {
        let (status_id, key, table, error) = audit_values(record);

        sqlx::query(&self.insert_sql)
            .bind(status_id)
            .bind(key)
            .bind(table)
            .bind(error)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| LedgerError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DatasetKind, ExtractionTarget};

    #[test]
    fn test_insert_resolves_team_id() {
        assert_eq!(
            insert_statement("baseballreference"),
            "INSERT INTO \"baseballreference\".audit (statusid, teamid, tablename, error) \
             VALUES ($1, (SELECT id FROM \"baseballreference\".team WHERE teamabbrev = $2), $3, $4)"
        );
    }

    #[test]
    fn test_navigate_timeout_leaves_tablename_null() {
        let record = AuditRecord::navigate_timeout("NYY", DatasetKind::Pitching, None);
        assert_eq!(
            audit_values(&record),
            (2, "NYY", None, Some("Timeout on get request."))
        );
    }

    #[test]
    fn test_target_records_name_their_table() {
        let target = ExtractionTarget::new(DatasetKind::Batting, "#team_batting", "batting");
        let record = AuditRecord::success("BOS", &target);
        assert_eq!(audit_values(&record), (0, "BOS", Some("batting"), None));
    }
}
