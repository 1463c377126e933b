//! Work unit inventory read from PostgreSQL

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::domain::{SourceError, WorkUnit, WorkUnitSource};
use crate::infrastructure::database_connection::quote_ident;

/// Lists `(id, key)` rows, by default every team ordered by id
pub struct PgWorkUnitSource {
    pool: PgPool,
    query: String,
}

impl PgWorkUnitSource {
    #[must_use]
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            query: default_query(schema),
        }
    }

    /// Custom inventory query; the first column is the id, the second the key.
    #[must_use]
    pub fn with_query(pool: PgPool, query: impl Into<String>) -> Self {
        Self {
            pool,
            query: query.into(),
        }
    }
}

fn default_query(schema: &str) -> String {
    format!("SELECT id, teamabbrev FROM {}.team ORDER BY id", quote_ident(schema))
}

#[async_trait]
impl WorkUnitSource for PgWorkUnitSource {
    async fn list(&self) -> Result<Vec<WorkUnit>, SourceError> {
        let rows = sqlx::query(&self.query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SourceError(e.to_string()))?;

        let mut work_units = Vec::with_capacity(rows.len());
        for row in rows {
            // Integer ids are the common case; fall back to text ids.
            let id = match row.try_get::<i64, _>(0) {
                Ok(id) => id.to_string(),
                Err(_) => match row.try_get::<i32, _>(0) {
                    Ok(id) => id.to_string(),
                    Err(_) => row.try_get::<String, _>(0).map_err(|e| SourceError(e.to_string()))?,
                },
            };
            let key: String = row.try_get(1).map_err(|e| SourceError(e.to_string()))?;
            work_units.push(WorkUnit::new(id, key.trim()));
        }

        info!("📋 Loaded {} work units from the inventory", work_units.len());
        Ok(work_units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_orders_by_id() {
        assert_eq!(
            default_query("baseballreference"),
            "SELECT id, teamabbrev FROM \"baseballreference\".team ORDER BY id"
        );
    }
}
