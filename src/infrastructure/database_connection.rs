// Database connection and pool management
// PostgreSQL pool shared by the store, the audit ledger and the work unit source

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tracing::info;

use crate::infrastructure::config::AppConfig;

pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .with_context(|| format!("Failed to connect to database at {}", redact(database_url)))?;

        info!("🗄️ Connected to {} ({} connections max)", redact(database_url), max_connections);
        Ok(Self { pool })
    }

    /// Wraps an existing pool
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects with the pool sized for the configured concurrency.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(&config.database.url, config.effective_max_connections()).await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Hides the password of a connection URL for logging
fn redact(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            // Only fails for cannot-be-a-base URLs, which have no password.
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<unparseable database url>".to_string(),
    }
}

/// Quotes a SQL identifier (schema, table or column name)
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_hides_password() {
        assert_eq!(
            redact("postgres://stats:s3cret@db:5432/baseball"),
            "postgres://stats:***@db:5432/baseball"
        );
        assert_eq!(redact("postgres://db/baseball"), "postgres://db/baseball");
        assert_eq!(redact("not a url"), "<unparseable database url>");
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("batting"), "\"batting\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
