//! PostgreSQL row set store
//!
//! Appends a `NormalizedRowSet` to `<schema>.<destination_table>` inside one
//! transaction. Rows are sent in chunks as a JSON array and expanded with
//! `json_populate_recordset`, so the column types come from the table
//! definition and empty cells arrive as NULL.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::debug;

use crate::domain::{Cell, NormalizedRowSet, PersistError, Store};
use crate::infrastructure::database_connection::quote_ident;

pub struct PgStore {
    pool: PgPool,
    schema: String,
    chunk_size: usize,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, schema: &str, chunk_size: usize) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn persist(&self, rows: &NormalizedRowSet) -> Result<u64, PersistError> {
        let table = rows.destination_table();
        let to_persist_error = |e: sqlx::Error| PersistError::new(table, e);
        let sql = insert_statement(&self.schema, table, rows.columns());

        let mut tx = self.pool.begin().await.map_err(to_persist_error)?;
        let mut written = 0;
        for chunk in rows.rows().chunks(self.chunk_size) {
            let payload = chunk_payload(rows.columns(), chunk);
            let result = sqlx::query(&sql)
                .bind(payload)
                .execute(&mut *tx)
                .await
                .map_err(to_persist_error)?;
            written += result.rows_affected();
        }
        tx.commit().await.map_err(to_persist_error)?;

        debug!("💾 Appended {} rows to {}.{}", written, self.schema, table);
        Ok(written)
    }
}

fn insert_statement(schema: &str, table: &str, columns: &[String]) -> String {
    let target = format!("{}.{}", quote_ident(schema), quote_ident(table));
    let column_list = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
    format!(
        "INSERT INTO {target} ({column_list}) \
         SELECT {column_list} FROM json_populate_recordset(NULL::{target}, $1::json)"
    )
}

/// JSON array of `{column: value}` objects
fn chunk_payload(columns: &[String], rows: &[Vec<Cell>]) -> String {
    let objects: Vec<Value> = rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = columns
                .iter()
                .zip(row)
                .map(|(column, cell)| {
                    let value = cell.as_ref().map_or(Value::Null, |v| Value::String(v.clone()));
                    (column.clone(), value)
                })
                .collect();
            Value::Object(object)
        })
        .collect();
    Value::Array(objects).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement_quotes_identifiers() {
        let sql = insert_statement(
            "baseballreference",
            "batting",
            &["team".to_string(), "sbpct".to_string()],
        );
        assert_eq!(
            sql,
            "INSERT INTO \"baseballreference\".\"batting\" (\"team\", \"sbpct\") \
             SELECT \"team\", \"sbpct\" FROM json_populate_recordset(NULL::\"baseballreference\".\"batting\", $1::json)"
        );
    }

    #[test]
    fn test_payload_keeps_nulls() {
        let columns = vec!["team".to_string(), "name".to_string(), "sbpct".to_string()];
        let rows = vec![vec![Some("NYY".to_string()), Some("DJ LeMahieu".to_string()), None]];
        let payload: Value = serde_json::from_str(&chunk_payload(&columns, &rows)).unwrap();
        assert_eq!(
            payload,
            serde_json::json!([{ "team": "NYY", "name": "DJ LeMahieu", "sbpct": null }])
        );
    }
}
