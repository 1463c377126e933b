//! Extracted and normalized table data

use serde::Serialize;

use crate::domain::extraction_spec::ExtractionTarget;

/// Markup read from one resolved element; consumed by the normalizer
#[derive(Debug, Clone)]
pub struct RawExtraction {
    pub work_unit_key: String,
    pub target: ExtractionTarget,
    pub markup: String,
}

/// Cell value; `None` is stored as SQL NULL
pub type Cell = Option<String>;

/// Rows ready for the store.
///
/// Every row has exactly `columns.len()` cells and the first column is the
/// injected work unit key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRowSet {
    destination_table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl NormalizedRowSet {
    /// Returns `None` if any row's width differs from the column count.
    #[must_use]
    pub fn new(destination_table: String, columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Option<Self> {
        if rows.iter().any(|row| row.len() != columns.len()) {
            return None;
        }
        Some(Self {
            destination_table,
            columns,
            rows,
        })
    }

    #[must_use]
    pub fn destination_table(&self) -> &str {
        &self.destination_table
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column by name, in row order
    pub fn column_values<'a>(&'a self, name: &str) -> Option<impl Iterator<Item = Option<&'a str>> + 'a> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(move |row| row[idx].as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_ragged_rows() {
        let columns = vec!["team".to_string(), "name".to_string()];
        let rows = vec![vec![Some("NYY".to_string())]];
        assert!(NormalizedRowSet::new("batting".into(), columns, rows).is_none());
    }

    #[test]
    fn test_column_values() {
        let columns = vec!["team".to_string(), "name".to_string()];
        let rows = vec![
            vec![Some("NYY".to_string()), Some("Judge".to_string())],
            vec![Some("NYY".to_string()), None],
        ];
        let set = NormalizedRowSet::new("batting".into(), columns, rows).unwrap();
        let names: Vec<_> = set.column_values("name").unwrap().collect();
        assert_eq!(names, vec![Some("Judge"), None]);
        assert!(set.column_values("missing").is_none());
    }
}
