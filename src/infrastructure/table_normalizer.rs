//! HTML table normalization
//!
//! Turns the outer HTML of an extracted element into a `NormalizedRowSet`:
//! first `<table>` only, repeated header rows and summary rows dropped,
//! identifier-safe lower-case column names, work unit key as first column.
//! Output depends only on the inputs.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::domain::extraction_spec::is_identifier;
use crate::domain::{Cell, ExtractionTarget, NormalizeError, NormalizedRowSet, RawExtraction};

/// Header label of the rank column whose value repeats mid-table
pub const RANK_HEADER: &str = "Rk";

/// Header label of the player/name column
pub const NAME_HEADER: &str = "Name";

/// Case-insensitive substrings marking aggregate rows in the name column
pub const SUMMARY_DENYLIST: [&str; 3] = ["total", "rank in 15", "average"];

/// Lower-cased site headers and their column names
pub const COLUMN_ALIASES: [(&str, &str); 20] = [
    ("w-l%", "wl"),
    ("era+", "eraplus"),
    ("so/w", "sow"),
    ("ops+", "opsplus"),
    ("tops+", "topsplus"),
    ("sops+", "sopsplus"),
    ("xbt%", "xbtpct"),
    ("rs%", "rspct"),
    ("sb%", "sbpct"),
    ("2b", "twob"),
    ("3b", "threeb"),
    ("1sts", "firsts"),
    ("1sts2", "firsts2"),
    ("1sts3", "firsts3"),
    ("1std", "firstd"),
    ("1std3", "firstd3"),
    ("1stdh", "firstdh"),
    ("2nds", "seconds"),
    ("2nds3", "seconds3"),
    ("2ndsh", "secondsh"),
];

const MAX_COLSPAN: usize = 64;

/// Stateless table normalizer
#[derive(Debug, Clone)]
pub struct TableNormalizer {
    key_column: String,
}

impl Default for TableNormalizer {
    fn default() -> Self {
        Self::new(crate::infrastructure::config::defaults::KEY_COLUMN)
    }
}

impl TableNormalizer {
    #[must_use]
    pub fn new(key_column: &str) -> Self {
        Self {
            key_column: column_name(key_column, 0),
        }
    }

    #[must_use]
    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn normalize_raw(&self, raw: &RawExtraction) -> Result<NormalizedRowSet, NormalizeError> {
        self.normalize(&raw.markup, &raw.work_unit_key, &raw.target)
    }

    /// Normalizes the first table found in `raw_markup`.
    pub fn normalize(
        &self,
        raw_markup: &str,
        key_value: &str,
        target: &ExtractionTarget,
    ) -> Result<NormalizedRowSet, NormalizeError> {
        let fragment = Html::parse_fragment(raw_markup);
        let table_selector = selector("table")?;
        let table = fragment
            .select(&table_selector)
            .next()
            .ok_or_else(|| failed("no <table> element in markup"))?;

        let (mut headers, body) = split_table(table);
        if headers.is_empty() {
            return Err(failed("table has no header row"));
        }

        let rank_idx = headers.iter().position(|h| h == RANK_HEADER);
        let name_idx = headers.iter().position(|h| h == NAME_HEADER);

        let kept: Vec<Vec<String>> = body
            .into_iter()
            .filter(|cells| !cells.iter().all(String::is_empty))
            .filter(|cells| !rank_idx.is_some_and(|idx| cells.get(idx).is_some_and(|v| v == RANK_HEADER)))
            .filter(|cells| !name_idx.is_some_and(|idx| cells.get(idx).is_some_and(|v| is_summary_or_header(v))))
            .collect();
        if kept.is_empty() {
            return Err(failed("table has no data rows"));
        }

        // Cells past the last header get unnamed `col{idx}` columns.
        let width = kept.iter().map(Vec::len).max().unwrap_or(0).max(headers.len());
        headers.resize(width, String::new());

        let rows: Vec<Vec<Cell>> = kept
            .into_iter()
            .map(|mut cells| {
                cells.resize(width, String::new());
                let mut row = Vec::with_capacity(width + 1);
                row.push(Some(key_value.to_string()));
                row.extend(cells.into_iter().map(|v| (!v.is_empty()).then_some(v)));
                row
            })
            .collect();

        let columns = self.output_columns(&headers);
        debug!(
            "📋 Normalized {} rows x {} columns for {}",
            rows.len(),
            columns.len(),
            target.destination_table
        );

        NormalizedRowSet::new(target.destination_table.clone(), columns, rows)
            .ok_or_else(|| failed("row width does not match header width"))
    }

    fn output_columns(&self, headers: &[String]) -> Vec<String> {
        let mut columns: Vec<String> = Vec::with_capacity(headers.len() + 1);
        columns.push(self.key_column.clone());
        for (idx, header) in headers.iter().enumerate() {
            let base = column_name(header, idx);
            let mut name = base.clone();
            let mut n = 1;
            while columns.contains(&name) {
                name = format!("{base}_{n}");
                n += 1;
            }
            columns.push(name);
        }
        columns
    }
}

/// Lower-cases, applies the alias table, then makes the name identifier-safe.
#[must_use]
pub fn column_name(header: &str, idx: usize) -> String {
    let lower = header.trim().to_lowercase();
    if let Some((_, alias)) = COLUMN_ALIASES.iter().find(|(from, _)| *from == lower) {
        return (*alias).to_string();
    }
    if is_identifier(&lower) {
        return lower;
    }

    let mut out = String::with_capacity(lower.len());
    for c in lower.chars() {
        match c {
            '%' => out.push_str("pct"),
            '+' => out.push_str("plus"),
            '#' => out.push_str("num"),
            c if c.is_ascii_alphanumeric() => out.push(c),
            c if (c.is_whitespace() || c == '_') && !out.ends_with('_') => out.push('_'),
            _ => {}
        }
    }
    let trimmed = out.trim_matches('_');

    match trimmed.chars().next() {
        None => format!("col{idx}"),
        Some(c) if c.is_ascii_digit() => format!("c{trimmed}"),
        Some(_) => trimmed.to_string(),
    }
}

fn is_summary_or_header(name: &str) -> bool {
    if name == NAME_HEADER {
        return true;
    }
    let lower = name.to_lowercase();
    SUMMARY_DENYLIST.iter().any(|term| lower.contains(term))
}

/// Header labels of the last `<thead>` row (or the first row when the table
/// has no `<thead>`) and the cell texts of every other row.
fn split_table(table: ElementRef<'_>) -> (Vec<String>, Vec<Vec<String>>) {
    let mut header_rows = Vec::new();
    let mut body_rows = Vec::new();

    for section in table.children().filter_map(ElementRef::wrap) {
        match section.value().name() {
            "thead" => header_rows.extend(rows_of(section)),
            "tbody" | "tfoot" => body_rows.extend(rows_of(section)),
            "tr" => body_rows.push(section),
            _ => {}
        }
    }

    let header = if header_rows.is_empty() {
        if body_rows.is_empty() {
            return (Vec::new(), Vec::new());
        }
        body_rows.remove(0)
    } else {
        header_rows[header_rows.len() - 1]
    };

    let headers = cell_texts(header);
    let body = body_rows.into_iter().map(cell_texts).collect();
    (headers, body)
}

fn rows_of(section: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    section
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "tr")
}

fn cell_texts(row: ElementRef<'_>) -> Vec<String> {
    let mut cells = Vec::new();
    for cell in row.children().filter_map(ElementRef::wrap) {
        let name = cell.value().name();
        if name != "td" && name != "th" {
            continue;
        }
        let text = cell.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let span = cell
            .value()
            .attr("colspan")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(1)
            .clamp(1, MAX_COLSPAN);
        cells.extend(std::iter::repeat_n(text, span));
    }
    cells
}

fn selector(css: &str) -> Result<Selector, NormalizeError> {
    Selector::parse(css).map_err(|e| failed(&format!("invalid selector '{css}': {e}")))
}

fn failed(reason: &str) -> NormalizeError {
    NormalizeError::ExtractionFailed(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DatasetKind;
    use crate::test_utils::fixtures;
    use proptest::prelude::*;
    use rstest::rstest;

    fn target() -> ExtractionTarget {
        ExtractionTarget::new(DatasetKind::Batting, "#team_batting", "batting")
    }

    #[test]
    fn test_filters_header_repeats_and_summary_rows() {
        let normalizer = TableNormalizer::new("team");
        let set = normalizer
            .normalize(fixtures::BATTING_TABLE, "NYY", &target())
            .unwrap();

        let names: Vec<_> = set.column_values("name").unwrap().collect();
        assert_eq!(names, vec![Some("Gary Sanchez"), Some("DJ LeMahieu")]);
        assert!(set.rows().iter().all(|row| row[0].as_deref() == Some("NYY")));
        assert_eq!(set.destination_table(), "batting");
    }

    #[test]
    fn test_columns_are_lowercased_aliased_and_keyed() {
        let normalizer = TableNormalizer::new("team");
        let set = normalizer
            .normalize(fixtures::BATTING_TABLE, "NYY", &target())
            .unwrap();
        assert_eq!(
            set.columns(),
            &["team", "rk", "pos", "name", "age", "twob", "sb", "sbpct", "opsplus"]
        );
        assert!(set.rows().iter().all(|row| row.len() == set.columns().len()));
    }

    #[test]
    fn test_empty_cells_become_null() {
        let normalizer = TableNormalizer::new("team");
        let set = normalizer
            .normalize(fixtures::BATTING_TABLE, "NYY", &target())
            .unwrap();
        let sbpct: Vec<_> = set.column_values("sbpct").unwrap().collect();
        assert_eq!(sbpct, vec![Some("50.0"), None]);
    }

    #[rstest]
    #[case("SB%", "sbpct")]
    #[case("W-L%", "wl")]
    #[case("ERA+", "eraplus")]
    #[case("SO/W", "sow")]
    #[case("2B", "twob")]
    #[case("1stS2", "firsts2")]
    #[case("2ndSH", "secondsh")]
    #[case("OBP", "obp")]
    #[case("BA%", "bapct")]
    #[case("RE24+", "re24plus")]
    #[case("Opp Rk", "opp_rk")]
    #[case("1B", "c1b")]
    #[case("", "col3")]
    fn test_column_name(#[case] header: &str, #[case] expected: &str) {
        assert_eq!(column_name(header, 3), expected);
    }

    #[test]
    fn test_cells_beyond_the_header_get_unnamed_columns() {
        let markup = r"<table><thead><tr><th>Name</th><th>HR</th></tr></thead>
            <tbody><tr><td>A</td><td>3</td><td>99</td></tr><tr><td>B</td><td>1</td></tr></tbody></table>";
        let set = TableNormalizer::new("team").normalize(markup, "NYY", &target()).unwrap();

        assert_eq!(set.columns(), &["team", "name", "hr", "col2"]);
        let extra: Vec<_> = set.column_values("col2").unwrap().collect();
        assert_eq!(extra, vec![Some("99"), None]);
    }

    #[test]
    fn test_duplicate_and_blank_headers_are_disambiguated() {
        let markup = r"<table><thead><tr><th>Split</th><th>G</th><th>G</th><th></th><th>Team</th></tr></thead>
            <tbody><tr><td>vs RHP</td><td>1</td><td>2</td><td>x</td><td>y</td></tr></tbody></table>";
        let set = TableNormalizer::new("team").normalize(markup, "BOS", &target()).unwrap();
        assert_eq!(set.columns(), &["team", "split", "g", "g_1", "col3", "team_1"]);
    }

    #[test]
    fn test_uses_last_header_row_and_expands_colspan() {
        let markup = r#"<div><table>
            <thead>
              <tr><th colspan="2">Group</th><th>Other</th></tr>
              <tr><th>Split</th><th>PA</th><th>BA</th></tr>
            </thead>
            <tbody>
              <tr><td colspan="2">Totals row</td><td>.250</td></tr>
              <tr><td>vs LHP</td><td>120</td><td>.301</td></tr>
            </tbody></table></div>"#;
        let set = TableNormalizer::new("team").normalize(markup, "BOS", &target()).unwrap();
        assert_eq!(set.columns(), &["team", "split", "pa", "ba"]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.rows()[0][1].as_deref(), Some("Totals row"));
        assert_eq!(set.rows()[0][2].as_deref(), Some("Totals row"));
    }

    #[test]
    fn test_table_without_thead_uses_first_row() {
        let markup = "<table><tr><th>Name</th><th>HR</th></tr><tr><td>A</td><td>3</td></tr></table>";
        let set = TableNormalizer::new("team").normalize(markup, "SEA", &target()).unwrap();
        assert_eq!(set.columns(), &["team", "name", "hr"]);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let markup = "<table><thead><tr><th>Name</th><th>HR</th><th>RBI</th></tr></thead>
            <tbody><tr><td>A</td><td>3</td></tr></tbody></table>";
        let set = TableNormalizer::new("team").normalize(markup, "SEA", &target()).unwrap();
        assert_eq!(set.rows()[0], vec![Some("SEA".into()), Some("A".into()), Some("3".into()), None]);
    }

    #[rstest]
    #[case("<div id=\"team_batting\">No stats yet</div>")]
    #[case("<table></table>")]
    #[case("<table><thead><tr><th>Name</th></tr></thead><tbody><tr><td>Team Totals</td></tr></tbody></table>")]
    fn test_unusable_markup_fails(#[case] markup: &str) {
        let err = TableNormalizer::new("team").normalize(markup, "NYY", &target()).unwrap_err();
        assert!(matches!(err, NormalizeError::ExtractionFailed(_)));
    }

    #[test]
    fn test_only_first_table_is_used() {
        let markup = "<div><table><thead><tr><th>A</th></tr></thead><tbody><tr><td>1</td></tr></tbody></table>
            <table><thead><tr><th>B</th></tr></thead><tbody><tr><td>2</td></tr></tbody></table></div>";
        let set = TableNormalizer::new("team").normalize(markup, "NYY", &target()).unwrap();
        assert_eq!(set.columns(), &["team", "a"]);
    }

    proptest! {
        #[test]
        fn prop_normalize_is_deterministic(key in "[A-Z]{2,3}", extra in "[a-zA-Z0-9 %+]{0,12}") {
            let markup = fixtures::BATTING_TABLE.replace("DJ LeMahieu", &format!("DJ {extra}"));
            let normalizer = TableNormalizer::new("team");
            let first = normalizer.normalize(&markup, &key, &target());
            let second = normalizer.normalize(&markup, &key, &target());
            prop_assert_eq!(first, second);
        }
    }
}
