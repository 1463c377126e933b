//! # Extraction Spec Table
//!
//! Static description of which pages to load per work unit and which
//! in-page tables to extract from each. Built once at startup and validated;
//! immutable for the process lifetime.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::domain::errors::SpecTableError;

/// Placeholder replaced by the work unit key
pub const KEY_PLACEHOLDER: &str = "{key}";
/// Placeholder replaced by the configured season
pub const SEASON_PLACEHOLDER: &str = "{season}";

const BASE_URL: &str = "https://www.baseball-reference.com";

/// Named dataset kinds (one page template each)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    Batting,
    Pitching,
    BattingSplits,
    PitchingSplits,
}

impl DatasetKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Batting => "batting",
            Self::Pitching => "pitching",
            Self::BattingSplits => "batting_splits",
            Self::PitchingSplits => "pitching_splits",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (page, element) pair: where the table lives and where its rows go
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractionTarget {
    pub dataset_kind: DatasetKind,
    /// CSS selector resolving to the element that wraps the table
    pub locator: String,
    pub destination_table: String,
}

impl ExtractionTarget {
    #[must_use]
    pub fn new(dataset_kind: DatasetKind, locator: &str, destination_table: &str) -> Self {
        Self {
            dataset_kind,
            locator: locator.to_string(),
            destination_table: destination_table.to_string(),
        }
    }
}

/// Values substituted into URL templates besides the work unit key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateParams {
    pub season: u16,
}

/// One page template plus its ordered extraction targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub dataset_kind: DatasetKind,
    pub url_template: String,
    pub targets: Vec<ExtractionTarget>,
}

impl DatasetSpec {
    /// Formats the URL template for one work unit
    #[must_use]
    pub fn render_url(&self, key: &str, params: &TemplateParams) -> String {
        self.url_template
            .replace(KEY_PLACEHOLDER, key)
            .replace(SEASON_PLACEHOLDER, &params.season.to_string())
    }

    fn validate(&self) -> Result<(), SpecTableError> {
        if self.targets.is_empty() {
            return Err(SpecTableError::NoTargets(self.dataset_kind));
        }
        if !self.url_template.contains(KEY_PLACEHOLDER) {
            return Err(SpecTableError::MissingKeyPlaceholder(self.dataset_kind));
        }
        for target in &self.targets {
            if target.dataset_kind != self.dataset_kind {
                return Err(SpecTableError::MismatchedTarget {
                    dataset: self.dataset_kind,
                    target: target.dataset_kind,
                });
            }
            if target.locator.trim().is_empty() {
                return Err(SpecTableError::EmptyLocator(self.dataset_kind));
            }
            if !is_identifier(&target.destination_table) {
                return Err(SpecTableError::InvalidDestination(target.destination_table.clone()));
            }
        }
        Ok(())
    }
}

/// Validated, ordered table of dataset specs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DatasetSpec>", into = "Vec<DatasetSpec>")]
pub struct ExtractionSpecTable {
    datasets: Vec<DatasetSpec>,
}

impl ExtractionSpecTable {
    /// Validates and freezes a table.
    ///
    /// Rejects an empty table, duplicated dataset kinds, datasets without
    /// targets, templates without a `{key}` placeholder, and destination
    /// tables that are reused or not identifier-safe.
    pub fn new(datasets: Vec<DatasetSpec>) -> Result<Self, SpecTableError> {
        if datasets.is_empty() {
            return Err(SpecTableError::Empty);
        }

        let mut kinds = HashSet::new();
        let mut destinations = HashSet::new();
        for dataset in &datasets {
            if !kinds.insert(dataset.dataset_kind) {
                return Err(SpecTableError::DuplicateDataset(dataset.dataset_kind));
            }
            dataset.validate()?;
            for target in &dataset.targets {
                if !destinations.insert(target.destination_table.as_str()) {
                    return Err(SpecTableError::DuplicateDestination(
                        target.destination_table.clone(),
                    ));
                }
            }
        }

        Ok(Self { datasets })
    }

    /// Team batting/pitching pages and their split pages on baseball-reference
    #[must_use]
    pub fn baseball_reference() -> Self {
        use DatasetKind::{Batting, BattingSplits, Pitching, PitchingSplits};

        let datasets = vec![
            DatasetSpec {
                dataset_kind: Batting,
                url_template: format!("{BASE_URL}/teams/{{key}}/{{season}}-batting.shtml"),
                targets: vec![
                    ExtractionTarget::new(Batting, "#team_batting", "batting"),
                    ExtractionTarget::new(Batting, "#players_baserunning_batting", "baserunning"),
                ],
            },
            DatasetSpec {
                dataset_kind: Pitching,
                url_template: format!("{BASE_URL}/teams/{{key}}/{{season}}-pitching.shtml"),
                targets: vec![
                    ExtractionTarget::new(Pitching, "#team_pitching", "pitching"),
                    ExtractionTarget::new(Pitching, "#players_batting_pitching", "batting_pitching"),
                ],
            },
            DatasetSpec {
                dataset_kind: BattingSplits,
                url_template: format!(
                    "{BASE_URL}/teams/split.cgi?t=b&team={{key}}&year={{season}}"
                ),
                targets: vec![
                    ExtractionTarget::new(BattingSplits, "#plato", "batting_splits"),
                    ExtractionTarget::new(BattingSplits, "#hmvis", "batting_home_away"),
                ],
            },
            DatasetSpec {
                dataset_kind: PitchingSplits,
                url_template: format!(
                    "{BASE_URL}/teams/split.cgi?t=p&team={{key}}&year={{season}}"
                ),
                targets: vec![
                    ExtractionTarget::new(PitchingSplits, "#plato", "pitching_splits"),
                    ExtractionTarget::new(PitchingSplits, "#hmvis", "pitching_home_away"),
                ],
            },
        ];

        // Built-in table satisfies every invariant checked by `new`.
        Self { datasets }
    }

    #[must_use]
    pub fn datasets(&self) -> &[DatasetSpec] {
        &self.datasets
    }

    #[must_use]
    pub fn get(&self, kind: DatasetKind) -> Option<&DatasetSpec> {
        self.datasets.iter().find(|d| d.dataset_kind == kind)
    }

    /// Total number of extraction targets across all datasets
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.datasets.iter().map(|d| d.targets.len()).sum()
    }
}

impl TryFrom<Vec<DatasetSpec>> for ExtractionSpecTable {
    type Error = SpecTableError;

    fn try_from(datasets: Vec<DatasetSpec>) -> Result<Self, Self::Error> {
        Self::new(datasets)
    }
}

impl From<ExtractionSpecTable> for Vec<DatasetSpec> {
    fn from(table: ExtractionSpecTable) -> Self {
        table.datasets
    }
}

/// Lower-case ASCII letters, digits and underscores, not starting with a digit
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
