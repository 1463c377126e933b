//! Work units from a fixed key list (configuration or command line)

use async_trait::async_trait;

use crate::domain::{SourceError, WorkUnit, WorkUnitSource};

#[derive(Debug, Clone, Default)]
pub struct StaticWorkUnitSource {
    work_units: Vec<WorkUnit>,
}

impl StaticWorkUnitSource {
    /// Ids are the 1-based positions of the keys. Blank keys are skipped.
    #[must_use]
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let work_units = keys
            .into_iter()
            .filter_map(|key| {
                let key = key.as_ref().trim();
                (!key.is_empty()).then(|| key.to_string())
            })
            .enumerate()
            .map(|(idx, key)| WorkUnit::new((idx + 1).to_string(), key))
            .collect();
        Self { work_units }
    }

    #[must_use]
    pub fn new(work_units: Vec<WorkUnit>) -> Self {
        Self { work_units }
    }
}

#[async_trait]
impl WorkUnitSource for StaticWorkUnitSource {
    async fn list(&self) -> Result<Vec<WorkUnit>, SourceError> {
        Ok(self.work_units.clone())
    }
}
