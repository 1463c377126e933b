//! # Work Units
//!
//! One work unit drives one full pass through the extraction spec table
//! (for the built-in table: one team).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a work unit in the external inventory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkUnitId(String);

impl WorkUnitId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for WorkUnitId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for WorkUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable unit of external work, e.g. `{ id: 17, key: "NYY" }`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkUnit {
    id: WorkUnitId,
    key: String,
}

impl WorkUnit {
    #[must_use]
    pub fn new(id: impl Into<WorkUnitId>, key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &WorkUnitId {
        &self.id
    }

    /// Key substituted into URL templates and injected into every row set
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl From<&str> for WorkUnitId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WorkUnitId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.key, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_unit_accessors() {
        let unit = WorkUnit::new(17_i64, "NYY");
        assert_eq!(unit.id().as_str(), "17");
        assert_eq!(unit.key(), "NYY");
        assert_eq!(unit.to_string(), "NYY (#17)");
    }
}
