//! Write outcomes for update operations

use serde::Serialize;

/// Result of overwriting a single row.
///
/// Distinguishes a row that did not exist from one whose content already
/// matched the requested values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// The row existed and at least one content column changed
    Updated,
    /// The row existed and already held the requested content
    Unchanged,
    /// No row with that id
    NotFound,
}

impl UpdateOutcome {
    pub(crate) fn from_flags(found: bool, changed: bool) -> Self {
        match (found, changed) {
            (false, _) => Self::NotFound,
            (true, true) => Self::Updated,
            (true, false) => Self::Unchanged,
        }
    }

    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated)
    }
}

/// Result of overwriting many rows with the same content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkUpdate {
    /// Number of requested ids that exist
    pub found: i64,
    /// Ids whose content actually changed
    pub updated: Vec<i32>,
}

impl BulkUpdate {
    /// Rows that matched but were already up to date.
    pub fn unchanged(&self) -> i64 {
        self.found - self.updated.len() as i64
    }

    /// Requested ids that did not exist.
    pub fn missing(&self, requested: usize) -> i64 {
        requested as i64 - self.found
    }
}
