//! Relationship kinds between maps and other entities

use serde::{Deserialize, Serialize};

/// Kind of a relationship edge, stored in the `type_id` column.
///
/// The column is an open integer so other kinds can share the table;
/// marker membership in a map is the only kind the store assigns itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationType(pub i16);

impl RelationType {
    /// A marker belonging to a map
    pub const MARKER: Self = Self(2);

    pub fn as_i16(self) -> i16 {
        self.0
    }
}
