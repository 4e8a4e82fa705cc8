//! Domain models with validation at construction
//!
//! Raw ids are sanitized before they reach a query. Invalid input returns
//! ValidationError, not panic.

pub mod ids;
pub mod map_config;
pub mod outcome;
pub mod relation;
pub mod validation;

pub use ids::{absint, positive_id, sanitize_csv, sanitize_ids, IdList};
pub use map_config::{filter_map_ids, MapSettings};
pub use outcome::{BulkUpdate, UpdateOutcome};
pub use relation::RelationType;
pub use validation::ValidationError;
