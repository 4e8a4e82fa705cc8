//! Filter compilation for map, marker and layer listings
//!
//! [`FilterOptions`] is the loose, serde-friendly input; compiling it against
//! a [`Scope`] yields a [`CompiledFilter`] that pushes bound SQL fragments
//! into a `sqlx::QueryBuilder`.

pub mod compiler;
pub mod geo;
pub mod options;

pub use compiler::{like_pattern, CompiledFilter, Scope, SortOrder};
pub use geo::{DistanceUnit, RadiusFilter, EARTH_RADIUS_IMPERIAL, EARTH_RADIUS_METRIC};
pub use options::FilterOptions;
