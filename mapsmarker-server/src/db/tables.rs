//! Table names derived from a configurable prefix
//!
//! Table names are interpolated into SQL text, so the prefix is validated
//! once here and never taken from request input.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ValidationError;

/// Maximum length for a table prefix
const MAX_PREFIX_LEN: usize = 32;

/// Default prefix, matching a stock WordPress install
pub const DEFAULT_PREFIX: &str = "wp_";

static PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]*$").expect("invalid prefix regex"));

/// Resolved names of the four store tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub layers: String,
    pub maps: String,
    pub markers: String,
    pub rels: String,
}

impl Tables {
    /// Build table names as `<prefix>mmp_<table>`.
    ///
    /// ```
    /// use mapsmarker_server::db::Tables;
    ///
    /// let tables = Tables::with_prefix("wp_").unwrap();
    /// assert_eq!(tables.rels, "wp_mmp_relationships");
    /// assert!(Tables::with_prefix("wp; DROP").is_err());
    /// ```
    pub fn with_prefix(prefix: &str) -> Result<Self, ValidationError> {
        if prefix.len() > MAX_PREFIX_LEN {
            return Err(ValidationError::TooLong {
                field: "table prefix",
                max: MAX_PREFIX_LEN,
            });
        }

        if !PREFIX_RE.is_match(prefix) {
            return Err(ValidationError::InvalidFormat {
                field: "table prefix",
                reason: "must contain only ASCII letters, digits and underscores",
            });
        }

        Ok(Self {
            layers: format!("{prefix}mmp_layers"),
            maps: format!("{prefix}mmp_maps"),
            markers: format!("{prefix}mmp_markers"),
            rels: format!("{prefix}mmp_relationships"),
        })
    }

    /// All table names, in creation order.
    pub fn all(&self) -> [&str; 4] {
        [&self.layers, &self.maps, &self.markers, &self.rels]
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            layers: format!("{DEFAULT_PREFIX}mmp_layers"),
            maps: format!("{DEFAULT_PREFIX}mmp_maps"),
            markers: format!("{DEFAULT_PREFIX}mmp_markers"),
            rels: format!("{DEFAULT_PREFIX}mmp_relationships"),
        }
    }
}
