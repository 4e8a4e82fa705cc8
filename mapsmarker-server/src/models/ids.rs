//! Identifier coercion and sanitized id lists
//!
//! Every id that reaches a query goes through [`sanitize_ids`]: items are
//! coerced to absolute integers, zeros and out-of-range values are dropped,
//! duplicates removed and the result sorted ascending.

use serde::{Deserialize, Deserializer};

use super::ValidationError;

/// Coerce a loosely formatted string to an absolute integer.
///
/// Leading whitespace and an optional sign are accepted, then the longest
/// run of ASCII digits. Anything without leading digits yields 0, so
/// `"abc"` and `""` become 0 while `"-7"` becomes 7 and `"12px"` becomes 12.
pub fn absint(raw: &str) -> u64 {
    let s = raw.trim_start();
    let s = s.strip_prefix(['-', '+']).unwrap_or(s);

    s.bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, d| {
            acc.saturating_mul(10).saturating_add(u64::from(d - b'0'))
        })
}

/// Sanitize a sequence of raw ids into unique, positive, ascending ids.
///
/// ```
/// use mapsmarker_server::models::sanitize_ids;
///
/// assert_eq!(sanitize_ids(["3", "3", "abc", "0", "5"]), vec![3, 5]);
/// ```
pub fn sanitize_ids<I, S>(items: I) -> Vec<i32>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut ids: Vec<i32> = items
        .into_iter()
        .map(|item| absint(item.as_ref()))
        .filter_map(|value| i32::try_from(value).ok())
        .filter(|&id| id > 0)
        .collect();

    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Sanitize a comma-separated id string (`"4,2,,x,2"` -> `[2, 4]`).
pub fn sanitize_csv(csv: &str) -> Vec<i32> {
    sanitize_ids(csv.split(','))
}

/// Check that a single id is a positive integer that fits the id column.
pub fn positive_id(field: &'static str, value: i64) -> Result<i32, ValidationError> {
    i32::try_from(value)
        .ok()
        .filter(|&id| id > 0)
        .ok_or(ValidationError::InvalidId { field, value })
}

/// A sanitized list of ids.
///
/// Deserializes from a comma-separated string, a single number, or a
/// sequence of numbers and/or strings, always applying [`sanitize_ids`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdList(Vec<i32>);

impl IdList {
    /// Build a list from raw items, sanitizing them.
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(sanitize_ids(items))
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_vec(self) -> Vec<i32> {
        self.0
    }
}

impl From<&[i32]> for IdList {
    fn from(ids: &[i32]) -> Self {
        Self::new(ids.iter().map(|id| id.to_string()))
    }
}

impl From<Vec<i32>> for IdList {
    fn from(ids: Vec<i32>) -> Self {
        Self::from(ids.as_slice())
    }
}

impl From<&str> for IdList {
    fn from(csv: &str) -> Self {
        Self(sanitize_csv(csv))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(i64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Num(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIds {
    One(RawId),
    Many(Vec<RawId>),
}

impl<'de> Deserialize<'de> for IdList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ids = match RawIds::deserialize(deserializer)? {
            RawIds::One(RawId::Text(csv)) => sanitize_csv(&csv),
            RawIds::One(RawId::Num(n)) => sanitize_ids([n.to_string()]),
            RawIds::Many(items) => sanitize_ids(items.into_iter().map(RawId::into_string)),
        };
        Ok(Self(ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absint_coercion() {
        assert_eq!(absint("42"), 42);
        assert_eq!(absint("  7"), 7);
        assert_eq!(absint("-7"), 7);
        assert_eq!(absint("12px"), 12);
        assert_eq!(absint("abc"), 0);
        assert_eq!(absint(""), 0);
        assert_eq!(absint("99999999999999999999999"), u64::MAX);
    }

    #[test]
    fn sanitize_drops_duplicates_zeros_and_garbage() {
        assert_eq!(sanitize_ids(["3", "3", "abc", "0", "5"]), vec![3, 5]);
    }

    #[test]
    fn sanitize_sorts_ascending() {
        assert_eq!(sanitize_ids(["10", "2", "-1", "33"]), vec![1, 2, 10, 33]);
    }

    #[test]
    fn sanitize_drops_out_of_range() {
        assert_eq!(sanitize_ids(["2147483648", "2147483647"]), vec![i32::MAX]);
    }

    #[test]
    fn sanitize_csv_string() {
        assert_eq!(sanitize_csv("4,2,,x,2"), vec![2, 4]);
        assert!(sanitize_csv("").is_empty());
    }

    #[test]
    fn positive_id_rejects_zero_and_negative() {
        assert_eq!(positive_id("id", 9), Ok(9));
        assert!(positive_id("id", 0).is_err());
        assert!(positive_id("id", -3).is_err());
        assert!(positive_id("id", i64::from(i32::MAX) + 1).is_err());
    }

    #[test]
    fn id_list_from_json_shapes() {
        let list: IdList = serde_json::from_value(serde_json::json!("5,1,5")).unwrap();
        assert_eq!(list.as_slice(), &[1, 5]);

        let list: IdList = serde_json::from_value(serde_json::json!(8)).unwrap();
        assert_eq!(list.as_slice(), &[8]);

        let list: IdList =
            serde_json::from_value(serde_json::json!(["3", "3", "abc", "0", 5])).unwrap();
        assert_eq!(list.as_slice(), &[3, 5]);
    }
}
