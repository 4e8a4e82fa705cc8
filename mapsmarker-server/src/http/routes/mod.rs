//! Route handlers organized by resource

pub mod health;
pub mod layar;
pub mod layers;
pub mod maps;
pub mod markers;

use serde::Serialize;

/// A page of results with the total across all pages
#[derive(Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> Listing<T> {
    /// A listing that holds every row.
    pub fn complete(items: Vec<T>) -> Self {
        let total = items.len() as i64;
        Self { items, total }
    }
}
