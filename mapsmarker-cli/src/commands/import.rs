//! Import command - load a JSON export into the store
//!
//! Document shape:
//!
//! ```json
//! {
//!   "layers": [{"id": 1, "name": "OSM", "url": "https://..."}],
//!   "maps": [{"id": 3, "name": "Office"}],
//!   "markers": [{"name": "Desk", "lat": 48.2, "lng": 16.3, "zoom": 11}],
//!   "relationships": [{"map_id": 3, "marker_id": 1}]
//! }
//! ```
//!
//! Rows without an `id` get the next sequence value. Sections are imported
//! in order, so relationships may refer to ids created by the same file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use mapsmarker_server::db::{LayerDraft, MapDraft, MarkerDraft};
use mapsmarker_server::models::IdList;
use mapsmarker_server::Store;

use crate::config::MapsmarkerConfig;

#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// JSON file with layers, maps, markers and relationships
    pub file: PathBuf,

    /// Geocode markers that have an address, replacing their coordinates
    #[arg(long)]
    pub geocode: bool,

    /// Parse and summarize the file without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImportDocument {
    layers: Vec<Row<LayerDraft>>,
    maps: Vec<Row<MapDraft>>,
    markers: Vec<Row<MarkerDraft>>,
    relationships: Vec<Assignment>,
}

#[derive(Debug, Deserialize)]
struct Row<T> {
    #[serde(default)]
    id: Option<i32>,
    #[serde(flatten)]
    draft: T,
}

impl<T> Row<T> {
    fn into_pair(self) -> (Option<i32>, T) {
        (self.id, self.draft)
    }
}

#[derive(Debug, Deserialize)]
struct Assignment {
    map_id: i64,
    marker_id: i64,
}

/// Totals written by an import.
#[derive(Debug, Default, PartialEq, Eq)]
struct ImportSummary {
    layers: usize,
    maps: usize,
    markers: usize,
    relationships: u64,
}

impl ImportDocument {
    fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Invalid import document")
    }

    /// Marker ids per map, in map order.
    fn assignments(&self) -> BTreeMap<i64, IdList> {
        let mut grouped: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for rel in &self.relationships {
            grouped
                .entry(rel.map_id)
                .or_default()
                .push(rel.marker_id.to_string());
        }
        grouped
            .into_iter()
            .map(|(map_id, markers)| (map_id, IdList::new(markers)))
            .collect()
    }
}

pub async fn run_import(args: ImportArgs, config: MapsmarkerConfig) -> Result<()> {
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let document = ImportDocument::parse(&content)?;

    if args.dry_run {
        println!(
            "{}: {} layers, {} maps, {} markers, {} relationships",
            args.file.display(),
            document.layers.len(),
            document.maps.len(),
            document.markers.len(),
            document.relationships.len()
        );
        return Ok(());
    }

    let (pool, store) = config.store().await?;
    let summary = import(&store, document, args.geocode).await?;
    pool.close().await;

    tracing::info!(file = %args.file.display(), ?summary, "import finished");
    println!(
        "Imported {} layers, {} maps, {} markers, {} relationships",
        summary.layers, summary.maps, summary.markers, summary.relationships
    );
    Ok(())
}

async fn import(store: &Store, document: ImportDocument, geocode: bool) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let assignments = document.assignments();

    if !document.layers.is_empty() {
        let rows: Vec<_> = document.layers.into_iter().map(Row::into_pair).collect();
        summary.layers = store.layers.add_bulk(&rows).await.context("Failed to import layers")?.len();
    }

    if !document.maps.is_empty() {
        let rows: Vec<_> = document.maps.into_iter().map(Row::into_pair).collect();
        summary.maps = store.maps.add_bulk(&rows).await.context("Failed to import maps")?.len();
    }

    if geocode {
        // One lookup per marker; markers without an address keep their coordinates.
        for Row { id, draft } in document.markers {
            let lookup = !draft.address.trim().is_empty();
            store
                .markers
                .add(&draft, lookup, id)
                .await
                .with_context(|| format!("Failed to import marker {:?}", draft.name))?;
            summary.markers += 1;
        }
    } else if !document.markers.is_empty() {
        let rows: Vec<_> = document.markers.into_iter().map(Row::into_pair).collect();
        summary.markers = store.markers.add_bulk(&rows).await.context("Failed to import markers")?.len();
    }

    for (map_id, markers) in assignments {
        summary.relationships += store
            .relationships
            .assign_markers(map_id, &markers)
            .await
            .with_context(|| format!("Failed to assign markers to map {map_id}"))?;
    }

    Ok(summary)
}
