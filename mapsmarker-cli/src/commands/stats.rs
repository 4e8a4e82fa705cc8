//! Stats command - store totals and the most recent markers

use anyhow::Result;
use clap::Parser;
use serde_json::json;

use mapsmarker_server::FilterOptions;

use crate::config::MapsmarkerConfig;

#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Number of recent markers to list
    #[arg(long, default_value_t = 5)]
    pub recent: u64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run_stats(args: StatsArgs, config: MapsmarkerConfig) -> Result<()> {
    let (pool, store) = config.store().await?;
    let everything = FilterOptions::default();

    let maps = store.maps.count(&everything).await?;
    let markers = store.markers.count(&everything).await?;
    let layers = store.layers.all(&everything).await?;
    let recent = store.markers.all(&FilterOptions::recent(args.recent)).await?;
    pool.close().await;

    if args.json {
        let body = json!({
            "maps": maps,
            "markers": markers,
            "layers": layers.len(),
            "recent_markers": recent,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Maps:    {maps}");
    println!("Markers: {markers}");
    println!(
        "Layers:  {} ({} overlays)",
        layers.len(),
        layers.iter().filter(|l| l.overlay).count()
    );

    if !recent.is_empty() {
        println!("\nRecent markers:");
        for marker in &recent {
            println!(
                "  #{:<6} {:<32} {}  {}",
                marker.id,
                marker.name,
                marker.created_on.format("%Y-%m-%d %H:%M"),
                marker.created_by
            );
        }
    }
    Ok(())
}
