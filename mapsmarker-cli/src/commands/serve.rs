//! HTTP server command
//!
//! Migrates the store tables, then serves the read API and the Layar feed.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;

use mapsmarker_server::db::schema;
use mapsmarker_server::http::{run_server, AppState, ServerConfig};

use crate::config::MapsmarkerConfig;

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default: [server] bind, else 127.0.0.1:3030)
    #[arg(long, short = 'b')]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Skip creating and upgrading tables on start
    #[arg(long)]
    pub no_migrate: bool,
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs, config: MapsmarkerConfig) -> Result<()> {
    let server = ServerConfig {
        bind_addr: args.bind.unwrap_or(config.server.bind),
        cors_permissive: args.cors_permissive || config.server.cors_permissive,
    };

    let (pool, store) = config.store().await?;
    if !args.no_migrate {
        schema::migrate(&pool, &config.tables()?)
            .await
            .context("Failed to migrate store tables")?;
    }

    tracing::info!(
        bind = %server.bind_addr,
        prefix = %config.database.table_prefix,
        geocoding = ?config.geocoding.provider,
        "Starting mapsmarker server"
    );

    let state = AppState {
        pool,
        store,
        layar: config.layar,
    };

    // Blocks until shutdown
    run_server(state, server).await.context("Server error")?;

    Ok(())
}
