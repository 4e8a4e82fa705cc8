//! Schema command - create, upgrade and reset the store tables

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use mapsmarker_server::db::schema;

use crate::config::MapsmarkerConfig;

#[derive(Parser, Debug)]
pub struct SchemaArgs {
    #[command(subcommand)]
    pub command: SchemaCommand,
}

#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// Create missing tables and indexes
    Create,
    /// Apply column upgrades to existing tables
    Upgrade,
    /// Create, then upgrade (what `serve` runs on start)
    Migrate,
    /// Drop all store tables
    Drop {
        /// Confirm that every map, marker and layer is deleted
        #[arg(long)]
        yes: bool,
    },
    /// Drop and recreate all store tables
    Reset {
        /// Confirm that every map, marker and layer is deleted
        #[arg(long)]
        yes: bool,
    },
    /// Print the CREATE statements without running them
    Print,
}

pub async fn run_schema(args: SchemaArgs, config: MapsmarkerConfig) -> Result<()> {
    let tables = config.tables()?;

    if let SchemaCommand::Print = args.command {
        for statement in schema::create_statements(&tables) {
            println!("{};", statement.trim());
        }
        return Ok(());
    }
    if let SchemaCommand::Drop { yes: false } | SchemaCommand::Reset { yes: false } = args.command {
        bail!(
            "Refusing to drop {} without --yes",
            tables.all().join(", ")
        );
    }

    let pool = config.pool().await?;
    let result = match args.command {
        SchemaCommand::Create => schema::create_tables(&pool, &tables).await,
        SchemaCommand::Upgrade => schema::upgrade_tables(&pool, &tables).await,
        SchemaCommand::Migrate => schema::migrate(&pool, &tables).await,
        SchemaCommand::Drop { .. } => schema::drop_tables(&pool, &tables).await,
        SchemaCommand::Reset { .. } => schema::reset_tables(&pool, &tables).await,
        SchemaCommand::Print => Ok(()),
    };
    result.context("Schema change failed")?;

    pool.close().await;
    println!("Done.");
    Ok(())
}
