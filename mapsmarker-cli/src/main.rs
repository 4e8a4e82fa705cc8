//! mapsmarker CLI - run and maintain the map/marker store
//!
//! Subcommands:
//! - `serve`: HTTP read API and the Layar feed
//! - `schema`: create, upgrade or reset the store tables
//! - `import`: load layers, maps, markers and assignments from a JSON file
//! - `stats`: totals and recent markers
//! - `config`: manage `~/.mapsmarker/config.toml`

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod config;
mod tracing_setup;

use config::MapsmarkerConfig;
use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "mapsmarker",
    author,
    version,
    about = "Map and marker store with a filterable read API and Layar feed"
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Export traces over OTLP (requires the telemetry feature)
    #[arg(long, global = true)]
    otel: bool,

    /// Config file (default: ~/.mapsmarker/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Postgres connection string, overrides [database] url
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),
    /// Create, upgrade or drop the store tables
    Schema(commands::schema::SchemaArgs),
    /// Import layers, maps, markers and assignments from a JSON file
    Import(commands::import::ImportArgs),
    /// Show store totals and recent markers
    Stats(commands::stats::StatsArgs),
    /// Manage mapsmarker configuration (init, show, validate, path)
    Config(config::ConfigArgs),
    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    shell: Shell,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)] // PowerShell is a proper noun, not a suffix
enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_setup::init(&TracingConfig {
        debug: cli.debug,
        otel: cli.otel,
    })?;

    let result = dispatch(cli).await;
    tracing_setup::shutdown_otel();
    result
}

async fn dispatch(cli: Cli) -> Result<()> {
    let path = cli.config.as_deref();

    let command = match cli.command {
        // No database needed
        Commands::Config(args) => return config::run_config(args, path).await,
        Commands::Completions(args) => return run_completions(args),
        command => command,
    };

    let mut config = MapsmarkerConfig::load(path)?;
    if let Some(url) = cli.database_url {
        config.database.url = Some(url);
    }

    match command {
        Commands::Serve(args) => commands::run_serve(args, config).await,
        Commands::Schema(args) => commands::run_schema(args, config).await,
        Commands::Import(args) => commands::run_import(args, config).await,
        Commands::Stats(args) => commands::run_stats(args, config).await,
        Commands::Config(_) | Commands::Completions(_) => Ok(()),
    }
}

fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as CompletionShell};
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    };

    generate(shell, &mut cmd, bin_name, &mut io::stdout());

    Ok(())
}
