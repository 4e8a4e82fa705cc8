//! Configuration: `~/.mapsmarker/config.toml`, `.env` files and environment
//!
//! Precedence, lowest first: built-in defaults, the TOML file, environment
//! variables (`DATABASE_URL`, `MAPSMARKER_TABLE_PREFIX`), command-line flags.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use mapsmarker_server::db::pool::{DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_MAX_CONNECTIONS};
use mapsmarker_server::services::{
    DisabledGeocoder, Geocoder, NominatimGeocoder, TracingTranslations,
};
use mapsmarker_server::{create_pool_with_options, LayarSettings, PoolSettings, Store, Tables};

/// Full CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapsmarkerConfig {
    pub database: DatabaseConfig,
    pub server: ServerSection,
    pub layar: LayarSettings,
    pub geocoding: GeocodingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection string; usually left to DATABASE_URL
    pub url: Option<String>,
    pub max_connections: u32,
    /// Seconds to wait for a free connection
    pub acquire_timeout_secs: u64,
    /// Seconds before an idle connection is closed; 0 keeps them open
    pub idle_timeout_secs: u64,
    /// Prefix for the store's table names
    pub table_prefix: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT.as_secs(),
            idle_timeout_secs: 600,
            table_prefix: mapsmarker_server::db::tables::DEFAULT_PREFIX.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: SocketAddr,
    pub cors_permissive: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3030)),
            cors_permissive: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocodingProvider {
    #[default]
    Disabled,
    Nominatim,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub provider: GeocodingProvider,
    pub endpoint: String,
    pub user_agent: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            provider: GeocodingProvider::Disabled,
            endpoint: "https://nominatim.openstreetmap.org".to_owned(),
            user_agent: concat!("mapsmarker/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl MapsmarkerConfig {
    /// Default config location: ~/.mapsmarker/config.toml
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mapsmarker/config.toml")
    }

    /// Load `.env` files, the config file and environment overrides.
    ///
    /// An explicit `path` must exist; the default path may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        load_dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    tracing::debug!(path = %path.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file (invalid TOML): {}", path.display()))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.database.url = Some(url);
        }
        if let Some(prefix) = var("MAPSMARKER_TABLE_PREFIX") {
            self.database.table_prefix = prefix;
        }
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database.url.as_deref().context(
            "DATABASE_URL not set. Set via --database-url, DATABASE_URL env, \
             ~/.mapsmarker/.env or [database] url in the config file",
        )
    }

    pub fn tables(&self) -> Result<Tables> {
        Tables::with_prefix(&self.database.table_prefix)
            .with_context(|| format!("Invalid table prefix {:?}", self.database.table_prefix))
    }

    pub fn pool_settings(&self) -> PoolSettings {
        let idle = self.database.idle_timeout_secs;
        PoolSettings {
            max_connections: self.database.max_connections,
            acquire_timeout: Duration::from_secs(self.database.acquire_timeout_secs),
            idle_timeout: (idle > 0).then(|| Duration::from_secs(idle)),
        }
    }

    pub async fn pool(&self) -> Result<PgPool> {
        let url = self.database_url()?;
        create_pool_with_options(url, &self.pool_settings())
            .await
            .context("Failed to create database pool")
    }

    pub fn geocoder(&self) -> Result<Arc<dyn Geocoder>> {
        let geocoder: Arc<dyn Geocoder> = match self.geocoding.provider {
            GeocodingProvider::Disabled => Arc::new(DisabledGeocoder),
            GeocodingProvider::Nominatim => Arc::new(
                NominatimGeocoder::new(self.geocoding.endpoint.clone(), &self.geocoding.user_agent)
                    .context("Failed to build geocoding client")?,
            ),
        };
        Ok(geocoder)
    }

    /// Connect and build every repository.
    pub async fn store(&self) -> Result<(PgPool, Store)> {
        let tables = self.tables()?;
        let pool = self.pool().await?;
        let store = Store::new(
            pool.clone(),
            tables,
            self.geocoder()?,
            Arc::new(TracingTranslations),
        );
        Ok((pool, store))
    }
}

/// Load `~/.mapsmarker/.env`, then `.env` in the working directory.
///
/// Variables already set are never overridden.
fn load_dotenv() {
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".mapsmarker/.env"));
    }
    let _ = dotenvy::dotenv();
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write a config file with default values
    Init(InitArgs),
    /// Print the effective configuration as TOML
    Show,
    /// Check the table prefix and database connection
    Validate,
    /// Show config file path
    Path,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Force overwrite existing config
    #[arg(long, short)]
    pub force: bool,
}

pub async fn run_config(args: ConfigArgs, path: Option<&Path>) -> Result<()> {
    match args.command {
        ConfigCommands::Init(args) => run_init(args, path),
        ConfigCommands::Show => run_show(path),
        ConfigCommands::Validate => run_validate(path).await,
        ConfigCommands::Path => {
            let path = path.map(Path::to_path_buf).unwrap_or_else(MapsmarkerConfig::default_path);
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn run_init(args: InitArgs, path: Option<&Path>) -> Result<()> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(MapsmarkerConfig::default_path);

    if config_path.exists() && !args.force {
        bail!(
            "Config already exists at {}\n\nUse --force to overwrite",
            config_path.display()
        );
    }
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let content = toml::to_string_pretty(&MapsmarkerConfig::default())
        .context("Failed to serialize config to TOML")?;
    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

    println!("Created config at: {}", config_path.display());
    println!("\nNext steps:");
    println!("  1. Set DATABASE_URL (environment or ~/.mapsmarker/.env)");
    println!("  2. Run: mapsmarker schema migrate");
    println!("  3. Run: mapsmarker serve");
    Ok(())
}

fn run_show(path: Option<&Path>) -> Result<()> {
    let mut config = MapsmarkerConfig::load(path)?;
    if config.database.url.is_some() {
        config.database.url = Some("<set>".to_owned());
    }
    let toml_str = toml::to_string_pretty(&config).context("Failed to serialize config to TOML")?;
    println!("{}", toml_str);
    Ok(())
}

async fn run_validate(path: Option<&Path>) -> Result<()> {
    let config = MapsmarkerConfig::load(path)?;
    let tables = config.tables()?;
    println!("   ✓ Table prefix ok ({})", tables.maps);

    config.geocoder()?;
    println!("   ✓ Geocoding: {:?}", config.geocoding.provider);

    let pool = config.pool().await?;
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("Database did not answer")?;
    println!("   ✓ Database reachable");

    println!("\nConfiguration valid!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[database]
table_prefix = "site2_"

[layar]
units = "miles"
icons = "layar_custom"
"#
        )
        .unwrap();

        let config = MapsmarkerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database.table_prefix, "site2_");
        assert_eq!(config.database.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.layar.radius, 1000);
        assert_eq!(config.server.bind.port(), 3030);
        assert_eq!(config.geocoding.provider, GeocodingProvider::Disabled);
        assert_eq!(config.tables().unwrap().maps, "site2_mmp_maps");
    }

    #[test]
    fn pool_settings_follow_database_section() {
        let config: MapsmarkerConfig = toml::from_str(
            r#"
[database]
max_connections = 20
acquire_timeout_secs = 2
idle_timeout_secs = 0
"#,
        )
        .unwrap();

        let settings = config.pool_settings();
        assert_eq!(settings.max_connections, 20);
        assert_eq!(settings.acquire_timeout, Duration::from_secs(2));
        assert_eq!(settings.idle_timeout, None);
        assert_eq!(MapsmarkerConfig::default().pool_settings(), PoolSettings::default());
    }

    #[test]
    fn defaults_round_trip_through_toml() {
        let text = toml::to_string_pretty(&MapsmarkerConfig::default()).unwrap();
        let parsed: MapsmarkerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, MapsmarkerConfig::default());
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://db/maps"),
            ("MAPSMARKER_TABLE_PREFIX", "x_"),
        ]
        .into_iter()
        .collect();

        let mut config = MapsmarkerConfig::default();
        config.database.url = Some("postgres://file/maps".into());
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database_url().unwrap(), "postgres://db/maps");
        assert_eq!(config.database.table_prefix, "x_");
    }

    #[test]
    fn default_geocoding_endpoint_targets_search() {
        let geocoding = GeocodingConfig::default();
        let geocoder = NominatimGeocoder::new(geocoding.endpoint, &geocoding.user_agent).unwrap();
        assert_eq!(geocoder.search_url(), "https://nominatim.openstreetmap.org/search");
    }

    #[test]
    fn bad_prefix_is_reported() {
        let mut config = MapsmarkerConfig::default();
        config.database.table_prefix = "wp; drop".into();
        assert!(config.tables().is_err());
    }

    #[test]
    fn missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MapsmarkerConfig::load(Some(dir.path().join("absent.toml").as_path())).is_err());
    }
}
