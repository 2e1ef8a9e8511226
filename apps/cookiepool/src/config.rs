//! # Configuration Loading
//!
//! Layers, lowest precedence first:
//!
//! 1. `PoolConfig::default()`
//! 2. `[pool]` table of an optional TOML file (`--config`)
//! 3. `COOKIEPOOL_*` environment variables
//! 4. command-line flags (`-D`, `-T`)
//!
//! ```toml
//! [pool]
//! database = "/var/lib/cookiepool/pool.db"
//! table = "cookies_pool"
//! connect_retries = 100
//! retry_delay_ms = 10
//! ```

use cookiepool_core::{PoolConfig, PoolError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Overrides `PoolConfig::database`.
pub const ENV_DATABASE: &str = "COOKIEPOOL_DATABASE";
/// Overrides `PoolConfig::table`.
pub const ENV_TABLE: &str = "COOKIEPOOL_TABLE";
/// Overrides `PoolConfig::connect_retries`.
pub const ENV_CONNECT_RETRIES: &str = "COOKIEPOOL_CONNECT_RETRIES";

/// Maximum configuration file size (64 KB).
const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024;

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    pool: PoolConfig,
}

/// Parse the TOML text of a configuration file.
pub fn parse_config(text: &str) -> Result<PoolConfig, PoolError> {
    let file: ConfigFile =
        toml::from_str(text).map_err(|e| PoolError::Config(format!("invalid TOML: {}", e)))?;
    Ok(file.pool)
}

/// Read and parse a configuration file.
pub fn load_file(path: &Path) -> Result<PoolConfig, PoolError> {
    let metadata = std::fs::metadata(path).map_err(|e| {
        PoolError::Config(format!("cannot read config '{}': {}", path.display(), e))
    })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(PoolError::Config(format!(
            "config '{}' is {} bytes, maximum is {}",
            path.display(),
            metadata.len(),
            MAX_CONFIG_FILE_SIZE
        )));
    }
    let text = std::fs::read_to_string(path).map_err(|e| {
        PoolError::Config(format!("cannot read config '{}': {}", path.display(), e))
    })?;
    parse_config(&text)
}

/// Apply `COOKIEPOOL_*` overrides found through `lookup`.
///
/// `lookup` is `|key| std::env::var(key).ok()` in the binary.
pub fn apply_env<F>(config: &mut PoolConfig, lookup: F) -> Result<(), PoolError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(database) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
        config.database = PathBuf::from(database);
    }
    if let Some(table) = lookup(ENV_TABLE).filter(|v| !v.is_empty()) {
        config.table = table;
    }
    if let Some(retries) = lookup(ENV_CONNECT_RETRIES).filter(|v| !v.is_empty()) {
        config.connect_retries = retries.trim().parse().map_err(|e| {
            PoolError::Config(format!("{}={:?} is not a count: {}", ENV_CONNECT_RETRIES, retries, e))
        })?;
    }
    Ok(())
}

/// Build the effective configuration from every layer and validate it.
pub fn resolve<F>(
    file: Option<&Path>,
    lookup: F,
    database: Option<&Path>,
    table: Option<&str>,
) -> Result<PoolConfig, PoolError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match file {
        Some(path) => load_file(path)?,
        None => PoolConfig::default(),
    };
    apply_env(&mut config, lookup)?;
    if let Some(database) = database {
        config.database = database.to_path_buf();
    }
    if let Some(table) = table {
        config.table = table.to_string();
    }
    config.validate()?;
    tracing::debug!(database = %config.database.display(), table = %config.table, "configuration resolved");
    Ok(config)
}
