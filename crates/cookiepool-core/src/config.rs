//! # Pool Configuration
//!
//! Explicit configuration values handed to the pool and its gateway.
//! Nothing here is process-wide: two pools in one process may use
//! different retry budgets.
//!
//! Every field has a default, so a partial TOML document deserializes.

use crate::PoolError;
use crate::primitives::{
    DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_CONNECT_RETRIES, DEFAULT_QUERY_LIMIT, DEFAULT_RETRY_DELAY_MS,
    DEFAULT_SWEEP_INTERVAL_SECS, DEFAULT_TABLE_NAME, DEFAULT_TTL_SECONDS, MAX_CONNECT_RETRIES,
};
use crate::schema::TableName;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// RETRY POLICY
// =============================================================================

/// Bounded retry for transient connection failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// No retries at all: the first transient failure is final.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Total number of attempts this policy allows.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONNECT_RETRIES,
            Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        )
    }
}

// =============================================================================
// POOL CONFIG
// =============================================================================

/// Configuration of a `CookiePool`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Table holding the pool.
    pub table: String,
    /// Connect retries on transient failure.
    pub connect_retries: u32,
    /// Pause between connect attempts.
    pub retry_delay_ms: u64,
    /// SQLite busy timeout per connection.
    pub busy_timeout_ms: u64,
    /// TTL used when the caller does not give one.
    pub default_ttl_secs: i64,
    /// Query limit used when the caller does not give one.
    pub default_limit: i64,
    /// Period of the background sweeper.
    pub sweep_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("cookiepool.db"),
            table: DEFAULT_TABLE_NAME.to_string(),
            connect_retries: DEFAULT_CONNECT_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            default_ttl_secs: DEFAULT_TTL_SECONDS,
            default_limit: DEFAULT_QUERY_LIMIT,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl PoolConfig {
    /// Default configuration pointing at `database`.
    #[must_use]
    pub fn for_database(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Check ranges and the table name.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.database.as_os_str().is_empty() {
            return Err(PoolError::Config("database path is empty".to_string()));
        }
        TableName::parse(&self.table).map_err(|e| PoolError::Config(e.to_string()))?;
        if self.connect_retries > MAX_CONNECT_RETRIES {
            return Err(PoolError::Config(format!(
                "connect_retries {} exceeds maximum {}",
                self.connect_retries, MAX_CONNECT_RETRIES
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(PoolError::Config(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// The retry policy described by this configuration.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connect_retries,
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn default_policy_allows_101_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts(), 101);
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }

    #[test]
    fn bad_table_name_is_config_error() {
        let config = PoolConfig {
            table: "cookies; DROP TABLE x".to_string(),
            ..PoolConfig::default()
        };
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn retry_ceiling_enforced() {
        let config = PoolConfig {
            connect_retries: MAX_CONNECT_RETRIES + 1,
            ..PoolConfig::default()
        };
        assert!(matches!(config.validate(), Err(PoolError::Config(_))));
    }

    #[test]
    fn zero_sweep_interval_rejected() {
        let config = PoolConfig {
            sweep_interval_secs: 0,
            ..PoolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn policy_follows_config() {
        let config = PoolConfig {
            connect_retries: 3,
            retry_delay_ms: 25,
            ..PoolConfig::for_database("x.db")
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.delay, Duration::from_millis(25));
    }
}
