//! # Pool Primitives
//!
//! Compiled-in defaults and limits for the cookie pool.
//!
//! Runtime values live in `PoolConfig`; these constants are only the
//! defaults it falls back to and the hard bounds it validates against.

/// Default validity window for a saved record (one hour).
pub const DEFAULT_TTL_SECONDS: i64 = 3600;

/// Default number of records returned by a query.
///
/// A limit `<= 0` means "all matches".
pub const DEFAULT_QUERY_LIMIT: i64 = 1;

/// Default number of connect retries on a transient open failure.
///
/// The total attempt count is `DEFAULT_CONNECT_RETRIES + 1`.
pub const DEFAULT_CONNECT_RETRIES: u32 = 100;

/// Default pause between two connect attempts, in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 10;

/// Default SQLite busy timeout applied to every connection, in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Default table holding the pool.
pub const DEFAULT_TABLE_NAME: &str = "cookies_pool";

/// Default period of the background sweeper, in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length of a table name.
pub const MAX_TABLE_NAME_LENGTH: usize = 64;

/// Maximum connect retries accepted from configuration.
pub const MAX_CONNECT_RETRIES: u32 = 10_000;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_one_hour() {
        assert_eq!(DEFAULT_TTL_SECONDS, 60 * 60);
    }

    #[test]
    fn default_limit_is_single_record() {
        assert_eq!(DEFAULT_QUERY_LIMIT, 1);
    }

    #[test]
    fn default_table_name_fits_limit() {
        assert!(DEFAULT_TABLE_NAME.len() <= MAX_TABLE_NAME_LENGTH);
    }
}
