//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//! Every command opens the pool from the resolved configuration, does its
//! work and drops the pool before returning.

use super::KeyArgs;
use cookiepool_core::{
    CookiePool, ExpirySweeper, IdentityKey, PoolConfig, PoolError, Record, SweepStats,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Shortest pause between sweeper progress checks in `watch`.
const MIN_WATCH_POLL: Duration = Duration::from_millis(1);

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create the pool table if needed.
pub fn cmd_init(config: &PoolConfig, json_mode: bool) -> Result<(), PoolError> {
    let pool = open_pool(config)?;

    if json_mode {
        print_json(&serde_json::json!({
            "database": config.database.to_string_lossy(),
            "table": pool.table().as_str(),
            "initialized": true
        }));
        return Ok(());
    }

    println!(
        "Initialized pool table {} in {:?}",
        pool.table(),
        config.database
    );
    Ok(())
}

// =============================================================================
// SAVE COMMAND
// =============================================================================

/// Upsert one record. Without `--ttl` the configured default TTL applies.
pub fn cmd_save(
    config: &PoolConfig,
    json_mode: bool,
    key: &KeyArgs,
    payload: &str,
    ttl: Option<i64>,
) -> Result<(), PoolError> {
    let pool = open_pool(config)?;
    let identity = identity_key(key);
    let ttl = ttl.unwrap_or(config.default_ttl_secs);
    let affected = pool.save(&identity, payload, ttl)?;
    let fingerprint = identity.fingerprint()?;

    if json_mode {
        print_json(&serde_json::json!({
            "fingerprint": fingerprint.as_str(),
            "ttl_secs": ttl,
            "affected": affected
        }));
        return Ok(());
    }

    println!("Saved {} (ttl {}s)", fingerprint, ttl);
    Ok(())
}

// =============================================================================
// QUERY COMMAND
// =============================================================================

/// Pull matching records, random when limited.
pub fn cmd_query(
    config: &PoolConfig,
    json_mode: bool,
    key: &KeyArgs,
    limit: Option<i64>,
    include_expired: bool,
) -> Result<(), PoolError> {
    let pool = open_pool(config)?;
    let limit = limit.unwrap_or(config.default_limit);
    let records = pool.query(&identity_key(key), limit, !include_expired)?;

    if json_mode {
        print_json(&serde_json::json!({
            "count": records.len(),
            "records": records
        }));
        return Ok(());
    }

    if records.is_empty() {
        println!("No matching records");
        return Ok(());
    }
    let now = pool.now();
    for record in &records {
        print_record(record, now);
    }
    Ok(())
}

// =============================================================================
// COUNT COMMAND
// =============================================================================

/// Count every record, or only the live ones.
pub fn cmd_count(config: &PoolConfig, json_mode: bool, live: bool) -> Result<(), PoolError> {
    let pool = open_pool(config)?;
    let count = if live {
        pool.count_live()?
    } else {
        pool.count()?
    };

    if json_mode {
        print_json(&serde_json::json!({
            "database": config.database.to_string_lossy(),
            "table": pool.table().as_str(),
            "live_only": live,
            "count": count
        }));
        return Ok(());
    }

    println!("Cookie Pool Status");
    println!("==================");
    println!("Database: {:?}", config.database);
    println!("Table:    {}", pool.table());
    println!();
    if live {
        println!("Live records: {}", count);
    } else {
        println!("Records:      {}", count);
    }
    Ok(())
}

// =============================================================================
// SWEEP COMMANDS
// =============================================================================

/// Delete expired records once.
pub fn cmd_sweep(config: &PoolConfig, json_mode: bool) -> Result<(), PoolError> {
    let pool = open_pool(config)?;
    let deleted = pool.sweep_expired()?;

    if json_mode {
        print_json(&serde_json::json!({ "deleted": deleted }));
        return Ok(());
    }

    println!("Swept {} expired record(s)", deleted);
    Ok(())
}

/// Run the background sweeper until it has completed `rounds` sweeps.
pub fn cmd_watch(
    config: &PoolConfig,
    json_mode: bool,
    rounds: u64,
    interval_ms: Option<u64>,
) -> Result<(), PoolError> {
    let pool = Arc::new(open_pool(config)?);
    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.sweep_interval());

    let sweeper = ExpirySweeper::spawn(Arc::clone(&pool), interval)?;
    let poll = (interval / 4).max(MIN_WATCH_POLL);
    while sweeper.stats().runs < rounds {
        std::thread::sleep(poll);
    }
    let stats = sweeper.stop();

    if json_mode {
        print_json(&sweep_stats_json(&stats));
        return Ok(());
    }

    println!(
        "Sweeper ran {} time(s): {} deleted, {} failed",
        stats.runs, stats.deleted, stats.failures
    );
    Ok(())
}

// =============================================================================
// DEMO COMMAND
// =============================================================================

/// Save a cookie jar, read it back by province, sweep and count.
pub fn cmd_demo(config: &PoolConfig, json_mode: bool) -> Result<(), PoolError> {
    let pool = open_pool(config)?;

    let key = IdentityKey::new("bj", "123456789618").with_ip("https://219.151.238.74:4237");
    let mut jar = BTreeMap::new();
    jar.insert("_ga", "GA1.2.1804123924.1563244137");
    jar.insert("session_id", "f3b1c2d4");
    pool.save_json(&key, &jar, config.default_ttl_secs)?;

    let stale = IdentityKey::new("bj", "stale");
    pool.save(&stale, "{}", -1)?;

    let found = pool.query(&IdentityKey::new("bj", ""), 1, true)?;
    let deleted = pool.sweep_expired()?;
    let count = pool.count()?;

    if json_mode {
        print_json(&serde_json::json!({
            "queried": found,
            "swept": deleted,
            "remaining": count
        }));
        return Ok(());
    }

    println!("Cookie Pool Demo");
    println!("================");
    println!("Saved jar for province=bj tax=123456789618, plus one expired record");
    println!();
    let now = pool.now();
    for record in &found {
        print_record(record, now);
    }
    println!();
    println!("Swept:     {}", deleted);
    println!("Remaining: {}", count);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the pool described by `config`, creating its table if needed.
pub fn open_pool(config: &PoolConfig) -> Result<CookiePool, PoolError> {
    CookiePool::open(config)
}

/// Identity key from command-line fields.
pub fn identity_key(args: &KeyArgs) -> IdentityKey {
    IdentityKey::new(args.province.as_str(), args.tax.as_str()).with_ip(args.ip.as_str())
}

/// JSON shape of sweeper counters.
pub fn sweep_stats_json(stats: &SweepStats) -> serde_json::Value {
    serde_json::json!({
        "runs": stats.runs,
        "deleted": stats.deleted,
        "failures": stats.failures
    })
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn print_record(record: &Record, now: i64) {
    let remaining = record.valid_until.saturating_sub(now);
    println!("{}", record.fingerprint);
    println!("  province: {}", record.province);
    println!("  tax:      {}", record.tax);
    if !record.ip.is_empty() {
        println!("  ip:       {}", record.ip);
    }
    if remaining > 0 {
        println!("  expires:  in {}s", remaining);
    } else {
        println!("  expires:  expired {}s ago", remaining.saturating_neg());
    }
    println!("  payload:  {}", record.payload);
}
