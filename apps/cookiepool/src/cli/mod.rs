//! # Cookiepool CLI Module
//!
//! This module implements the CLI interface for cookiepool.
//!
//! ## Available Commands
//!
//! - `init` - Create the pool table
//! - `save` - Upsert one record
//! - `query` - Pull random matching records
//! - `count` - Count records (all or live)
//! - `sweep` - Delete expired records once
//! - `watch` - Run the background sweeper for a number of rounds
//! - `demo` - Save, query, sweep and count in one walkthrough

mod commands;

use crate::config;
use clap::{Parser, Subcommand};
use cookiepool_core::{PoolConfig, PoolError};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Cookiepool - TTL-bounded cookie pool
///
/// Producers save session cookies keyed by (province, tax); consumers pull
/// random, still-valid cookies back out.
#[derive(Parser, Debug)]
#[command(name = "cookiepool")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database (overrides config and environment)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Pool table name (overrides config and environment)
    #[arg(short = 'T', long, global = true)]
    pub table: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Identity of a record on the command line.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct KeyArgs {
    /// Province identity field
    #[arg(short, long, default_value = "")]
    pub province: String,

    /// Tax identity field
    #[arg(short, long, default_value = "")]
    pub tax: String,

    /// Auxiliary network address (not part of the fingerprint)
    #[arg(long, default_value = "")]
    pub ip: String,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the pool table if it does not exist
    Init,

    /// Save (upsert) a record
    Save {
        #[command(flatten)]
        key: KeyArgs,

        /// Payload to store (usually a JSON cookie jar)
        #[arg(long)]
        payload: String,

        /// Time to live in seconds (negative stores an already expired record)
        #[arg(long, allow_hyphen_values = true)]
        ttl: Option<i64>,
    },

    /// Query records matching the given fields
    Query {
        #[command(flatten)]
        key: KeyArgs,

        /// Maximum records; 0 or less returns every match
        #[arg(short, long, allow_hyphen_values = true)]
        limit: Option<i64>,

        /// Also return expired records
        #[arg(long)]
        include_expired: bool,
    },

    /// Count records
    Count {
        /// Only count records that are still valid
        #[arg(long)]
        live: bool,
    },

    /// Delete expired records once
    Sweep,

    /// Run the background sweeper
    Watch {
        /// Sweeps to run before exiting
        #[arg(short, long, default_value = "1")]
        rounds: u64,

        /// Milliseconds between sweeps (defaults to the configured interval)
        #[arg(long)]
        interval_ms: Option<u64>,
    },

    /// Walk through save, query, sweep and count
    Demo,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolve the pool configuration for `cli` from file, environment and flags.
pub fn resolve_config(cli: &Cli) -> Result<PoolConfig, PoolError> {
    config::resolve(
        cli.config.as_deref(),
        |key| std::env::var(key).ok(),
        cli.database.as_deref(),
        cli.table.as_deref(),
    )
}

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), PoolError> {
    let config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init) => cmd_init(&config, json_mode),
        Some(Commands::Save { key, payload, ttl }) => {
            cmd_save(&config, json_mode, &key, &payload, ttl)
        }
        Some(Commands::Query {
            key,
            limit,
            include_expired,
        }) => cmd_query(&config, json_mode, &key, limit, include_expired),
        Some(Commands::Count { live }) => cmd_count(&config, json_mode, live),
        Some(Commands::Sweep) => cmd_sweep(&config, json_mode),
        Some(Commands::Watch {
            rounds,
            interval_ms,
        }) => cmd_watch(&config, json_mode, rounds, interval_ms),
        Some(Commands::Demo) => cmd_demo(&config, json_mode),
        None => {
            // No subcommand - show the count by default
            cmd_count(&config, json_mode, false)
        }
    }
}
