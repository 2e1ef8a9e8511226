//! # Cookiepool
//!
//! The main binary for the TTL-bounded cookie pool.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │               apps/cookiepool (THE BINARY)            │
//! │                                                       │
//! │   ┌─────────────┐              ┌──────────────────┐   │
//! │   │    CLI      │              │  Config layers   │   │
//! │   │   (clap)    │◀─────────────│ (toml, env, flag)│   │
//! │   └──────┬──────┘              └──────────────────┘   │
//! │          ▼                                            │
//! │   ┌─────────────────┐                                 │
//! │   │ cookiepool-core │                                 │
//! │   │   (THE POOL)    │                                 │
//! │   └─────────────────┘                                 │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! cookiepool -D pool.db init
//! cookiepool save -p bj -t 123 --payload '{"_ga":"GA1.2.1"}' --ttl 3600
//! cookiepool query -p bj --limit 1
//! cookiepool watch --rounds 10
//! ```

use clap::Parser;
use cookiepool::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // Initialize tracing: COOKIEPOOL_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("COOKIEPOOL_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "cookiepool=debug,cookiepool_core=debug"
    } else {
        "cookiepool=info,cookiepool_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!("cookiepool v{}", env!("CARGO_PKG_VERSION"));
    println!();
}
