//! # cookiepool
//!
//! Command-line front end for `cookiepool-core`.
//!
//! - `cli` → clap definitions and command implementations
//! - `config` → layered configuration (TOML file, environment, flags)

pub mod cli;
pub mod config;
