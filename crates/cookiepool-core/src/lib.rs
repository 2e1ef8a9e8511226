//! # cookiepool-core
//!
//! The cookie pool engine - THE POOL.
//!
//! A shared, TTL-bounded key-value pool of session artifacts ("cookies")
//! keyed by a content-derived fingerprint and persisted in SQLite.
//! Producer threads save (upsert) records; consumer threads pull random,
//! still-valid records concurrently.
//!
//! ## Layers (leaf first)
//!
//! - `fingerprint` → deterministic key derivation
//! - `gateway` → synchronous CRUD façade over the store, bounded connect retry
//! - `gate` → in-process single-writer / many-reader admission
//! - `pool` → save / query / count on top of gate + gateway
//! - `sweeper` → bulk removal of expired records, optionally on a thread
//!
//! ## Architectural Constraints
//!
//! - NO async: every call blocks the calling thread
//! - Connections are never shared: one per operation, closed on every path
//! - The gate is in-process only; it does not coordinate other processes

// =============================================================================
// MODULES
// =============================================================================

pub mod clock;
pub mod config;
pub mod fingerprint;
pub mod gate;
pub mod gateway;
pub mod pool;
pub mod primitives;
pub mod schema;
pub mod sweeper;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{IdentityKey, PoolError, Record};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PoolConfig, RetryPolicy};
pub use fingerprint::{Fingerprint, derive_fingerprint};
pub use gate::{Gate, GateSnapshot, WriteGuard};
pub use gateway::{
    ConnectionSource, OpenFailure, Row, SqliteSource, Statement, StoreGateway, StoreHandle,
};
pub use pool::CookiePool;
pub use schema::TableName;
pub use sweeper::{ExpirySweeper, SweepStats};
