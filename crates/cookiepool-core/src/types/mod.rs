//! # Core Type Definitions
//!
//! This module contains the core types of the cookie pool:
//! - The lookup identity of a stored artifact (`IdentityKey`)
//! - One row of the pool (`Record`)
//! - Error types (`PoolError`)
//!
//! ## Identity Fields
//!
//! `province` and `tax` are identity-bearing: they feed the fingerprint,
//! in that order. `ip` is auxiliary: it is stored and may narrow a query,
//! but it never changes the fingerprint.

use crate::fingerprint::{Fingerprint, derive_fingerprint};
use crate::gateway::Row;
use rusqlite::types::Value as SqlValue;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// COLUMN NAMES
// =============================================================================

/// Primary key column.
pub const COL_FINGERPRINT: &str = "fingerprint";
/// Identity column, first in fingerprint order.
pub const COL_PROVINCE: &str = "province";
/// Identity column, second in fingerprint order.
pub const COL_TAX: &str = "tax";
/// Auxiliary column, never fingerprinted.
pub const COL_IP: &str = "ip";
/// Opaque serialized artifact.
pub const COL_PAYLOAD: &str = "payload";
/// Epoch seconds at write time.
pub const COL_VALID_FROM: &str = "valid_from";
/// Epoch seconds after which the record is stale.
pub const COL_VALID_UNTIL: &str = "valid_until";

/// Every column, in table order.
pub const ALL_COLUMNS: [&str; 7] = [
    COL_FINGERPRINT,
    COL_PROVINCE,
    COL_TAX,
    COL_IP,
    COL_PAYLOAD,
    COL_VALID_FROM,
    COL_VALID_UNTIL,
];

// =============================================================================
// IDENTITY KEY
// =============================================================================

/// Lookup identity of a stored artifact.
///
/// Construction never fails: a key with every identity field empty is
/// still a value, it simply cannot be fingerprinted or queried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    province: String,
    tax: String,
    #[serde(default)]
    ip: String,
}

impl IdentityKey {
    /// Create a key from its identity-bearing fields.
    #[must_use]
    pub fn new(province: impl Into<String>, tax: impl Into<String>) -> Self {
        Self {
            province: province.into(),
            tax: tax.into(),
            ip: String::new(),
        }
    }

    /// Attach the auxiliary `ip` field.
    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    #[must_use]
    pub fn province(&self) -> &str {
        &self.province
    }

    #[must_use]
    pub fn tax(&self) -> &str {
        &self.tax
    }

    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Identity-bearing fields in fingerprint order.
    #[must_use]
    pub fn identity_fields(&self) -> [&str; 2] {
        [&self.province, &self.tax]
    }

    /// True if at least one identity-bearing field is non-empty.
    #[must_use]
    pub fn has_identity(&self) -> bool {
        self.identity_fields().iter().any(|f| !f.is_empty())
    }

    /// Derive the fingerprint (primary key) of this key.
    ///
    /// Returns `PoolError::InvalidArgument` when every identity field is empty.
    pub fn fingerprint(&self) -> Result<Fingerprint, PoolError> {
        derive_fingerprint(&self.identity_fields())
    }

    /// Column/value pairs for every non-empty field, usable as equality filters.
    ///
    /// Empty fields are left out entirely; they never mean "match empty".
    #[must_use]
    pub fn filters(&self) -> Vec<(&'static str, &str)> {
        [
            (COL_PROVINCE, self.province.as_str()),
            (COL_TAX, self.tax.as_str()),
            (COL_IP, self.ip.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect()
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// One row of the pool.
///
/// Created by the first save of a fingerprint, fully overwritten by every
/// later save, removed only by the expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key derived from the identity fields.
    pub fingerprint: String,
    pub province: String,
    pub tax: String,
    pub ip: String,
    /// Opaque serialized artifact.
    pub payload: String,
    /// Epoch seconds at write time.
    pub valid_from: i64,
    /// `valid_from + ttl`.
    pub valid_until: i64,
}

impl Record {
    /// Decode a record from a fetched row.
    ///
    /// NULL text columns decode as empty strings.
    pub fn from_row(row: &Row) -> Result<Self, PoolError> {
        Ok(Self {
            fingerprint: text_column(row, COL_FINGERPRINT)?,
            province: text_column(row, COL_PROVINCE)?,
            tax: text_column(row, COL_TAX)?,
            ip: text_column(row, COL_IP)?,
            payload: text_column(row, COL_PAYLOAD)?,
            valid_from: integer_column(row, COL_VALID_FROM)?,
            valid_until: integer_column(row, COL_VALID_UNTIL)?,
        })
    }

    /// Still valid at `now` (the query-side predicate).
    #[must_use]
    pub fn is_live(&self, now: i64) -> bool {
        self.valid_until > now
    }

    /// Eligible for the expiry sweep at `now`.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.valid_until < now
    }

    /// Decode the payload as JSON.
    pub fn payload_json<T: DeserializeOwned>(&self) -> Result<T, PoolError> {
        serde_json::from_str(&self.payload).map_err(|e| {
            PoolError::Decode(format!(
                "payload of {} is not valid JSON: {}",
                self.fingerprint, e
            ))
        })
    }
}

fn text_column(row: &Row, column: &str) -> Result<String, PoolError> {
    match row.get(column) {
        Some(SqlValue::Text(s)) => Ok(s.clone()),
        Some(SqlValue::Null) => Ok(String::new()),
        Some(other) => Err(PoolError::Decode(format!(
            "column {} holds {:?}, expected text",
            column,
            other.data_type()
        ))),
        None => Err(PoolError::Decode(format!("column {} missing", column))),
    }
}

fn integer_column(row: &Row, column: &str) -> Result<i64, PoolError> {
    match row.get(column) {
        Some(SqlValue::Integer(n)) => Ok(*n),
        Some(other) => Err(PoolError::Decode(format!(
            "column {} holds {:?}, expected integer",
            column,
            other.data_type()
        ))),
        None => Err(PoolError::Decode(format!("column {} missing", column))),
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the cookie pool.
///
/// - No silent failures
/// - Any held gate is released before an error reaches the caller
/// - Only connection establishment is ever retried
#[derive(Debug, Error)]
pub enum PoolError {
    /// Malformed or empty identity input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A connection could not be opened and the failure is not transient.
    #[error("Connection error ({target}): {reason}")]
    ConnectionError { target: String, reason: String },

    /// Transient connection failures outlasted the retry budget.
    #[error("Connection attempts exhausted ({target}) after {attempts} attempts: {reason}")]
    ResourceExhausted {
        target: String,
        attempts: u32,
        reason: String,
    },

    /// A statement or its commit failed.
    #[error("Storage error in `{statement}`: {source}")]
    StorageError {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A stored value does not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration is missing, unreadable or out of range.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PoolError {
    /// Wrap a store failure together with the statement that caused it.
    pub fn storage(statement: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::StorageError {
            statement: statement.into(),
            source,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
