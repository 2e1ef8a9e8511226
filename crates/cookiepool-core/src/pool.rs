//! # Record Pool
//!
//! The public face of the crate: save (upsert) and query (filtered random
//! select) over the store, admitted by the `Gate`.
//!
//! ## Protocol
//!
//! - `save`, `sweep_expired`: write admission, released on every exit path
//! - `query`, `count`, `count_live`: read admission (checked at entry only)
//! - each operation opens its own store connection and closes it before
//!   returning
//!
//! The upsert is update-then-insert-on-miss. Two writers can never race
//! on the same fingerprint because the gate admits one writer at a time.

use crate::clock::{Clock, SystemClock};
use crate::config::PoolConfig;
use crate::gate::{Gate, GateSnapshot};
use crate::gateway::{Statement, StoreGateway};
use crate::primitives::{DEFAULT_QUERY_LIMIT, DEFAULT_TTL_SECONDS};
use crate::schema::{TableName, ensure_table};
use crate::sweeper;
use crate::types::{
    ALL_COLUMNS, COL_FINGERPRINT, COL_IP, COL_PAYLOAD, COL_PROVINCE, COL_TAX, COL_VALID_FROM,
    COL_VALID_UNTIL,
};
use crate::{IdentityKey, PoolError, Record};
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// A TTL-bounded pool of cookies shared by producer and consumer threads.
///
/// `CookiePool` is `Send + Sync`; share it with `Arc`.
pub struct CookiePool {
    gateway: StoreGateway,
    gate: Gate,
    table: TableName,
    clock: Arc<dyn Clock>,
    default_ttl_secs: i64,
    default_limit: i64,
}

impl fmt::Debug for CookiePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookiePool")
            .field("table", &self.table)
            .field("gateway", &self.gateway)
            .field("gate", &self.gate.snapshot())
            .finish_non_exhaustive()
    }
}

impl CookiePool {
    /// Open the pool described by `config`, creating its table if needed.
    pub fn open(config: &PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let gateway = StoreGateway::sqlite(
            &config.database,
            config.busy_timeout(),
            config.retry_policy(),
        );
        let table = TableName::parse(&config.table)?;
        let pool = Self::with_gateway(gateway, table, Arc::new(SystemClock))?;
        Ok(pool.with_defaults(config.default_ttl_secs, config.default_limit))
    }

    /// Build a pool over an existing gateway and clock.
    ///
    /// Ensures the table exists before returning.
    pub fn with_gateway(
        gateway: StoreGateway,
        table: TableName,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PoolError> {
        ensure_table(&gateway, &table)?;
        tracing::debug!(table = %table, target_db = %gateway.target(), "cookie pool ready");
        Ok(Self {
            gateway,
            gate: Gate::new(),
            table,
            clock,
            default_ttl_secs: DEFAULT_TTL_SECONDS,
            default_limit: DEFAULT_QUERY_LIMIT,
        })
    }

    /// Override the TTL and limit used by `save_default` / `query_default`.
    #[must_use]
    pub fn with_defaults(mut self, ttl_secs: i64, limit: i64) -> Self {
        self.default_ttl_secs = ttl_secs;
        self.default_limit = limit;
        self
    }

    #[must_use]
    pub fn table(&self) -> &TableName {
        &self.table
    }

    #[must_use]
    pub fn gate_snapshot(&self) -> GateSnapshot {
        self.gate.snapshot()
    }

    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    // =========================================================================
    // WRITE SIDE
    // =========================================================================

    /// Upsert the record for `key` with a fresh validity window.
    ///
    /// A second save for the same fingerprint overwrites payload and window;
    /// nothing is merged. `ttl_seconds` may be negative (already expired).
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `key` has no identity field
    /// - connection / storage errors, after the gate is released
    pub fn save(
        &self,
        key: &IdentityKey,
        payload: &str,
        ttl_seconds: i64,
    ) -> Result<usize, PoolError> {
        let fingerprint = key.fingerprint()?;
        let _admission = self.gate.acquire_write();

        let valid_from = self.clock.now();
        let valid_until = valid_from.saturating_add(ttl_seconds);

        let update = Statement::new(format!(
            "UPDATE {t} SET {province} = ?1, {tax} = ?2, {ip} = ?3, {payload} = ?4, \
             {from} = ?5, {until} = ?6 WHERE {fp} = ?7",
            t = self.table.quoted(),
            province = COL_PROVINCE,
            tax = COL_TAX,
            ip = COL_IP,
            payload = COL_PAYLOAD,
            from = COL_VALID_FROM,
            until = COL_VALID_UNTIL,
            fp = COL_FINGERPRINT,
        ))
        .bind(key.province().to_string())
        .bind(key.tax().to_string())
        .bind(key.ip().to_string())
        .bind(payload.to_string())
        .bind(valid_from)
        .bind(valid_until)
        .bind(fingerprint.to_string());

        let affected = self.gateway.with_connection(|handle| {
            let updated = handle.execute(&update)?;
            if updated > 0 {
                return Ok(updated);
            }
            let insert = Statement::new(format!(
                "INSERT INTO {t} ({columns}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                t = self.table.quoted(),
                columns = ALL_COLUMNS.join(", "),
            ))
            .bind(fingerprint.to_string())
            .bind(key.province().to_string())
            .bind(key.tax().to_string())
            .bind(key.ip().to_string())
            .bind(payload.to_string())
            .bind(valid_from)
            .bind(valid_until);
            handle.execute(&insert)
        })?;

        tracing::debug!(fingerprint = %fingerprint, valid_until, affected, "record saved");
        Ok(affected)
    }

    /// `save` with the pool's default TTL.
    pub fn save_default(&self, key: &IdentityKey, payload: &str) -> Result<usize, PoolError> {
        self.save(key, payload, self.default_ttl_secs)
    }

    /// `save` with any serializable payload, stored as JSON.
    pub fn save_json<T: Serialize + ?Sized>(
        &self,
        key: &IdentityKey,
        payload: &T,
        ttl_seconds: i64,
    ) -> Result<usize, PoolError> {
        let text = serde_json::to_string(payload)
            .map_err(|e| PoolError::InvalidArgument(format!("payload is not serializable: {}", e)))?;
        self.save(key, &text, ttl_seconds)
    }

    /// Delete every record whose window ended before now. Returns rows deleted.
    pub fn sweep_expired(&self) -> Result<usize, PoolError> {
        let _admission = self.gate.acquire_write();
        let now = self.clock.now();
        let deleted = self
            .gateway
            .execute(&sweeper::expired_records_statement(&self.table, now))?;
        tracing::info!(table = %self.table, now, deleted, "expired records swept");
        Ok(deleted)
    }

    // =========================================================================
    // READ SIDE
    // =========================================================================

    /// Fetch records matching every non-empty field of `key`.
    ///
    /// - `limit > 0`: at most `limit` records, sampled uniformly at random
    /// - `limit <= 0`: every match
    /// - `filter_expired`: keep only records with `valid_until > now`
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if neither `province` nor `tax` is set.
    pub fn query(
        &self,
        key: &IdentityKey,
        limit: i64,
        filter_expired: bool,
    ) -> Result<Vec<Record>, PoolError> {
        if !key.has_identity() {
            return Err(PoolError::InvalidArgument(
                "query needs at least one non-empty identity field".to_string(),
            ));
        }
        self.gate.acquire_read();
        let now = self.clock.now();

        let mut clauses = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();
        for (column, value) in key.filters() {
            params.push(SqlValue::Text(value.to_string()));
            clauses.push(format!("{} = ?{}", column, params.len()));
        }
        if filter_expired {
            params.push(SqlValue::Integer(now));
            clauses.push(format!("{} > ?{}", COL_VALID_UNTIL, params.len()));
        }

        let mut sql = format!(
            "SELECT {columns} FROM {t} WHERE {predicate}",
            columns = ALL_COLUMNS.join(", "),
            t = self.table.quoted(),
            predicate = clauses.join(" AND "),
        );
        if limit > 0 {
            params.push(SqlValue::Integer(limit));
            sql.push_str(&format!(" ORDER BY RANDOM() LIMIT ?{}", params.len()));
        }

        let statement = params
            .into_iter()
            .fold(Statement::new(sql), |st, value| st.bind(value));
        let records = self
            .gateway
            .fetch(&statement)?
            .iter()
            .map(Record::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(limit, filter_expired, found = records.len(), "pool queried");
        Ok(records)
    }

    /// `query` with the pool's default limit, skipping expired records.
    pub fn query_default(&self, key: &IdentityKey) -> Result<Vec<Record>, PoolError> {
        self.query(key, self.default_limit, true)
    }

    /// Number of records, expired or not.
    pub fn count(&self) -> Result<u64, PoolError> {
        self.gate.acquire_read();
        let statement = Statement::new(format!("SELECT COUNT(*) AS n FROM {}", self.table.quoted()));
        self.count_with(&statement)
    }

    /// Number of records still valid now.
    pub fn count_live(&self) -> Result<u64, PoolError> {
        self.gate.acquire_read();
        let statement = Statement::new(format!(
            "SELECT COUNT(*) AS n FROM {} WHERE {} > ?1",
            self.table.quoted(),
            COL_VALID_UNTIL
        ))
        .bind(self.clock.now());
        self.count_with(&statement)
    }

    fn count_with(&self, statement: &Statement) -> Result<u64, PoolError> {
        let rows = self.gateway.fetch(statement)?;
        match rows.first().and_then(|row| row.get("n")) {
            Some(SqlValue::Integer(n)) => Ok(u64::try_from(*n).unwrap_or(0)),
            other => Err(PoolError::Decode(format!(
                "count returned {:?}, expected one integer",
                other
            ))),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
