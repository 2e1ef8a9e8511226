//! # Store Gateway
//!
//! Thin synchronous CRUD façade over the durable store (SQLite).
//!
//! - `connect` opens a fresh connection, retrying transient
//!   "too many connections"-class failures within a `RetryPolicy`
//! - `execute` runs one mutating statement inside its own transaction and
//!   commits before returning
//! - `fetch` returns rows as column-name → value mappings
//! - every connection is closed on every exit path: explicitly through
//!   `StoreHandle::close`, or by `Drop` when a closure unwinds
//!
//! Connections are never shared between operations.

use crate::PoolError;
use crate::config::RetryPolicy;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ErrorCode, TransactionBehavior, params_from_iter};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One fetched row: column name → value.
pub type Row = BTreeMap<String, SqlValue>;

// =============================================================================
// STATEMENT
// =============================================================================

/// A SQL statement with its bound parameters.
///
/// Values always travel as parameters; only trusted identifiers (validated
/// table names, fixed column names) are ever part of the SQL text.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind the next positional parameter.
    #[must_use]
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

// =============================================================================
// CONNECTION SOURCE
// =============================================================================

/// Why a connection could not be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenFailure {
    /// Worth retrying: the store is saturated or momentarily locked.
    Transient(String),
    /// Retrying will not help.
    Fatal(String),
}

impl OpenFailure {
    /// Sort a rusqlite error into the transient or fatal class.
    #[must_use]
    pub fn classify(err: &rusqlite::Error) -> Self {
        let message = err.to_string();
        let busy = matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        );
        if busy || message.to_ascii_lowercase().contains("too many connections") {
            Self::Transient(message)
        } else {
            Self::Fatal(message)
        }
    }
}

/// Something that can open store connections.
///
/// Implemented by `SqliteSource`; wrappers may add behavior (for example
/// injecting failures in tests) without touching the gateway.
pub trait ConnectionSource: Send + Sync {
    /// Open a fresh, ready-to-use connection.
    fn open(&self) -> Result<Connection, OpenFailure>;

    /// Human-readable description of where connections go.
    fn target(&self) -> String;
}

/// Opens SQLite connections to one database file.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConnectionSource for SqliteSource {
    fn open(&self) -> Result<Connection, OpenFailure> {
        let conn = Connection::open(&self.path).map_err(|e| OpenFailure::classify(&e))?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| OpenFailure::classify(&e))?;
        Ok(conn)
    }

    fn target(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

// =============================================================================
// STORE HANDLE
// =============================================================================

/// An open connection, owned by exactly one operation.
pub struct StoreHandle {
    conn: Connection,
    target: String,
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl StoreHandle {
    /// Run one mutating statement and commit it. Returns affected rows.
    pub fn execute(&mut self, statement: &Statement) -> Result<usize, PoolError> {
        let sql = statement.sql();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| PoolError::storage(sql, e))?;
        let affected = tx
            .execute(sql, params_from_iter(statement.params()))
            .map_err(|e| PoolError::storage(sql, e))?;
        tx.commit().map_err(|e| PoolError::storage(sql, e))?;
        Ok(affected)
    }

    /// Run a parameterless batch (DDL, pragmas) in autocommit mode.
    pub fn execute_script(&mut self, sql: &str) -> Result<(), PoolError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| PoolError::storage(sql, e))
    }

    /// Run a query and map every row by column name.
    pub fn fetch(&self, statement: &Statement) -> Result<Vec<Row>, PoolError> {
        let sql = statement.sql();
        let mut prepared = self
            .conn
            .prepare(sql)
            .map_err(|e| PoolError::storage(sql, e))?;
        let columns: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = prepared
            .query(params_from_iter(statement.params()))
            .map_err(|e| PoolError::storage(sql, e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| PoolError::storage(sql, e))? {
            let mut mapped = Row::new();
            for (i, name) in columns.iter().enumerate() {
                let value: SqlValue = row.get(i).map_err(|e| PoolError::storage(sql, e))?;
                mapped.insert(name.clone(), value);
            }
            out.push(mapped);
        }
        Ok(out)
    }

    /// Close the connection. Never fails: a failed close is logged.
    pub fn close(self) {
        let target = self.target;
        if let Err((_conn, e)) = self.conn.close() {
            tracing::warn!(target_db = %target, error = %e, "failed to close store connection");
        }
    }
}

// =============================================================================
// STORE GATEWAY
// =============================================================================

/// Opens one connection per operation and guarantees it is closed.
#[derive(Clone)]
pub struct StoreGateway {
    source: Arc<dyn ConnectionSource>,
    retry: RetryPolicy,
}

impl fmt::Debug for StoreGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreGateway")
            .field("target", &self.source.target())
            .field("retry", &self.retry)
            .finish()
    }
}

impl StoreGateway {
    #[must_use]
    pub fn new(source: Arc<dyn ConnectionSource>, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// Gateway over a SQLite file.
    #[must_use]
    pub fn sqlite(path: impl Into<PathBuf>, busy_timeout: Duration, retry: RetryPolicy) -> Self {
        Self::new(Arc::new(SqliteSource::new(path, busy_timeout)), retry)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    #[must_use]
    pub fn target(&self) -> String {
        self.source.target()
    }

    /// Open a connection, retrying transient failures.
    ///
    /// # Errors
    ///
    /// - `ResourceExhausted` once `max_retries + 1` attempts all failed transiently
    /// - `ConnectionError` on the first non-transient failure
    pub fn connect(&self) -> Result<StoreHandle, PoolError> {
        let target = self.source.target();
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match self.source.open() {
                Ok(conn) => {
                    if attempts > 1 {
                        tracing::debug!(target_db = %target, attempts, "connected after retry");
                    }
                    return Ok(StoreHandle { conn, target });
                }
                Err(OpenFailure::Transient(reason)) => {
                    if attempts > self.retry.max_retries {
                        tracing::warn!(target_db = %target, attempts, %reason, "connect retries exhausted");
                        return Err(PoolError::ResourceExhausted {
                            target,
                            attempts,
                            reason,
                        });
                    }
                    tracing::debug!(target_db = %target, attempts, %reason, "transient connect failure, retrying");
                    if !self.retry.delay.is_zero() {
                        std::thread::sleep(self.retry.delay);
                    }
                }
                Err(OpenFailure::Fatal(reason)) => {
                    return Err(PoolError::ConnectionError { target, reason });
                }
            }
        }
    }

    /// Close a handle obtained from `connect`.
    pub fn close(&self, handle: StoreHandle) {
        handle.close();
    }

    /// Run `f` with a fresh connection, closing it afterwards whatever `f` returns.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut StoreHandle) -> Result<T, PoolError>,
    ) -> Result<T, PoolError> {
        let mut handle = self.connect()?;
        let result = f(&mut handle);
        self.close(handle);
        result
    }

    /// Execute and commit one mutating statement on its own connection.
    pub fn execute(&self, statement: &Statement) -> Result<usize, PoolError> {
        self.with_connection(|handle| handle.execute(statement))
    }

    /// Fetch rows on their own connection.
    pub fn fetch(&self, statement: &Statement) -> Result<Vec<Row>, PoolError> {
        self.with_connection(|handle| handle.fetch(statement))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails transiently `failures` times, then delegates to SQLite.
    struct FlakySource {
        inner: SqliteSource,
        failures: u32,
        attempts: AtomicU32,
    }

    impl ConnectionSource for FlakySource {
        fn open(&self) -> Result<Connection, OpenFailure> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(OpenFailure::Transient("Too many connections".into()));
            }
            self.inner.open()
        }

        fn target(&self) -> String {
            self.inner.target()
        }
    }

    fn flaky(dir: &tempfile::TempDir, failures: u32) -> Arc<FlakySource> {
        Arc::new(FlakySource {
            inner: SqliteSource::new(dir.path().join("gw.db"), Duration::from_millis(100)),
            failures,
            attempts: AtomicU32::new(0),
        })
    }

    fn no_delay(retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries, Duration::ZERO)
    }

    #[test]
    fn execute_then_fetch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gw = StoreGateway::sqlite(dir.path().join("a.db"), Duration::from_millis(100), no_delay(0));
        gw.with_connection(|h| h.execute_script("CREATE TABLE t (k TEXT, v INTEGER)"))
            .expect("ddl");

        let insert = Statement::new("INSERT INTO t (k, v) VALUES (?1, ?2)")
            .bind("a".to_string())
            .bind(7_i64);
        assert_eq!(gw.execute(&insert).expect("insert"), 1);

        let rows = gw
            .fetch(&Statement::new("SELECT k, v FROM t WHERE k = ?1").bind("a".to_string()))
            .expect("fetch");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("v"), Some(&SqlValue::Integer(7)));
        assert_eq!(rows[0].get("k"), Some(&SqlValue::Text("a".into())));
    }

    #[test]
    fn transient_failures_are_retried() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = flaky(&dir, 3);
        let gw = StoreGateway::new(source.clone(), no_delay(5));

        let handle = gw.connect().expect("connect after retries");
        gw.close(handle);
        assert_eq!(source.attempts.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn exhausted_retries_report_attempts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = flaky(&dir, u32::MAX);
        let gw = StoreGateway::new(source.clone(), no_delay(2));

        match gw.connect() {
            Err(PoolError::ResourceExhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => unreachable!("expected ResourceExhausted, got {:?}", other),
        }
        assert_eq!(source.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn fatal_failure_is_not_retried() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("no_such_dir").join("x.db");
        let gw = StoreGateway::sqlite(missing, Duration::from_millis(100), no_delay(10));

        assert!(matches!(
            gw.connect(),
            Err(PoolError::ConnectionError { .. })
        ));
    }

    #[test]
    fn storage_error_carries_statement() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gw = StoreGateway::sqlite(dir.path().join("b.db"), Duration::from_millis(100), no_delay(0));

        match gw.execute(&Statement::new("UPDATE missing_table SET x = 1")) {
            Err(PoolError::StorageError { statement, .. }) => {
                assert_eq!(statement, "UPDATE missing_table SET x = 1");
            }
            other => unreachable!("expected StorageError, got {:?}", other),
        }
    }

    #[test]
    fn classify_too_many_connections_message() {
        let err = rusqlite::Error::InvalidParameterName("Too many connections".into());
        assert!(matches!(OpenFailure::classify(&err), OpenFailure::Transient(_)));

        let err = rusqlite::Error::InvalidQuery;
        assert!(matches!(OpenFailure::classify(&err), OpenFailure::Fatal(_)));
    }

    #[test]
    fn statement_displays_sql_only() {
        let st = Statement::new("SELECT ?1").bind(1_i64);
        assert_eq!(st.to_string(), "SELECT ?1");
        assert_eq!(st.params(), &[SqlValue::Integer(1)]);
    }
}
