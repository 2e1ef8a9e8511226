//! # Schema Bootstrap
//!
//! Validated table names and the idempotent DDL for the pool table.

use crate::PoolError;
use crate::gateway::{Statement, StoreGateway};
use crate::primitives::MAX_TABLE_NAME_LENGTH;
use crate::types::{
    COL_FINGERPRINT, COL_IP, COL_PAYLOAD, COL_PROVINCE, COL_TAX, COL_VALID_FROM, COL_VALID_UNTIL,
};
use std::fmt;

/// A table name safe to splice into SQL text.
///
/// ASCII letter or `_` first, then ASCII alphanumerics or `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn parse(name: &str) -> Result<Self, PoolError> {
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_head || !valid_tail || name.len() > MAX_TABLE_NAME_LENGTH {
            return Err(PoolError::InvalidArgument(format!(
                "invalid table name {:?}: expected [A-Za-z_][A-Za-z0-9_]{{0,{}}}",
                name,
                MAX_TABLE_NAME_LENGTH - 1
            )));
        }
        Ok(Self(name.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name quoted as a SQL identifier.
    #[must_use]
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// DDL creating the pool table and its expiry index, if absent.
#[must_use]
pub fn create_table_sql(table: &TableName) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {t} (
            {fp} TEXT NOT NULL PRIMARY KEY,
            {province} TEXT DEFAULT NULL,
            {tax} TEXT DEFAULT NULL,
            {ip} TEXT DEFAULT NULL,
            {payload} TEXT DEFAULT NULL,
            {from} INTEGER NOT NULL,
            {until} INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS \"idx_{name}_{until}\" ON {t} ({until});",
        t = table.quoted(),
        name = table.as_str(),
        fp = COL_FINGERPRINT,
        province = COL_PROVINCE,
        tax = COL_TAX,
        ip = COL_IP,
        payload = COL_PAYLOAD,
        from = COL_VALID_FROM,
        until = COL_VALID_UNTIL,
    )
}

/// Make sure the pool table exists. Safe to call any number of times.
///
/// Also switches the database to WAL so store-level readers never block
/// the single writer the gate admits.
pub fn ensure_table(gateway: &StoreGateway, table: &TableName) -> Result<(), PoolError> {
    let ddl = create_table_sql(table);
    gateway.with_connection(|handle| {
        // journal_mode answers with a row, so it goes through fetch.
        handle.fetch(&Statement::new("PRAGMA journal_mode = WAL"))?;
        handle.execute_script(&ddl)
    })?;
    tracing::debug!(table = %table, "pool table ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use std::time::Duration;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(TableName::parse("cookies_pool5").is_ok());
        assert!(TableName::parse("_t").is_ok());
    }

    #[test]
    fn rejects_injection_and_junk() {
        for bad in ["", "5cookies", "a-b", "t; DROP TABLE x", "t\"", "naïve"] {
            assert!(
                matches!(TableName::parse(bad), Err(PoolError::InvalidArgument(_))),
                "{bad:?} should be rejected"
            );
        }
        let long = "t".repeat(MAX_TABLE_NAME_LENGTH + 1);
        assert!(TableName::parse(&long).is_err());
    }

    #[test]
    fn ensure_table_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gw = StoreGateway::sqlite(
            dir.path().join("s.db"),
            Duration::from_millis(100),
            RetryPolicy::none(),
        );
        let table = TableName::parse("pool").expect("name");

        ensure_table(&gw, &table).expect("first");
        ensure_table(&gw, &table).expect("second");

        let rows = gw
            .fetch(&Statement::new("SELECT COUNT(*) AS n FROM \"pool\""))
            .expect("count");
        assert_eq!(rows.len(), 1);
    }
}
