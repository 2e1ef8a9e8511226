//! # Expiry Sweeper
//!
//! Bulk removal of records whose validity window has elapsed
//! (`valid_until < now`). There is no per-record delete.
//!
//! `CookiePool::sweep_expired` performs one sweep under write admission.
//! `ExpirySweeper` repeats it on a background thread until stopped.

use crate::PoolError;
use crate::gateway::Statement;
use crate::pool::CookiePool;
use crate::schema::TableName;
use crate::types::COL_VALID_UNTIL;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// DELETE for every record of `table` that expired before `now`.
#[must_use]
pub fn expired_records_statement(table: &TableName, now: i64) -> Statement {
    Statement::new(format!(
        "DELETE FROM {} WHERE {} < ?1",
        table.quoted(),
        COL_VALID_UNTIL
    ))
    .bind(now)
}

/// Counters kept by a background sweeper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Sweeps attempted.
    pub runs: u64,
    /// Records deleted across all sweeps.
    pub deleted: u64,
    /// Sweeps that returned an error.
    pub failures: u64,
}

/// Periodic sweep on a dedicated thread.
///
/// The first sweep runs one `interval` after `spawn`. Dropping the
/// sweeper stops the thread and waits for it.
#[derive(Debug)]
pub struct ExpirySweeper {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<Mutex<SweepStats>>,
}

impl ExpirySweeper {
    /// Start sweeping `pool` every `interval`.
    pub fn spawn(pool: Arc<CookiePool>, interval: Duration) -> Result<Self, PoolError> {
        if interval.is_zero() {
            return Err(PoolError::InvalidArgument(
                "sweep interval must be positive".to_string(),
            ));
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(SweepStats::default()));
        let thread_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("cookiepool-sweeper".to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let outcome = pool.sweep_expired();
                    let mut stats = thread_stats.lock().unwrap_or_else(PoisonError::into_inner);
                    stats.runs = stats.runs.saturating_add(1);
                    match outcome {
                        Ok(deleted) => {
                            stats.deleted = stats.deleted.saturating_add(deleted as u64);
                        }
                        Err(e) => {
                            stats.failures = stats.failures.saturating_add(1);
                            tracing::warn!(error = %e, "background sweep failed");
                        }
                    }
                }
                tracing::debug!("sweeper stopped");
            })
            .map_err(|e| PoolError::ResourceExhausted {
                target: "sweeper thread".to_string(),
                attempts: 1,
                reason: e.to_string(),
            })?;

        tracing::info!(interval_ms = interval.as_millis() as u64, "sweeper started");
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
            stats,
        })
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> SweepStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop the thread, wait for it, and return the final counters.
    pub fn stop(mut self) -> SweepStats {
        self.shutdown();
        self.stats()
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("sweeper thread panicked");
            }
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdentityKey;
    use crate::clock::ManualClock;
    use crate::config::RetryPolicy;
    use crate::gateway::StoreGateway;

    fn pool(dir: &tempfile::TempDir, clock: Arc<ManualClock>) -> Arc<CookiePool> {
        let gateway = StoreGateway::sqlite(
            dir.path().join("sweep.db"),
            Duration::from_millis(500),
            RetryPolicy::none(),
        );
        let table = TableName::parse("pool").expect("table");
        Arc::new(CookiePool::with_gateway(gateway, table, clock).expect("pool"))
    }

    #[test]
    fn statement_binds_now() {
        let table = TableName::parse("pool").expect("table");
        let st = expired_records_statement(&table, 42);
        assert_eq!(st.sql(), "DELETE FROM \"pool\" WHERE valid_until < ?1");
        assert_eq!(st.params().len(), 1);
    }

    #[test]
    fn zero_interval_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = pool(&dir, Arc::new(ManualClock::new(0)));
        assert!(matches!(
            ExpirySweeper::spawn(pool, Duration::ZERO),
            Err(PoolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn background_sweeps_remove_expired() {
        let dir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(ManualClock::new(1_000));
        let pool = pool(&dir, clock.clone());

        pool.save(&IdentityKey::new("bj", "old"), "p", -1).expect("save");
        pool.save(&IdentityKey::new("bj", "new"), "p", 3600).expect("save");

        let sweeper =
            ExpirySweeper::spawn(Arc::clone(&pool), Duration::from_millis(10)).expect("spawn");
        while sweeper.stats().runs == 0 {
            thread::sleep(Duration::from_millis(5));
        }
        let stats = sweeper.stop();

        assert!(stats.runs >= 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.failures, 0);
        assert_eq!(pool.count().expect("count"), 1);
    }

    #[test]
    fn stop_without_any_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = pool(&dir, Arc::new(ManualClock::new(0)));
        let sweeper = ExpirySweeper::spawn(pool, Duration::from_secs(3600)).expect("spawn");
        assert_eq!(sweeper.stop(), SweepStats::default());
    }
}
