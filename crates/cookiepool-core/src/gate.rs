//! # Readers-Writer Gate
//!
//! In-process admission control in front of the store: any number of
//! readers, or one writer, with writer preference.
//!
//! ## State Machine
//!
//! ```text
//!            acquire_write (n = 1)             acquire_write (n > 1)
//!   Idle ───────────────────────────▶ Writing ─────────────────────▶ Writing + queued
//!    ▲  acquire_read: pass            │   acquire_read: wait          │
//!    └────────── release_write (n → 0, wake ALL readers) ◀────────────┘
//!                release_write (n > 0, hand ONE grant to a queued writer)
//! ```
//!
//! - `active_writers` counts the running writer plus every queued one.
//! - Readers are checked once, at entry. There is no `release_read`: a
//!   reader past the gate is not tracked and does not hold writers back.
//!   A writer may therefore start while earlier readers are still reading.
//!   This is the intended consistency level: writers exclude each other and
//!   block *new* readers, nothing more.
//! - Queued writers are woken one at a time, in no particular order.
//!   Under sustained write pressure a queued writer can wait indefinitely.
//! - When the count drains to zero every waiting reader wakes at once.
//!
//! The gate never fails. A poisoned mutex is recovered, since the state it
//! guards is two counters that are valid after any partial update.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct GateState {
    /// Running writer plus queued writers.
    active_writers: usize,
    /// Hand-offs issued to queued writers and not yet consumed.
    write_grants: usize,
    /// Readers admitted since construction.
    readers_admitted: u64,
    /// Writers admitted since construction.
    writers_admitted: u64,
}

/// Point-in-time view of the gate, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSnapshot {
    pub active_writers: usize,
    pub readers_admitted: u64,
    pub writers_admitted: u64,
}

impl GateSnapshot {
    /// Writers waiting behind the running one.
    #[must_use]
    pub fn queued_writers(&self) -> usize {
        self.active_writers.saturating_sub(1)
    }

    /// True when a new reader would pass without waiting.
    #[must_use]
    pub fn is_open_for_readers(&self) -> bool {
        self.active_writers == 0
    }
}

/// Single-writer / many-reader admission gate.
#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
    read_ready: Condvar,
    write_ready: Condvar,
}

/// Exclusive write admission. Dropping it releases the gate.
#[derive(Debug)]
#[must_use = "the write admission is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    gate: &'a Gate,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.gate.release_write();
    }
}

impl Gate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until no writer is running or queued, then return.
    ///
    /// Nothing is held afterwards.
    pub fn acquire_read(&self) {
        let mut state = self.lock();
        while state.active_writers > 0 {
            state = self
                .read_ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.readers_admitted = state.readers_admitted.saturating_add(1);
    }

    /// Join the writer count and block until this writer may run.
    pub fn acquire_write(&self) -> WriteGuard<'_> {
        let mut state = self.lock();
        state.active_writers = state.active_writers.saturating_add(1);
        if state.active_writers > 1 {
            while state.write_grants == 0 {
                state = self
                    .write_ready
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state.write_grants -= 1;
        }
        state.writers_admitted = state.writers_admitted.saturating_add(1);
        WriteGuard { gate: self }
    }

    fn release_write(&self) {
        let mut state = self.lock();
        state.active_writers = state.active_writers.saturating_sub(1);
        if state.active_writers == 0 {
            self.read_ready.notify_all();
        } else {
            state.write_grants = state.write_grants.saturating_add(1);
        }
        self.write_ready.notify_one();
    }

    #[must_use]
    pub fn snapshot(&self) -> GateSnapshot {
        let state = self.lock();
        GateSnapshot {
            active_writers: state.active_writers,
            readers_admitted: state.readers_admitted,
            writers_admitted: state.writers_admitted,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
