//! The per-`(block, refresh id)` completion state machine.

use crate::error::{RefreshError, Result};
use serde::{Deserialize, Serialize};

/// `Sync`'s three states. A refresh for one id on one block moves
/// `INACTIVE -> ACTIVE -> READY -> INACTIVE` exactly once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    Inactive,
    Active,
    Ready,
}

/// Counter-based completion barrier for one refresh id on one block.
///
/// Invariant: `value <= stop` always holds; `done()` iff `value == stop &&
/// stop > 0`. `stop == 0` with state `Active` means the spec had no
/// outgoing messages to wait on, and `check_done` short-circuits
/// completion immediately rather than waiting for a `value` that will
/// never move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sync {
    state: SyncState,
    stop: u32,
    value: u32,
}

impl Default for Sync {
    fn default() -> Self {
        Sync {
            state: SyncState::Inactive,
            stop: 0,
            value: 0,
        }
    }
}

impl Sync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn stop(&self) -> u32 {
        self.stop
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn done(&self) -> bool {
        self.stop > 0 && self.value == self.stop
    }

    /// `refresh_start`: requires `Inactive`, moves to `Active` and arms the
    /// counter at `stop_count` (the number of messages this block expects
    /// back before the refresh is complete). `id` is only used to label a
    /// `SyncStateViolation` should the precondition fail.
    pub fn start(&mut self, id: u32, stop_count: u32) -> Result<()> {
        if self.state != SyncState::Inactive {
            return Err(RefreshError::SyncStateViolation {
                id,
                expected: "INACTIVE",
                found: self.state,
            });
        }
        self.state = SyncState::Active;
        self.stop = stop_count;
        self.value = 0;
        Ok(())
    }

    /// `refresh_wait`: requires `Active`, moves to `Ready`.
    pub fn wait(&mut self, id: u32) -> Result<()> {
        if self.state != SyncState::Active {
            return Err(RefreshError::SyncStateViolation {
                id,
                expected: "ACTIVE",
                found: self.state,
            });
        }
        self.state = SyncState::Ready;
        Ok(())
    }

    /// Records one arrived message's contribution. `debug_assert`s rather
    /// than returns an error on overflow past `stop`: a message count
    /// exceeding what `refresh_start` armed indicates a bug in this
    /// crate's own dispatch bookkeeping, not bad external input.
    pub fn advance(&mut self) {
        debug_assert!(self.value < self.stop, "Sync::advance past stop");
        self.value += 1;
    }

    /// Resets to `Inactive` with the counters zeroed, as happens after a
    /// refresh completes and before the next `refresh_start` for this id.
    pub fn reset(&mut self) {
        self.state = SyncState::Inactive;
        self.stop = 0;
        self.value = 0;
    }
}
