//! Process-local sync bookkeeping.
//!
//! [`SyncStatus`] is owned by the orchestrator task and published to readers
//! through a watch channel. It is never persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where the orchestrator is in its write cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    /// A write is scheduled but the debounce delay has not elapsed.
    Debouncing,
    /// Exactly one read or write request is outstanding.
    InFlight,
    /// A sync was requested while a request was outstanding.
    InFlightQueued,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Debouncing => "waiting to write",
            SyncPhase::InFlight => "in flight",
            SyncPhase::InFlightQueued => "in flight, another queued",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// False once the remote says no storage is configured, or when no
    /// endpoint was given at all. Never flips back during the process.
    pub enabled: bool,
    /// Writes are allowed only after bootstrap has answered.
    pub can_write: bool,
    pub bootstrapped: bool,
    pub in_flight: bool,
    pub queued: bool,
    /// A sync was requested before writes were allowed.
    pub pending_while_disabled: bool,
    pub debouncing: bool,
    /// Last revision confirmed by the remote.
    pub revision: u64,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SyncStatus {
    /// Initial status for a process starting from a local document at `revision`.
    pub fn starting(enabled: bool, revision: u64, last_synced_at: Option<DateTime<Utc>>) -> Self {
        Self {
            enabled,
            bootstrapped: !enabled,
            revision,
            last_synced_at,
            ..Default::default()
        }
    }

    pub fn phase(&self) -> SyncPhase {
        match (self.in_flight, self.queued) {
            (true, true) => SyncPhase::InFlightQueued,
            (true, false) => SyncPhase::InFlight,
            _ if self.debouncing => SyncPhase::Debouncing,
            _ => SyncPhase::Idle,
        }
    }
}
