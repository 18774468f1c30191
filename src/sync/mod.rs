//! Client-side synchronization with the remote progress store.

pub mod orchestrator;
pub mod reconcile;
pub mod state;

pub use orchestrator::{SyncHandle, SyncOrchestrator};
pub use reconcile::{reconcile, remote_wins, Reconciliation};
pub use state::{SyncPhase, SyncStatus};
