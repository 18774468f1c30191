//! Local durable store for the trainer document.

pub mod local;
pub mod schema;

pub use local::{normalize, LocalStore, STORAGE_KEY};
pub use schema::{
    ChunkState, ChunkStatus, ItemSchedule, Meta, PrayerState, RecitationState, SessionRecord,
    Settings, StateRoot, Stats, STORAGE_VERSION,
};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The store shared between the application context and the sync task.
///
/// The lock is only ever held for synchronous work, never across an await.
pub type SharedStore = Arc<Mutex<LocalStore>>;

pub fn shared(store: LocalStore) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Lock the shared store. A panic while holding the lock cannot leave the
/// document half-written on disk, so a poisoned lock is simply recovered.
pub fn lock(store: &SharedStore) -> MutexGuard<'_, LocalStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}
