//! Startup reconciliation between the local document and the remote one.
//!
//! Conflicts are settled by whole-document replacement: either the remote
//! copy replaces local entirely, or local is kept and later pushed over it.

use crate::remote::RemoteProgress;
use crate::store::{normalize, Meta, StateRoot};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Local was replaced by the remote document.
    AdoptedRemote,
    /// Local was kept. When `push_now` is set it must be flushed immediately.
    KeptLocal { push_now: bool },
}

/// Whether the remote copy should replace local.
///
/// Never while local has unflushed edits. Otherwise the remote must be
/// strictly fresher, or equally fresh with a strictly higher revision.
pub fn remote_wins(
    local: &StateRoot,
    remote: &StateRoot,
    remote_revision: u64,
    remote_updated_at: Option<DateTime<Utc>>,
) -> bool {
    if local.meta.dirty {
        return false;
    }
    let local_freshness = local.freshness();
    let remote_freshness = remote_updated_at.unwrap_or_else(|| remote.freshness());

    remote_freshness > local_freshness
        || (remote_freshness == local_freshness && remote_revision > local.meta.revision)
}

/// Reconcile `local` in place against what bootstrap read from the remote.
pub fn reconcile(local: &mut StateRoot, remote: &RemoteProgress, now: DateTime<Utc>) -> Reconciliation {
    let Some(raw) = remote.state.as_ref() else {
        // Nothing stored remotely yet: seed it with whatever progress exists here.
        let push_now = local.meta.dirty || local.has_meaningful_progress();
        local.meta.dirty = push_now;
        return Reconciliation::KeptLocal { push_now };
    };

    let remote_state = normalize(raw);
    if remote_wins(local, &remote_state, remote.revision, remote.updated_at) {
        let last_modified_at = remote_state
            .meta
            .last_modified_at
            .or(remote.updated_at)
            .unwrap_or(now);

        let mut adopted = remote_state;
        adopted.meta = Meta {
            revision: remote.revision,
            last_modified_at: Some(last_modified_at),
            last_synced_at: Some(remote.updated_at.unwrap_or(now)),
            dirty: false,
        };
        *local = adopted;
        return Reconciliation::AdoptedRemote;
    }

    let local_revision = local.meta.revision;
    local.meta.revision = local_revision.max(remote.revision);
    local.meta.last_synced_at = remote.updated_at.or(local.meta.last_synced_at);
    if local_revision == 0 && local.has_meaningful_progress() {
        local.meta.dirty = true;
    }

    Reconciliation::KeptLocal {
        push_now: local.meta.dirty,
    }
}
