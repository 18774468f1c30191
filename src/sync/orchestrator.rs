//! Background task that keeps the local document in step with the remote.
//!
//! The task owns all sync bookkeeping and runs a single `select!` loop over
//! three event sources:
//! - commands from [`SyncHandle`]s (schedule a sync, wait for a flush)
//! - the debounce deadline, restarted on every non-immediate schedule
//! - the one outstanding request, if any
//!
//! At most one request (the bootstrap read or a write) is outstanding at a
//! time. A sync requested meanwhile only sets `queued`, and the queue is
//! drained with one immediate sync once the request completes.

use super::reconcile::{reconcile, Reconciliation};
use super::state::SyncStatus;
use crate::config::SyncConfig;
use crate::envelope;
use crate::error::TransportError;
use crate::remote::{FetchOutcome, ProgressTransport, PushAck};
use crate::store::{self, SharedStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum SyncCommand {
    Schedule { immediate: bool },
    Flush(oneshot::Sender<()>),
}

/// Result of the outstanding request.
enum Completion {
    Bootstrap(Result<FetchOutcome, TransportError>),
    Push {
        /// `lastModifiedAt` of the snapshot that was sent.
        stamp: Option<DateTime<Utc>>,
        result: Result<PushAck, TransportError>,
    },
}

/// Cheap, cloneable handle to the sync task.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<SyncCommand>,
    status: watch::Receiver<SyncStatus>,
}

impl SyncHandle {
    /// Request a sync. Non-immediate requests are debounced; immediate ones
    /// bypass (and cancel) the pending delay.
    pub fn schedule(&self, immediate: bool) {
        if self.commands.send(SyncCommand::Schedule { immediate }).is_err() {
            debug!("[sync] Task has stopped, dropping schedule request");
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn watch(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Sync now and wait until nothing is pending or outstanding.
    ///
    /// Failures are not returned; they end up in [`SyncStatus::last_error`].
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(SyncCommand::Flush(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// Wait until bootstrap has answered (or sync turned out to be disabled).
    pub async fn wait_bootstrapped(&self) {
        let mut rx = self.status.clone();
        let _ = rx.wait_for(|s| s.bootstrapped).await;
    }
}

pub struct SyncOrchestrator {
    store: SharedStore,
    transport: Option<Arc<dyn ProgressTransport>>,
    debounce: Duration,
    max_state_bytes: usize,
    status: SyncStatus,
    status_tx: watch::Sender<SyncStatus>,
    deadline: Option<Instant>,
    in_flight: Option<JoinHandle<Completion>>,
    waiters: Vec<oneshot::Sender<()>>,
}

impl SyncOrchestrator {
    /// Start the sync task. With no transport, sync is disabled for the
    /// lifetime of the process and every request is a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        store: SharedStore,
        transport: Option<Arc<dyn ProgressTransport>>,
        config: &SyncConfig,
    ) -> SyncHandle {
        let status = {
            let local = store::lock(&store);
            let meta = &local.state().meta;
            SyncStatus::starting(transport.is_some(), meta.revision, meta.last_synced_at)
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(status.clone());

        let orchestrator = Self {
            store,
            transport,
            debounce: config.debounce(),
            max_state_bytes: config.max_state_bytes,
            status,
            status_tx,
            deadline: None,
            in_flight: None,
            waiters: Vec::new(),
        };
        tokio::spawn(orchestrator.run(commands_rx));

        SyncHandle {
            commands: commands_tx,
            status: status_rx,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SyncCommand>) {
        self.start_bootstrap();
        self.publish();

        let mut open = true;
        while open || !self.is_quiescent() {
            tokio::select! {
                command = commands.recv(), if open => match command {
                    Some(SyncCommand::Schedule { immediate }) => self.schedule(immediate),
                    Some(SyncCommand::Flush(tx)) => {
                        self.waiters.push(tx);
                        self.schedule(true);
                    }
                    None => open = false,
                },
                _ = wait_deadline(self.deadline) => {
                    self.deadline = None;
                    self.perform_sync();
                }
                completion = wait_in_flight(&mut self.in_flight) => {
                    self.in_flight = None;
                    self.complete(completion);
                }
            }

            self.resolve_waiters();
            self.publish();
        }
        debug!("[sync] Task stopped");
    }

    fn is_quiescent(&self) -> bool {
        self.deadline.is_none() && self.in_flight.is_none() && !self.status.queued
    }

    fn resolve_waiters(&mut self) {
        if self.is_quiescent() {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn publish(&mut self) {
        self.status.debouncing = self.deadline.is_some();
        self.status_tx.send_replace(self.status.clone());
    }

    fn start_bootstrap(&mut self) {
        let Some(transport) = self.transport.clone() else {
            info!("[sync] No progress endpoint configured, sync disabled");
            return;
        };
        debug!("[sync] Bootstrapping from remote");
        self.status.in_flight = true;
        self.in_flight = Some(tokio::spawn(async move {
            Completion::Bootstrap(transport.fetch().await)
        }));
    }

    fn schedule(&mut self, immediate: bool) {
        if !self.status.enabled {
            return;
        }
        if !self.status.can_write {
            self.status.pending_while_disabled = true;
            return;
        }

        self.deadline = None;
        if immediate {
            self.perform_sync();
        } else {
            self.deadline = Some(Instant::now() + self.debounce);
        }
    }

    /// Push the current document if it has unflushed edits.
    fn perform_sync(&mut self) {
        if !self.status.enabled || !self.status.can_write {
            return;
        }
        let Some(transport) = self.transport.clone() else {
            return;
        };

        let snapshot = {
            let local = store::lock(&self.store);
            if !local.state().meta.dirty {
                return;
            }
            if self.status.in_flight {
                self.status.queued = true;
                return;
            }
            local
                .snapshot()
                .map(|value| (value, local.state().meta.last_modified_at))
        };

        let (snapshot, stamp) = match snapshot {
            Ok(s) => s,
            Err(e) => {
                warn!("[sync] Failed to snapshot local state: {}", e);
                self.status.last_error = Some(e.to_string());
                return;
            }
        };

        if let Err(e) = envelope::validate_state(&snapshot, self.max_state_bytes) {
            warn!("[sync] Not pushing local state: {}", e);
            self.status.last_error = Some(e.to_string());
            return;
        }

        self.status.in_flight = true;
        self.status.last_error = None;
        let client_revision = self.status.revision;
        debug!("[sync] Pushing local state (client revision {})", client_revision);

        self.in_flight = Some(tokio::spawn(async move {
            let result = transport.push(snapshot, client_revision).await;
            Completion::Push { stamp, result }
        }));
    }

    fn complete(&mut self, completion: Result<Completion, JoinError>) {
        match completion {
            Ok(Completion::Bootstrap(result)) => self.complete_bootstrap(result),
            Ok(Completion::Push { stamp, result }) => self.complete_push(stamp, result),
            Err(e) => {
                warn!("[sync] Request task failed: {}", e);
                if self.status.bootstrapped {
                    self.complete_push(None, Err(TransportError::Backend(e.to_string())));
                } else {
                    self.complete_bootstrap(Err(TransportError::Backend(e.to_string())));
                }
            }
        }
    }

    fn complete_bootstrap(&mut self, result: Result<FetchOutcome, TransportError>) {
        self.status.in_flight = false;

        let remote = match result {
            Ok(FetchOutcome::Disabled) => {
                info!("[sync] Remote has no storage configured, sync disabled");
                self.status.enabled = false;
                self.status.can_write = false;
                self.status.bootstrapped = true;
                return;
            }
            Ok(FetchOutcome::Remote(remote)) => remote,
            Err(e) => {
                warn!("[sync] Bootstrap failed: {}", e);
                self.status.can_write = true;
                self.status.bootstrapped = true;
                self.status.last_error = Some(e.to_string());
                // Edits made during bootstrap wait for the next mutation,
                // but an explicit flush is honoured right away.
                if !self.waiters.is_empty() {
                    self.status.pending_while_disabled = false;
                    self.schedule(true);
                }
                return;
            }
        };

        self.status.can_write = true;
        self.status.bootstrapped = true;
        self.status.revision = remote.revision;
        self.status.last_synced_at = remote.updated_at;

        let outcome = {
            let mut local = store::lock(&self.store);
            let outcome = reconcile(local.state_mut(), &remote, Utc::now());
            if let Err(e) = local.persist() {
                warn!("[sync] Failed to persist reconciled state: {}", e);
            }
            outcome
        };

        match outcome {
            Reconciliation::AdoptedRemote => {
                info!("[sync] Adopted remote progress at revision {}", remote.revision);
            }
            Reconciliation::KeptLocal { push_now } => {
                info!(
                    "[sync] Kept local progress (remote revision {}, push: {})",
                    remote.revision, push_now
                );
                if push_now {
                    self.schedule(true);
                }
            }
        }

        if self.status.pending_while_disabled {
            self.status.pending_while_disabled = false;
            self.schedule(true);
        }
    }

    fn complete_push(&mut self, stamp: Option<DateTime<Utc>>, result: Result<PushAck, TransportError>) {
        match result {
            Ok(ack) => {
                let revision = ack.revision.unwrap_or(self.status.revision);
                let synced_at = ack.updated_at.unwrap_or_else(Utc::now);
                self.status.revision = revision;
                self.status.last_synced_at = Some(synced_at);

                let newer_local_changes = {
                    let mut local = store::lock(&self.store);
                    let meta = &mut local.state_mut().meta;
                    let newer = meta.last_modified_at != stamp;
                    meta.last_modified_at = meta.last_modified_at.or(stamp).or(Some(synced_at));
                    meta.revision = revision;
                    meta.last_synced_at = Some(synced_at);
                    meta.dirty = newer;
                    if let Err(e) = local.persist() {
                        warn!("[sync] Failed to persist sync result: {}", e);
                    }
                    newer
                };

                info!("[sync] Pushed revision {}", revision);
                if newer_local_changes {
                    // Still marked in flight, so this only queues the follow-up.
                    self.schedule(true);
                }
            }
            Err(e) => {
                warn!("[sync] Push failed: {}", e);
                self.status.last_error = Some(e.to_string());
                let mut local = store::lock(&self.store);
                local.state_mut().meta.dirty = true;
                if let Err(e) = local.persist() {
                    warn!("[sync] Failed to persist dirty flag: {}", e);
                }
            }
        }

        self.status.in_flight = false;
        if self.status.queued {
            self.status.queued = false;
            self.schedule(true);
        }
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_in_flight(slot: &mut Option<JoinHandle<Completion>>) -> Result<Completion, JoinError> {
    match slot {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
