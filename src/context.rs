//! The trainer's application context.
//!
//! [`AppContext`] is created once at startup and passed to whatever drives
//! the trainer. Every mutation goes through [`AppContext::mutate`]: the
//! document is edited, stamped, persisted, and then a debounced sync is
//! scheduled.

use crate::catalog::{Catalog, Recitation};
use crate::config::SyncConfig;
use crate::error::AppError;
use crate::prayer::{self, PrayerTarget, RecitationProgress};
use crate::progress::{self, CategoryStats, Milestone, WeekDay};
use crate::remote::ProgressTransport;
use crate::scheduler::{self, PlanMode, Rating, SessionPlan};
use crate::session::{self, ActiveSession, SessionSummary};
use crate::store::{self, ChunkStatus, LocalStore, SharedStore, StateRoot};
use crate::sync::{SyncHandle, SyncOrchestrator};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct AppContext {
    store: SharedStore,
    catalog: Catalog,
    sync: SyncHandle,
}

/// Headline numbers for the progress view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub learned: u32,
    pub total: usize,
    pub due: usize,
    pub recall_rate: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_sessions: u32,
    pub total_minutes: u64,
    pub milestone: Milestone,
    pub categories: Vec<CategoryStats>,
    pub week: Vec<WeekDay>,
}

impl AppContext {
    pub fn new(store: SharedStore, catalog: Catalog, sync: SyncHandle) -> Self {
        Self { store, catalog, sync }
    }

    /// Hydrate the local store and start syncing through `transport`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        config: &SyncConfig,
        catalog: Catalog,
        transport: Option<Arc<dyn ProgressTransport>>,
    ) -> Self {
        let store = store::shared(LocalStore::open(&config.store_path));
        let sync = SyncOrchestrator::spawn(store.clone(), transport, config);
        Self::new(store, catalog, sync)
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn sync(&self) -> &SyncHandle {
        &self.sync
    }

    /// Copy of the current document.
    pub fn state(&self) -> StateRoot {
        store::lock(&self.store).state().clone()
    }

    fn read<T>(&self, f: impl FnOnce(&StateRoot) -> T) -> T {
        f(store::lock(&self.store).state())
    }

    /// Apply `f` to the document, then persist and schedule a sync.
    ///
    /// `f` must validate before it edits: an error leaves nothing saved.
    pub fn mutate<T>(&self, f: impl FnOnce(&mut StateRoot) -> Result<T, AppError>) -> Result<T, AppError> {
        let out = {
            let mut local = store::lock(&self.store);
            let out = f(local.state_mut())?;
            local.save()?;
            out
        };
        self.sync.schedule(false);
        Ok(out)
    }

    pub fn plan(&self, mode: PlanMode) -> SessionPlan {
        let today = scheduler::today();
        let ids = self.catalog.phrase_ids();
        self.read(|state| scheduler::build_plan(&ids, &state.phrases, &state.settings, today, mode))
    }

    pub fn start_session(&self, mode: PlanMode) -> Result<ActiveSession, AppError> {
        let plan = self.plan(mode);
        if plan.is_empty() {
            return Err(AppError::EmptyPlan);
        }
        let today = scheduler::today();
        self.mutate(|state| session::start(state, plan, mode == PlanMode::ExtraPractice, today))
    }

    /// Rate one phrase, outside of any session.
    pub fn rate(&self, phrase_id: &str, rating: Rating) -> Result<(), AppError> {
        let today = scheduler::today();
        let known = self.catalog.has_phrase(phrase_id) || self.read(|s| s.phrases.contains_key(phrase_id));
        if !known {
            return Err(AppError::UnknownPhrase(phrase_id.to_string()));
        }
        debug!("Rating {} as {}", phrase_id, rating);
        self.mutate(|state| {
            session::record_rating(state, phrase_id, rating, today);
            Ok(())
        })
    }

    /// Rate one phrase as part of `active`.
    pub fn rate_in_session(&self, active: &mut ActiveSession, phrase_id: &str, rating: Rating) -> Result<(), AppError> {
        self.rate(phrase_id, rating)?;
        active.ratings.push((phrase_id.to_string(), rating));
        Ok(())
    }

    pub fn finish_session(&self, active: &ActiveSession, elapsed: Duration) -> Result<SessionSummary, AppError> {
        let today = scheduler::today();
        self.mutate(|state| Ok(session::finalize(state, active, elapsed, today, Utc::now())))
    }

    pub fn summary(&self) -> ProgressSummary {
        let today = scheduler::today();
        self.read(|state| {
            let learned = state.stats.phrases_learned;
            ProgressSummary {
                learned,
                total: self.catalog.phrases.len(),
                due: progress::due_count(state, today),
                recall_rate: progress::recall_rate(state),
                current_streak: state.stats.current_streak,
                longest_streak: state.stats.longest_streak,
                total_sessions: state.stats.total_sessions,
                total_minutes: state.stats.total_minutes,
                milestone: progress::milestone(learned),
                categories: progress::category_stats(state, &self.catalog),
                week: progress::weekly_tracker(state, today),
            }
        })
    }

    pub fn has_meaningful_progress(&self) -> bool {
        self.read(StateRoot::has_meaningful_progress)
    }

    fn recitation(&self, id: &str) -> Result<&Recitation, AppError> {
        self.catalog
            .recitation(id)
            .ok_or_else(|| AppError::UnknownRecitation(id.to_string()))
    }

    fn recitation_chunk(&self, id: &str, chunk_id: &str) -> Result<&Recitation, AppError> {
        let recitation = self.recitation(id)?;
        if !recitation.has_chunk(chunk_id) {
            return Err(AppError::UnknownChunk {
                recitation: id.to_string(),
                chunk: chunk_id.to_string(),
            });
        }
        Ok(recitation)
    }

    pub fn set_chunk_status(&self, recitation_id: &str, chunk_id: &str, status: ChunkStatus) -> Result<(), AppError> {
        let recitation = self.recitation_chunk(recitation_id, chunk_id)?;
        let today = scheduler::today();
        self.mutate(|state| {
            prayer::set_chunk_status(&mut state.prayer, recitation, chunk_id, status, today);
            Ok(())
        })
    }

    pub fn cycle_chunk_status(&self, recitation_id: &str, chunk_id: &str) -> Result<ChunkStatus, AppError> {
        let recitation = self.recitation_chunk(recitation_id, chunk_id)?;
        let today = scheduler::today();
        self.mutate(|state| Ok(prayer::cycle_chunk_status(&mut state.prayer, recitation, chunk_id, today)))
    }

    pub fn track_chunk_practiced(&self, recitation_id: &str, chunk_id: &str) -> Result<(), AppError> {
        let recitation = self.recitation_chunk(recitation_id, chunk_id)?;
        let today = scheduler::today();
        self.mutate(|state| {
            prayer::track_chunk_practiced(&mut state.prayer, recitation, chunk_id, today);
            Ok(())
        })
    }

    pub fn set_recitation_status(&self, recitation_id: &str, status: ChunkStatus) -> Result<(), AppError> {
        let recitation = self.recitation(recitation_id)?;
        let today = scheduler::today();
        self.mutate(|state| {
            prayer::set_full_status(&mut state.prayer, recitation, status, today);
            Ok(())
        })
    }

    pub fn record_prayer_test(&self, recitation_id: &str, hits: &[bool]) -> Result<ChunkStatus, AppError> {
        let recitation = self.recitation(recitation_id)?;
        let today = scheduler::today();
        self.mutate(|state| Ok(prayer::record_test(&mut state.prayer, recitation, hits, today)))
    }

    pub fn recitation_progress(&self, recitation_id: &str) -> Result<RecitationProgress, AppError> {
        let recitation = self.recitation(recitation_id)?;
        Ok(self.read(|state| prayer::recitation_progress(&state.prayer, recitation)))
    }

    pub fn prayer_target(&self) -> Option<PrayerTarget<'_>> {
        self.read(|state| prayer::today_target(&state.prayer, &self.catalog.recitations))
    }

    pub fn export_json(&self) -> Result<String, AppError> {
        Ok(store::lock(&self.store).export_json()?)
    }

    /// Replace the document with a backup. A rejected backup changes nothing.
    pub fn import_json(&self, text: &str) -> Result<(), AppError> {
        store::lock(&self.store).import_json(text)?;
        self.sync.schedule(false);
        Ok(())
    }

    /// Today's date as the trainer sees it.
    pub fn today(&self) -> NaiveDate {
        scheduler::today()
    }
}
