//! Recitation memorisation tracking.
//!
//! Each recitation is split into chunks that move through
//! new -> practicing -> memorised. The recitation's own status follows its
//! chunks unless set directly (e.g. after a full test).

use crate::catalog::Recitation;
use crate::store::{ChunkState, ChunkStatus, PrayerState, RecitationState};
use chrono::NaiveDate;
use serde::Serialize;

/// Hit rate at which a full test counts as memorised.
pub const MEMORISED_HIT_RATE: f64 = 0.85;
/// Hit rate at which a full test counts as practicing.
pub const PRACTICING_HIT_RATE: f64 = 0.4;

/// Get the state for `recitation`, creating it and any missing chunks.
pub fn ensure_recitation<'a>(prayer: &'a mut PrayerState, recitation: &Recitation) -> &'a mut RecitationState {
    let state = prayer.recitations.entry(recitation.id.clone()).or_default();
    for chunk_id in recitation.chunk_ids() {
        state.chunks.entry(chunk_id.to_string()).or_default();
    }
    state
}

/// Count a practice day, once per calendar date.
pub fn touch_activity(prayer: &mut PrayerState, today: NaiveDate) {
    if prayer.last_practice_date != Some(today) {
        prayer.total_practice_sessions += 1;
    }
    prayer.last_practice_date = Some(today);
}

fn status_of(state: &RecitationState, chunk_id: &str) -> ChunkStatus {
    state.chunks.get(chunk_id).map(|c| c.status).unwrap_or_default()
}

fn derived_status(state: &RecitationState, recitation: &Recitation) -> ChunkStatus {
    let mut statuses = recitation.chunk_ids().map(|id| status_of(state, id)).peekable();
    if statuses.peek().is_none() {
        // No chunks: vacuously memorised.
        return ChunkStatus::Memorised;
    }
    let statuses: Vec<ChunkStatus> = statuses.collect();
    if statuses.iter().all(|s| *s == ChunkStatus::Memorised) {
        ChunkStatus::Memorised
    } else if statuses.iter().any(|s| *s != ChunkStatus::New) {
        ChunkStatus::Practicing
    } else {
        ChunkStatus::New
    }
}

/// Recompute the recitation status from its chunks.
pub fn recalc_status(prayer: &mut PrayerState, recitation: &Recitation) -> ChunkStatus {
    let state = ensure_recitation(prayer, recitation);
    let status = derived_status(state, recitation);
    state.full_recitation_status = status;
    status
}

pub fn set_chunk_status(
    prayer: &mut PrayerState,
    recitation: &Recitation,
    chunk_id: &str,
    status: ChunkStatus,
    today: NaiveDate,
) {
    let state = ensure_recitation(prayer, recitation);
    state.chunks.insert(
        chunk_id.to_string(),
        ChunkState {
            status,
            last_practiced: Some(today),
        },
    );
    recalc_status(prayer, recitation);
    touch_activity(prayer, today);
}

/// Advance a chunk one step around the status cycle. Returns the new status.
pub fn cycle_chunk_status(
    prayer: &mut PrayerState,
    recitation: &Recitation,
    chunk_id: &str,
    today: NaiveDate,
) -> ChunkStatus {
    let current = status_of(ensure_recitation(prayer, recitation), chunk_id);
    let next = current.cycled();
    set_chunk_status(prayer, recitation, chunk_id, next, today);
    next
}

/// Stamp a chunk as practiced today without changing its status.
pub fn track_chunk_practiced(prayer: &mut PrayerState, recitation: &Recitation, chunk_id: &str, today: NaiveDate) {
    let state = ensure_recitation(prayer, recitation);
    state.chunks.entry(chunk_id.to_string()).or_default().last_practiced = Some(today);
    touch_activity(prayer, today);
}

/// Set the status of the whole recitation, adjusting chunks to match.
pub fn set_full_status(prayer: &mut PrayerState, recitation: &Recitation, status: ChunkStatus, today: NaiveDate) {
    let state = ensure_recitation(prayer, recitation);
    state.full_recitation_status = status;
    state.last_full_attempt = Some(today);

    match status {
        ChunkStatus::Memorised => {
            for chunk_id in recitation.chunk_ids() {
                state.chunks.insert(
                    chunk_id.to_string(),
                    ChunkState {
                        status: ChunkStatus::Memorised,
                        last_practiced: Some(today),
                    },
                );
            }
        }
        ChunkStatus::New => {
            for chunk_id in recitation.chunk_ids() {
                state.chunks.entry(chunk_id.to_string()).or_default().status = ChunkStatus::New;
            }
        }
        ChunkStatus::Practicing => {
            let has_practice = recitation
                .chunk_ids()
                .any(|id| status_of(state, id) != ChunkStatus::New);
            if let Some(first) = recitation.chunks.first().filter(|_| !has_practice) {
                state.chunks.insert(
                    first.id.clone(),
                    ChunkState {
                        status: ChunkStatus::Practicing,
                        last_practiced: Some(today),
                    },
                );
            }
        }
    }

    touch_activity(prayer, today);
}

/// Status earned by a full test with the given hit rate.
pub fn status_for_hit_rate(hit_rate: f64) -> ChunkStatus {
    if hit_rate >= MEMORISED_HIT_RATE {
        ChunkStatus::Memorised
    } else if hit_rate >= PRACTICING_HIT_RATE {
        ChunkStatus::Practicing
    } else {
        ChunkStatus::New
    }
}

/// Record a full recitation test. `hits[i]` says whether chunk `i` was
/// recalled; every tested chunk is stamped as practiced.
pub fn record_test(prayer: &mut PrayerState, recitation: &Recitation, hits: &[bool], today: NaiveDate) -> ChunkStatus {
    for (chunk, _) in recitation.chunks.iter().zip(hits) {
        track_chunk_practiced(prayer, recitation, &chunk.id, today);
    }

    let tested = hits.len().min(recitation.chunks.len());
    let hit_rate = if tested == 0 {
        0.0
    } else {
        hits.iter().take(tested).filter(|h| **h).count() as f64 / tested as f64
    };

    let status = status_for_hit_rate(hit_rate);
    set_full_status(prayer, recitation, status, today);
    status
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecitationProgress {
    pub status: ChunkStatus,
    pub total: usize,
    pub memorised: usize,
    pub practicing: usize,
}

pub fn recitation_progress(prayer: &PrayerState, recitation: &Recitation) -> RecitationProgress {
    let empty = RecitationState::default();
    let state = prayer.recitations.get(&recitation.id).unwrap_or(&empty);

    let mut memorised = 0;
    let mut practicing = 0;
    for id in recitation.chunk_ids() {
        match status_of(state, id) {
            ChunkStatus::Memorised => memorised += 1,
            ChunkStatus::Practicing => practicing += 1,
            ChunkStatus::New => {}
        }
    }

    RecitationProgress {
        status: derived_status(state, recitation),
        total: recitation.chunks.len(),
        memorised,
        practicing,
    }
}

/// What to work on next: the first recitation (in order) not yet memorised,
/// and its first chunk not yet memorised.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerTarget<'a> {
    pub recitation_id: &'a str,
    pub chunk_id: Option<&'a str>,
    pub progress: RecitationProgress,
}

/// `recitations` must already be sorted by order. Falls back to the first
/// recitation when everything is memorised.
pub fn today_target<'a>(prayer: &PrayerState, recitations: &'a [Recitation]) -> Option<PrayerTarget<'a>> {
    let rows: Vec<(&Recitation, RecitationProgress)> = recitations
        .iter()
        .map(|r| (r, recitation_progress(prayer, r)))
        .collect();

    let (recitation, progress) = rows
        .iter()
        .find(|(_, p)| p.status != ChunkStatus::Memorised)
        .or_else(|| rows.first())
        .cloned()?;

    let empty = RecitationState::default();
    let state = prayer.recitations.get(&recitation.id).unwrap_or(&empty);
    let chunk_id = recitation
        .chunk_ids()
        .find(|id| status_of(state, id) != ChunkStatus::Memorised)
        .or_else(|| recitation.chunk_ids().next());

    Some(PrayerTarget {
        recitation_id: &recitation.id,
        chunk_id,
        progress,
    })
}
