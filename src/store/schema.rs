//! Shape of the persisted trainer document.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Current layout version of the local document.
pub const STORAGE_VERSION: u32 = 1;

/// The canonical client-side document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateRoot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub phrases: BTreeMap<String, ItemSchedule>,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub sessions: BTreeMap<NaiveDate, SessionRecord>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub prayer: PrayerState,
    /// Top-level fields this version does not know about, kept for lossless round-trips.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_version() -> u32 {
    STORAGE_VERSION
}

/// Sync bookkeeping stored alongside the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meta {
    pub revision: u64,
    pub last_modified_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub dirty: bool,
}

/// Per-item spaced-repetition state, created on first exposure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSchedule {
    #[serde(rename = "box")]
    pub box_level: u8,
    #[serde(default)]
    pub last_reviewed: Option<NaiveDate>,
    #[serde(default)]
    pub next_review: Option<NaiveDate>,
    #[serde(default)]
    pub times_correct: u32,
    #[serde(default)]
    pub times_incorrect: u32,
    #[serde(default)]
    pub date_added: Option<NaiveDate>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemSchedule {
    /// A fresh schedule for an item first seen on `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            box_level: 1,
            last_reviewed: None,
            next_review: None,
            times_correct: 0,
            times_incorrect: 0,
            date_added: Some(today),
            extra: Map::new(),
        }
    }

    pub fn is_learned(&self) -> bool {
        self.times_correct > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub total_sessions: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_session_date: Option<NaiveDate>,
    pub total_minutes: u64,
    pub phrases_learned: u32,
    pub total_correct: u64,
    pub total_incorrect: u64,
}

/// Accumulated record of all sessions on one calendar date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionRecord {
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_sec: u64,
    pub reviewed: u32,
    pub new_learned: u32,
    pub accuracy: u32,
    pub quickfire_score: u32,
    pub quickfire_correct: u32,
    pub quickfire_total: u32,
    pub extra_practice_count: u32,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub daily_goal: u32,
    pub new_phrases_per_session: usize,
    pub max_reviews_per_session: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daily_goal: 10,
            new_phrases_per_session: 3,
            max_reviews_per_session: 12,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrayerState {
    pub recitations: BTreeMap<String, RecitationState>,
    pub last_practice_date: Option<NaiveDate>,
    pub total_practice_sessions: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecitationState {
    pub chunks: BTreeMap<String, ChunkState>,
    pub full_recitation_status: ChunkStatus,
    pub last_full_attempt: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkState {
    pub status: ChunkStatus,
    pub last_practiced: Option<NaiveDate>,
}

/// Memorisation progress of a prayer chunk or a whole recitation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    #[default]
    New,
    Practicing,
    Memorised,
}

impl ChunkStatus {
    /// Next status in the new -> practicing -> memorised -> new cycle.
    pub fn cycled(self) -> Self {
        match self {
            ChunkStatus::New => ChunkStatus::Practicing,
            ChunkStatus::Practicing => ChunkStatus::Memorised,
            ChunkStatus::Memorised => ChunkStatus::New,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::New => "new",
            ChunkStatus::Practicing => "practicing",
            ChunkStatus::Memorised => "memorised",
        }
    }
}

impl std::str::FromStr for ChunkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ChunkStatus::New),
            "practicing" => Ok(ChunkStatus::Practicing),
            "memorised" | "memorized" => Ok(ChunkStatus::Memorised),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

impl Default for StateRoot {
    fn default() -> Self {
        Self {
            version: STORAGE_VERSION,
            meta: Meta::default(),
            phrases: BTreeMap::new(),
            stats: Stats::default(),
            sessions: BTreeMap::new(),
            settings: Settings::default(),
            prayer: PrayerState::default(),
            extra: Map::new(),
        }
    }
}

impl StateRoot {
    /// Whether the document holds anything worth pushing to a fresh remote.
    pub fn has_meaningful_progress(&self) -> bool {
        self.stats.total_sessions > 0
            || self.stats.phrases_learned > 0
            || !self.phrases.is_empty()
            || !self.sessions.is_empty()
            || self.prayer.total_practice_sessions > 0
            || !self.prayer.recitations.is_empty()
    }

    /// Recency used to compare documents during bootstrap.
    ///
    /// Falls back to the end of the last session day when the document was
    /// never stamped, and to the epoch when there is nothing at all.
    pub fn freshness(&self) -> DateTime<Utc> {
        if let Some(modified) = self.meta.last_modified_at {
            return modified;
        }
        if let Some(day) = self.stats.last_session_date {
            let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
            return day.and_time(end_of_day).and_utc();
        }
        DateTime::<Utc>::UNIX_EPOCH
    }

    /// Record a local edit: stamp `lastModifiedAt` and mark the document dirty.
    ///
    /// Stamps are strictly increasing so an edit racing an in-flight push is
    /// always distinguishable from the snapshot that was sent.
    pub fn mark_modified(&mut self, now: DateTime<Utc>) {
        let stamp = match self.meta.last_modified_at {
            Some(prev) if prev >= now => prev + Duration::milliseconds(1),
            _ => now,
        };
        self.meta.last_modified_at = Some(stamp);
        self.meta.dirty = true;
    }

    /// Number of items answered correctly at least once.
    pub fn learned_count(&self) -> u32 {
        self.phrases.values().filter(|s| s.is_learned()).count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_document_shape() {
        let value = serde_json::to_value(StateRoot::default()).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["meta"]["revision"], 0);
        assert_eq!(value["meta"]["dirty"], false);
        assert_eq!(value["settings"]["newPhrasesPerSession"], 3);
        assert_eq!(value["settings"]["maxReviewsPerSession"], 12);
        assert_eq!(value["prayer"]["totalPracticeSessions"], 0);
    }

    #[test]
    fn test_item_schedule_uses_box_key() {
        let schedule = ItemSchedule::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let value = serde_json::to_value(&schedule).unwrap();
        assert_eq!(value["box"], 1);
        assert_eq!(value["dateAdded"], "2024-03-01");
        assert!(value["nextReview"].is_null());
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let raw = json!({"version": 1, "customFlag": {"x": 1}});
        let state: StateRoot = serde_json::from_value(raw).unwrap();
        assert_eq!(state.extra["customFlag"]["x"], 1);
        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["customFlag"]["x"], 1);
    }

    #[test]
    fn test_unknown_item_and_session_fields_survive_round_trip() {
        let raw = json!({
            "phrases": {"hello": {"box": 2, "audioHint": "slow"}},
            "sessions": {"2024-05-02": {"completed": true, "mood": "tired"}}
        });
        let state: StateRoot = serde_json::from_value(raw).unwrap();
        assert_eq!(state.phrases["hello"].extra["audioHint"], "slow");

        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["phrases"]["hello"]["audioHint"], "slow");
        assert_eq!(back["phrases"]["hello"]["box"], 2);
        assert_eq!(back["sessions"]["2024-05-02"]["mood"], "tired");
        assert_eq!(back["sessions"]["2024-05-02"]["completed"], true);
    }

    #[test]
    fn test_freshness_falls_back_to_session_date() {
        let mut state = StateRoot::default();
        assert_eq!(state.freshness(), DateTime::<Utc>::UNIX_EPOCH);

        state.stats.last_session_date = NaiveDate::from_ymd_opt(2024, 5, 2);
        assert_eq!(state.freshness().to_rfc3339(), "2024-05-02T23:59:59+00:00");
    }

    #[test]
    fn test_mark_modified_is_strictly_increasing() {
        let mut state = StateRoot::default();
        let now = Utc::now();
        state.mark_modified(now);
        let first = state.meta.last_modified_at.unwrap();
        state.mark_modified(now);
        let second = state.meta.last_modified_at.unwrap();
        assert!(second > first);
        assert!(state.meta.dirty);
    }

    #[test]
    fn test_meaningful_progress() {
        let mut state = StateRoot::default();
        assert!(!state.has_meaningful_progress());
        state.prayer.total_practice_sessions = 1;
        assert!(state.has_meaningful_progress());
    }

    #[test]
    fn test_chunk_status_cycle() {
        assert_eq!(ChunkStatus::New.cycled(), ChunkStatus::Practicing);
        assert_eq!(ChunkStatus::Practicing.cycled(), ChunkStatus::Memorised);
        assert_eq!(ChunkStatus::Memorised.cycled(), ChunkStatus::New);
    }
}
