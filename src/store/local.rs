//! Durable on-device slot holding the canonical document.
//!
//! The slot is a single JSON file. Reads never fail the caller: a missing or
//! corrupt file yields a fresh default document. Writes go through a
//! temporary file and a rename while holding an exclusive lock on a sibling
//! lock file, so two processes sharing the slot never interleave a write.

use super::schema::{
    ItemSchedule, Meta, PrayerState, RecitationState, Settings, StateRoot, Stats,
    STORAGE_VERSION,
};
use crate::envelope::parse_timestamp;
use crate::error::StoreError;
use chrono::Utc;
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Logical name of the local slot.
pub const STORAGE_KEY: &str = "bangla10-srs";

/// Owner of the in-memory document and its durable slot.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    state: StateRoot,
}

impl LocalStore {
    /// Open the slot at `path`, hydrating synchronously.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load(&path);
        Self { path, state }
    }

    /// Wrap an already-built document (nothing is written until `persist`).
    pub fn with_state(path: impl Into<PathBuf>, state: StateRoot) -> Self {
        Self {
            path: path.into(),
            state,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &StateRoot {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateRoot {
        &mut self.state
    }

    /// Write the current document through to the slot.
    pub fn persist(&self) -> Result<(), StoreError> {
        persist(&self.path, &self.state)
    }

    /// Stamp the document as locally modified and persist it.
    pub fn save(&mut self) -> Result<(), StoreError> {
        self.state.mark_modified(Utc::now());
        self.persist()
    }

    /// Replace the whole document (e.g. with a fresher remote copy) and persist it.
    pub fn replace(&mut self, state: StateRoot) -> Result<(), StoreError> {
        self.state = state;
        self.persist()
    }

    /// Immutable deep copy of the document as it would be sent over the wire.
    pub fn snapshot(&self) -> Result<Value, StoreError> {
        Ok(serde_json::to_value(&self.state)?)
    }

    /// Pretty JSON backup of the document.
    pub fn export_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.state)?)
    }

    /// Replace the document with a backup. Nothing changes if the backup is rejected.
    ///
    /// The imported document is saved as a local edit so it syncs like any other.
    pub fn import_json(&mut self, text: &str) -> Result<(), StoreError> {
        let parsed: Value = serde_json::from_str(text)
            .map_err(|e| StoreError::InvalidBackup(e.to_string()))?;
        let obj = parsed
            .as_object()
            .ok_or_else(|| StoreError::InvalidBackup("not an object".to_string()))?;
        let (Some(stats), Some(phrases)) = (obj.get("stats"), obj.get("phrases")) else {
            return Err(StoreError::InvalidBackup(
                "missing stats or phrases".to_string(),
            ));
        };
        serde_json::from_value::<Stats>(stats.clone())
            .map_err(|e| StoreError::InvalidBackup(format!("stats: {}", e)))?;
        serde_json::from_value::<BTreeMap<String, ItemSchedule>>(phrases.clone())
            .map_err(|e| StoreError::InvalidBackup(format!("phrases: {}", e)))?;

        let mut imported = normalize(&parsed);
        imported.meta.dirty = false;

        self.state = imported;
        self.save()
    }
}

/// Read the slot at `path`, falling back to a default document.
pub fn load(path: &Path) -> StateRoot {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No local state at {}, starting fresh", path.display());
            return StateRoot::default();
        }
        Err(e) => {
            warn!("Failed to read local state {}: {}", path.display(), e);
            return StateRoot::default();
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(value @ Value::Object(_)) => normalize(&value),
        Ok(_) => {
            warn!("Local state {} is not an object, starting fresh", path.display());
            StateRoot::default()
        }
        Err(e) => {
            warn!("Local state {} is corrupt ({}), starting fresh", path.display(), e);
            StateRoot::default()
        }
    }
}

/// Write `state` to the slot at `path`.
pub fn persist(path: &Path, state: &StateRoot) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let lock_path = sibling(path, "lock");
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)?;
    lock.lock_exclusive()?;

    let result = write_atomically(path, state);

    if let Err(e) = lock.unlock() {
        warn!("Failed to release lock {}: {}", lock_path.display(), e);
    }
    result
}

fn write_atomically(path: &Path, state: &StateRoot) -> Result<(), StoreError> {
    let json = serde_json::to_vec(state)?;
    let tmp_path = sibling(path, "tmp");
    {
        let mut tmp = fs::File::create(&tmp_path)?;
        tmp.write_all(&json)?;
        tmp.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Build a full document from a partially-shaped one.
///
/// Struct sections are merged field by field over their defaults and map
/// sections are decoded entry by entry, so a mistyped field or a broken entry
/// costs only that field or entry. `meta.revision` is coerced to a
/// non-negative integer and `meta.dirty` to a boolean.
pub fn normalize(input: &Value) -> StateRoot {
    let empty = Map::new();
    let parsed = input.as_object().unwrap_or(&empty);

    let mut extra = parsed.clone();
    for key in [
        "version", "meta", "phrases", "stats", "sessions", "settings", "prayer",
    ] {
        extra.remove(key);
    }

    StateRoot {
        version: STORAGE_VERSION,
        meta: normalize_meta(parsed.get("meta")),
        phrases: entries(parsed.get("phrases"), "phrases"),
        stats: merged::<Stats>(parsed.get("stats"), "stats"),
        sessions: entries(parsed.get("sessions"), "sessions"),
        settings: merged::<Settings>(parsed.get("settings"), "settings"),
        prayer: normalize_prayer(parsed.get("prayer")),
        extra,
    }
}

fn normalize_meta(raw: Option<&Value>) -> Meta {
    let Some(Value::Object(meta)) = raw else {
        return Meta::default();
    };

    let timestamp = |key: &str| meta.get(key).and_then(Value::as_str).and_then(parse_timestamp);

    Meta {
        revision: coerce_revision(meta.get("revision")),
        last_modified_at: timestamp("lastModifiedAt"),
        last_synced_at: timestamp("lastSyncedAt"),
        dirty: truthy(meta.get("dirty")),
    }
}

/// Numeric coercion for revisions: numbers and numeric strings, else 0.
pub fn coerce_revision(raw: Option<&Value>) -> u64 {
    let n = match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };
    if n.is_finite() && n > 0.0 {
        n.trunc() as u64
    } else {
        0
    }
}

fn truthy(raw: Option<&Value>) -> bool {
    match raw {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn not_an_object(raw: Option<&Value>, section: &str) {
    if raw.is_some_and(|v| !v.is_null()) {
        warn!("Discarding '{}': not an object", section);
    }
}

/// Decode a map section one entry at a time, dropping only the entries whose
/// key or value cannot be read.
fn entries_with<K, V>(
    raw: Option<&Value>,
    section: &str,
    decode: impl Fn(&Value) -> Result<V, String>,
) -> BTreeMap<K, V>
where
    K: FromStr + Ord,
{
    let Some(Value::Object(map)) = raw else {
        not_an_object(raw, section);
        return BTreeMap::new();
    };

    map.iter()
        .filter_map(|(key, value)| {
            let Ok(parsed_key) = key.parse::<K>() else {
                warn!("Dropping '{}' entry with unreadable key {:?}", section, key);
                return None;
            };
            match decode(value) {
                Ok(parsed) => Some((parsed_key, parsed)),
                Err(e) => {
                    warn!("Dropping '{}' entry {:?}: {}", section, key, e);
                    None
                }
            }
        })
        .collect()
}

fn entries<K, V>(raw: Option<&Value>, section: &str) -> BTreeMap<K, V>
where
    K: FromStr + Ord,
    V: DeserializeOwned,
{
    entries_with(raw, section, |value| {
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())
    })
}

/// Merge a struct section over its defaults one field at a time. A field that
/// does not deserialize keeps its default; every other field is kept.
fn merged<T>(raw: Option<&Value>, section: &str) -> T
where
    T: DeserializeOwned + Default + Serialize,
{
    let Some(Value::Object(incoming)) = raw else {
        not_an_object(raw, section);
        return T::default();
    };

    let mut fields = match serde_json::to_value(T::default()) {
        Ok(Value::Object(base)) => base,
        _ => Map::new(),
    };
    for (field, value) in incoming {
        let previous = fields.insert(field.clone(), value.clone());
        if let Err(e) = serde_json::from_value::<T>(Value::Object(fields.clone())) {
            warn!("Ignoring '{}.{}': {}", section, field, e);
            match previous {
                Some(previous) => fields.insert(field.clone(), previous),
                None => fields.remove(field),
            };
        }
    }

    serde_json::from_value(Value::Object(fields)).unwrap_or_else(|e| {
        warn!("Discarding unreadable '{}' section: {}", section, e);
        T::default()
    })
}

fn normalize_prayer(raw: Option<&Value>) -> PrayerState {
    let Some(Value::Object(incoming)) = raw else {
        not_an_object(raw, "prayer");
        return PrayerState::default();
    };

    let mut rest = incoming.clone();
    let recitations = rest.remove("recitations");
    let mut prayer: PrayerState = merged(Some(&Value::Object(rest)), "prayer");
    prayer.recitations = entries_with(
        recitations.as_ref(),
        "prayer.recitations",
        normalize_recitation,
    );
    prayer
}

fn normalize_recitation(raw: &Value) -> Result<RecitationState, String> {
    let Value::Object(incoming) = raw else {
        return Err("not an object".to_string());
    };

    let mut rest = incoming.clone();
    let chunks = rest.remove("chunks");
    let mut recitation: RecitationState = merged(Some(&Value::Object(rest)), "recitation");
    recitation.chunks = entries(chunks.as_ref(), "recitation.chunks");
    Ok(recitation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChunkStatus;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_normalize_fills_missing_sections() {
        let state = normalize(&json!({"phrases": {}}));
        assert_eq!(state, StateRoot::default());
    }

    #[test]
    fn test_normalize_coerces_meta() {
        let state = normalize(&json!({
            "meta": {"revision": "12", "dirty": 1, "lastModifiedAt": "2024-01-02T03:04:05.000Z"}
        }));
        assert_eq!(state.meta.revision, 12);
        assert!(state.meta.dirty);
        assert!(state.meta.last_modified_at.is_some());

        let state = normalize(&json!({"meta": {"revision": -4, "dirty": ""}}));
        assert_eq!(state.meta.revision, 0);
        assert!(!state.meta.dirty);

        let state = normalize(&json!({"meta": {"revision": 2.9, "dirty": null}}));
        assert_eq!(state.meta.revision, 2);
    }

    #[test]
    fn test_normalize_merges_partial_settings() {
        let state = normalize(&json!({"settings": {"maxReviewsPerSession": 20}}));
        assert_eq!(state.settings.max_reviews_per_session, 20);
        assert_eq!(state.settings.new_phrases_per_session, 3);
        assert_eq!(state.settings.daily_goal, 10);
    }

    #[test]
    fn test_normalize_keeps_unknown_fields_and_resets_version() {
        let state = normalize(&json!({"version": 0, "theme": "dark"}));
        assert_eq!(state.version, STORAGE_VERSION);
        assert_eq!(state.extra["theme"], "dark");
    }

    #[test]
    fn test_normalize_survives_broken_section() {
        let state = normalize(&json!({
            "phrases": "oops",
            "stats": {"totalSessions": 2}
        }));
        assert!(state.phrases.is_empty());
        assert_eq!(state.stats.total_sessions, 2);
    }

    #[test]
    fn test_broken_phrase_entry_drops_only_that_entry() {
        let state = normalize(&json!({
            "phrases": {
                "hello": {"box": 2, "timesCorrect": 3},
                "thanks": {"box": "two"},
                "water": {"box": 1}
            }
        }));
        assert_eq!(state.phrases.len(), 2);
        assert_eq!(state.phrases["hello"].times_correct, 3);
        assert!(state.phrases.contains_key("water"));
        assert!(!state.phrases.contains_key("thanks"));
    }

    #[test]
    fn test_unreadable_session_date_drops_only_that_session() {
        let state = normalize(&json!({
            "sessions": {
                "2024-05-01": {"completed": true, "elapsedSec": 300},
                "yesterday": {"completed": true},
                "2024-05-03": {"elapsedSec": "long"}
            }
        }));
        assert_eq!(state.sessions.len(), 1);
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(state.sessions[&day].elapsed_sec, 300);
    }

    #[test]
    fn test_mistyped_field_keeps_rest_of_section() {
        let state = normalize(&json!({
            "stats": {"totalSessions": 7, "lastSessionDate": "not a date", "currentStreak": 2},
            "settings": {"dailyGoal": "ten", "maxReviewsPerSession": 20}
        }));
        assert_eq!(state.stats.total_sessions, 7);
        assert_eq!(state.stats.current_streak, 2);
        assert_eq!(state.stats.last_session_date, None);
        assert_eq!(state.settings.daily_goal, 10);
        assert_eq!(state.settings.max_reviews_per_session, 20);
    }

    #[test]
    fn test_broken_recitation_parts_are_dropped_individually() {
        let state = normalize(&json!({
            "prayer": {
                "totalPracticeSessions": 4,
                "lastPracticeDate": 17,
                "recitations": {
                    "fatiha": {
                        "fullRecitationStatus": "practicing",
                        "chunks": {"0": {"status": "memorised"}, "1": {"status": "shaky"}}
                    },
                    "ikhlas": "oops"
                }
            }
        }));
        let prayer = &state.prayer;
        assert_eq!(prayer.total_practice_sessions, 4);
        assert_eq!(prayer.last_practice_date, None);
        assert_eq!(prayer.recitations.len(), 1);

        let fatiha = &prayer.recitations["fatiha"];
        assert_eq!(fatiha.full_recitation_status, ChunkStatus::Practicing);
        assert_eq!(fatiha.chunks.len(), 1);
        assert_eq!(fatiha.chunks["0"].status, ChunkStatus::Memorised);
    }

    #[test]
    fn test_import_rejects_mistyped_backup_before_touching_state() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut store = LocalStore::open(dir.path().join("progress.json"));
        store.state_mut().stats.total_sessions = 5;
        let before = store.state().clone();

        for backup in [
            json!({"stats": {"totalSessions": "five"}, "phrases": {}}),
            json!({"stats": {}, "phrases": "oops"}),
            json!({"stats": {}, "phrases": {"hello": {"box": "two"}}}),
        ] {
            let err = store.import_json(&backup.to_string()).unwrap_err();
            assert!(matches!(err, StoreError::InvalidBackup(_)), "unexpected error: {}", err);
        }
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn test_non_object_input_is_default() {
        assert_eq!(normalize(&json!([1, 2])), StateRoot::default());
        assert_eq!(normalize(&Value::Null), StateRoot::default());
    }

    #[test]
    fn test_coerce_revision() {
        assert_eq!(coerce_revision(None), 0);
        assert_eq!(coerce_revision(Some(&json!(5))), 5);
        assert_eq!(coerce_revision(Some(&json!("abc"))), 0);
        assert_eq!(coerce_revision(Some(&json!(f64::MAX))), u64::MAX);
    }
}
