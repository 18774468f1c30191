use bangla10_srs::store::{ItemSchedule, LocalStore, StateRoot};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

fn day(raw: &str) -> NaiveDate {
    raw.parse().unwrap()
}

/// A persisted document is read back unchanged.
#[test]
fn test_persist_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("progress.json");

    let mut store = LocalStore::open(&path);
    store
        .state_mut()
        .phrases
        .insert("hello".to_string(), ItemSchedule::new(day("2024-03-01")));
    store.state_mut().stats.total_sessions = 2;
    store.save().unwrap();

    let reloaded = LocalStore::open(&path);
    assert_eq!(reloaded.state(), store.state());
    assert!(reloaded.state().meta.dirty);
    assert!(reloaded.state().meta.last_modified_at.is_some());
}

/// Writes leave no temporary file behind.
#[test]
fn test_no_leftover_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");

    let mut store = LocalStore::open(&path);
    store.save().unwrap();
    store.save().unwrap();

    assert!(path.exists());
    assert!(!dir.path().join("progress.json.tmp").exists());
}

/// A corrupt or wrongly-shaped slot yields a fresh document.
#[test]
fn test_corrupt_slot_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");

    fs::write(&path, "{not json").unwrap();
    assert_eq!(LocalStore::open(&path).state(), &StateRoot::default());

    fs::write(&path, "[1, 2, 3]").unwrap();
    assert_eq!(LocalStore::open(&path).state(), &StateRoot::default());

    let missing = dir.path().join("missing.json");
    assert_eq!(LocalStore::open(&missing).state(), &StateRoot::default());
}

/// Partially-shaped documents from older versions are filled in.
#[test]
fn test_partial_document_is_normalized() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    fs::write(
        &path,
        r#"{"stats": {"currentStreak": 4}, "meta": {"revision": "3"}, "theme": "dark"}"#,
    )
    .unwrap();

    let store = LocalStore::open(&path);
    let state = store.state();
    assert_eq!(state.stats.current_streak, 4);
    assert_eq!(state.stats.total_sessions, 0);
    assert_eq!(state.meta.revision, 3);
    assert_eq!(state.settings.new_phrases_per_session, 3);
    assert_eq!(state.extra["theme"], "dark");

    store.persist().unwrap();
    let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["theme"], "dark", "unknown fields survive a rewrite");
}

/// One unreadable entry in a stored slot does not cost the rest of the progress.
#[test]
fn test_damaged_entries_do_not_wipe_progress() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.json");
    fs::write(
        &path,
        json!({
            "phrases": {
                "hello": {"box": 3, "timesCorrect": 4},
                "thanks": {"box": null}
            },
            "stats": {"totalSessions": 9, "longestStreak": "many"},
            "sessions": {"2024-05-01": {"completed": true}, "someday": {}}
        })
        .to_string(),
    )
    .unwrap();

    let store = LocalStore::open(&path);
    let state = store.state();
    assert_eq!(state.phrases.len(), 1);
    assert_eq!(state.phrases["hello"].box_level, 3);
    assert_eq!(state.stats.total_sessions, 9);
    assert_eq!(state.stats.longest_streak, 0);
    assert_eq!(state.sessions.len(), 1);
    assert!(state.sessions[&day("2024-05-01")].completed);
}

#[test]
fn test_modification_stamps_increase() {
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
fn test_export_then_import() {
    let dir = TempDir::new().unwrap();
    let mut source = LocalStore::open(dir.path().join("a.json"));
    source
        .state_mut()
        .phrases
        .insert("thanks".to_string(), ItemSchedule::new(day("2024-03-01")));
    source.state_mut().stats.phrases_learned = 1;
    let backup = source.export_json().unwrap();

    let mut target = LocalStore::open(dir.path().join("b.json"));
    target.import_json(&backup).unwrap();

    assert!(target.state().phrases.contains_key("thanks"));
    assert_eq!(target.state().stats.phrases_learned, 1);
    assert!(target.state().meta.dirty, "an import syncs like any local edit");
}

#[test]
fn test_import_rejects_bad_backups() {
    let dir = TempDir::new().unwrap();
    let mut store = LocalStore::open(dir.path().join("progress.json"));
    store.state_mut().stats.total_sessions = 5;

    for backup in [
        "not json".to_string(),
        json!([1, 2]).to_string(),
        json!({"phrases": {}}).to_string(),
        json!({"stats": {"totalSessions": "five"}, "phrases": "oops"}).to_string(),
    ] {
        assert!(store.import_json(&backup).is_err());
    }
    assert_eq!(store.state().stats.total_sessions, 5, "rejected backups change nothing");
}
