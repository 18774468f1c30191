//! Daily session bookkeeping on top of the scheduler.

use crate::error::AppError;
use crate::scheduler::{self, ItemKind, Rating, SessionPlan};
use crate::store::{ItemSchedule, SessionRecord, StateRoot};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::time::Duration;

/// A session in progress. Lives only in memory; nothing about it is
/// persisted until [`finalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSession {
    pub plan: SessionPlan,
    pub extra_practice: bool,
    pub ratings: Vec<(String, Rating)>,
    pub quickfire_correct: u32,
    pub quickfire_total: u32,
}

impl ActiveSession {
    pub fn successes(&self) -> usize {
        self.ratings.iter().filter(|(_, r)| r.is_success()).count()
    }

    pub fn record_quickfire(&mut self, correct: bool) {
        self.quickfire_total += 1;
        if correct {
            self.quickfire_correct += 1;
        }
    }
}

/// Get the schedule for `phrase_id`, creating a fresh one on first exposure.
pub fn ensure_schedule<'a>(state: &'a mut StateRoot, phrase_id: &str, today: NaiveDate) -> &'a mut ItemSchedule {
    state
        .phrases
        .entry(phrase_id.to_string())
        .or_insert_with(|| ItemSchedule::new(today))
}

/// Begin a session from `plan`, creating schedules for its new items.
pub fn start(
    state: &mut StateRoot,
    plan: SessionPlan,
    extra_practice: bool,
    today: NaiveDate,
) -> Result<ActiveSession, AppError> {
    if plan.is_empty() {
        return Err(AppError::EmptyPlan);
    }
    for item in plan.items.iter().filter(|i| i.kind == ItemKind::New) {
        ensure_schedule(state, &item.phrase_id, today);
    }
    Ok(ActiveSession {
        plan,
        extra_practice,
        ratings: Vec::new(),
        quickfire_correct: 0,
        quickfire_total: 0,
    })
}

/// Apply a rating to one item and update the running totals.
pub fn record_rating(state: &mut StateRoot, phrase_id: &str, rating: Rating, today: NaiveDate) {
    let schedule = ensure_schedule(state, phrase_id, today);
    scheduler::apply_rating(schedule, rating, today);

    if rating.is_success() {
        state.stats.total_correct += 1;
    } else {
        state.stats.total_incorrect += 1;
    }
    state.stats.phrases_learned = state.learned_count();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub elapsed_min: u64,
    pub reviewed: u32,
    pub new_learned: u32,
    pub accuracy: u32,
    pub quick_correct: u32,
    pub quick_total: u32,
}

fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (part as f64 / total as f64 * 100.0).round() as u32
}

/// Close `session`: update streak and totals, and merge today's record.
///
/// Totals and the streak move only for the first completed daily session of
/// the day; extra practice and repeat sessions just accumulate time.
pub fn finalize(
    state: &mut StateRoot,
    session: &ActiveSession,
    elapsed: Duration,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> SessionSummary {
    let elapsed_sec = elapsed.as_secs_f64().round().max(1.0) as u64;
    let elapsed_min = ((elapsed_sec as f64 / 60.0).round() as u64).max(1);
    let reviewed = session.plan.items.len() as u32;
    let new_learned = session.plan.new_count as u32;
    let accuracy = percent(session.successes(), session.ratings.len());

    let already_completed = state.sessions.get(&today).is_some_and(|s| s.completed);

    if !already_completed && !session.extra_practice {
        let stats = &mut state.stats;
        stats.total_sessions += 1;
        stats.total_minutes += elapsed_min;

        stats.current_streak = match stats.last_session_date {
            None => 1,
            Some(previous) => match (today - previous).num_days() {
                0 => stats.current_streak.max(1),
                1 => stats.current_streak + 1,
                _ => 1,
            },
        };
        stats.last_session_date = Some(today);
        stats.longest_streak = stats.longest_streak.max(stats.current_streak);
    }

    let previous = state.sessions.remove(&today).unwrap_or_default();
    state.sessions.insert(
        today,
        SessionRecord {
            completed: true,
            completed_at: Some(now),
            elapsed_sec: previous.elapsed_sec + elapsed_sec,
            reviewed,
            new_learned,
            accuracy,
            quickfire_score: percent(session.quickfire_correct as usize, session.quickfire_total as usize),
            quickfire_correct: session.quickfire_correct,
            quickfire_total: session.quickfire_total,
            extra_practice_count: previous.extra_practice_count + u32::from(session.extra_practice),
            ..previous
        },
    );

    state.stats.phrases_learned = state.learned_count();

    SessionSummary {
        elapsed_min,
        reviewed,
        new_learned,
        accuracy,
        quick_correct: session.quickfire_correct,
        quick_total: session.quickfire_total,
    }
}
