//! Read-only summaries of the trainer document.

use crate::catalog::Catalog;
use crate::scheduler::{self, MAX_BOX};
use crate::store::StateRoot;
use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;

const MILESTONES: [u32; 6] = [10, 25, 50, 100, 200, 500];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub id: String,
    pub name: String,
    pub starter_count: usize,
    pub learned_count: usize,
    /// Items that reached the top box.
    pub mastery_count: usize,
}

/// Per-category counts, in category order. Phrases in unknown categories are skipped.
pub fn category_stats(state: &StateRoot, catalog: &Catalog) -> Vec<CategoryStats> {
    let mut rows: Vec<CategoryStats> = catalog
        .categories
        .iter()
        .map(|c| CategoryStats {
            id: c.id.clone(),
            name: c.name.clone(),
            starter_count: 0,
            learned_count: 0,
            mastery_count: 0,
        })
        .collect();

    for phrase in &catalog.phrases {
        let Some(row) = rows.iter_mut().find(|r| r.id == phrase.category) else {
            continue;
        };
        row.starter_count += 1;
        if let Some(schedule) = state.phrases.get(&phrase.id) {
            if schedule.is_learned() {
                row.learned_count += 1;
            }
            if schedule.box_level >= MAX_BOX {
                row.mastery_count += 1;
            }
        }
    }
    rows
}

/// Percentage of all ratings that were successes.
pub fn recall_rate(state: &StateRoot) -> u32 {
    let attempts = state.stats.total_correct + state.stats.total_incorrect;
    if attempts == 0 {
        return 0;
    }
    (state.stats.total_correct as f64 / attempts as f64 * 100.0).round() as u32
}

/// Items due for review on `today`.
pub fn due_count(state: &StateRoot, today: NaiveDate) -> usize {
    state
        .phrases
        .values()
        .filter(|s| scheduler::is_due(s, today))
        .count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub next: u32,
    pub remaining: u32,
}

/// Next learned-count milestone.
pub fn milestone(learned: u32) -> Milestone {
    let next = MILESTONES
        .iter()
        .copied()
        .find(|m| *m > learned)
        .unwrap_or(MILESTONES[MILESTONES.len() - 1]);
    Milestone {
        next,
        remaining: next.saturating_sub(learned),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeekDay {
    pub date: NaiveDate,
    pub done: bool,
    pub minutes: u64,
}

/// Monday-to-Sunday activity for the week containing `today`.
pub fn weekly_tracker(state: &StateRoot, today: NaiveDate) -> Vec<WeekDay> {
    let offset = u64::from(today.weekday().num_days_from_monday());
    let monday = today.checked_sub_days(Days::new(offset)).unwrap_or(today);

    (0..7)
        .filter_map(|i| monday.checked_add_days(Days::new(i)))
        .map(|date| {
            let session = state.sessions.get(&date);
            WeekDay {
                date,
                done: session.is_some_and(|s| s.completed),
                minutes: session
                    .map(|s| (s.elapsed_sec as f64 / 60.0).round() as u64)
                    .unwrap_or(0),
            }
        })
        .collect()
}
