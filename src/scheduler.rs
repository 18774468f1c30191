//! Daily review planning and the box-based rating update.
//!
//! Items move through five boxes. Each box has a fixed review interval:
//!
//! | box | interval |
//! |-----|----------|
//! | 1   | 1 day    |
//! | 2   | 2 days   |
//! | 3   | 5 days   |
//! | 4   | 14 days  |
//! | 5   | 30 days  |

use crate::store::{ItemSchedule, Settings};
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub const MIN_BOX: u8 = 1;
pub const MAX_BOX: u8 = 5;

/// Smallest daily session worth running.
pub const MIN_INTERACTIONS: usize = 8;
/// Largest daily session before new items stop being injected.
pub const MAX_INTERACTIONS: usize = 12;

const INTERVAL_DAYS: [u64; 5] = [1, 2, 5, 14, 30];

/// Review interval in days for `box_level`, clamped into the valid box range.
pub fn interval_days(box_level: u8) -> u64 {
    let index = box_level.clamp(MIN_BOX, MAX_BOX) - MIN_BOX;
    INTERVAL_DAYS[index as usize]
}

/// Today's date as used for scheduling (UTC calendar day).
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Self-assessed recall for one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    /// `good` and `easy` count as correct answers.
    pub fn is_success(self) -> bool {
        matches!(self, Rating::Good | Rating::Easy)
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "again" => Ok(Rating::Again),
            "hard" => Ok(Rating::Hard),
            "good" => Ok(Rating::Good),
            "easy" => Ok(Rating::Easy),
            other => Err(format!("unknown rating: {}", other)),
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
        };
        f.write_str(s)
    }
}

/// Apply `rating` given on `today` to a schedule.
pub fn apply_rating(schedule: &mut ItemSchedule, rating: Rating, today: NaiveDate) {
    let current = schedule.box_level.clamp(MIN_BOX, MAX_BOX);

    let (next_box, interval) = match rating {
        Rating::Again => (MIN_BOX, interval_days(MIN_BOX)),
        Rating::Hard => (current, (interval_days(current) / 2).max(1)),
        Rating::Good => {
            let next = (current + 1).min(MAX_BOX);
            (next, interval_days(next))
        }
        Rating::Easy => {
            let next = (current + 2).min(MAX_BOX);
            (next, interval_days(next))
        }
    };

    if rating.is_success() {
        schedule.times_correct += 1;
    } else {
        schedule.times_incorrect += 1;
    }

    schedule.box_level = next_box;
    schedule.last_reviewed = Some(today);
    schedule.next_review = today.checked_add_days(Days::new(interval));
}

/// Whether a known item should be reviewed on `today`.
pub fn is_due(schedule: &ItemSchedule, today: NaiveDate) -> bool {
    match schedule.next_review {
        None => true,
        Some(next) => next <= today,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Review,
    New,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanItem {
    pub phrase_id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
}

impl PlanItem {
    fn review(id: &str) -> Self {
        Self {
            phrase_id: id.to_string(),
            kind: ItemKind::Review,
        }
    }

    fn new_item(id: &str) -> Self {
        Self {
            phrase_id: id.to_string(),
            kind: ItemKind::New,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    pub date: NaiveDate,
    pub items: Vec<PlanItem>,
    pub review_count: usize,
    pub new_count: usize,
    pub estimated_minutes: f64,
}

impl SessionPlan {
    fn from_items(date: NaiveDate, items: Vec<PlanItem>) -> Self {
        let review_count = items.iter().filter(|i| i.kind == ItemKind::Review).count();
        let new_count = items.len() - review_count;
        Self {
            date,
            estimated_minutes: estimated_minutes(items.len()),
            items,
            review_count,
            new_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Rough session length: under a minute per card plus warm-up, kept within 8..=12.
pub fn estimated_minutes(items: usize) -> f64 {
    let raw = ((items as f64 * 0.9 + 2.0) * 10.0).round() / 10.0;
    raw.clamp(8.0, 12.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanMode {
    #[default]
    Daily,
    /// Extra rounds drawn only from items already answered correctly.
    ExtraPractice,
}

/// Build the plan for `today`.
///
/// `catalog` is every item id in catalog order; `schedules` holds the state of
/// items seen before. Items in `schedules` but not in the catalog are ignored.
pub fn build_plan(
    catalog: &[&str],
    schedules: &BTreeMap<String, ItemSchedule>,
    settings: &Settings,
    today: NaiveDate,
    mode: PlanMode,
) -> SessionPlan {
    let known: Vec<(&str, &ItemSchedule)> = catalog
        .iter()
        .filter_map(|id| schedules.get(*id).map(|s| (*id, s)))
        .collect();

    match mode {
        PlanMode::Daily => daily_plan(catalog, schedules, &known, settings, today),
        PlanMode::ExtraPractice => extra_practice_plan(&known, settings, today),
    }
}

/// Due items, weakest box first, then longest since last review.
fn due_sorted<'a>(
    pool: &[(&'a str, &'a ItemSchedule)],
    today: NaiveDate,
) -> Vec<(&'a str, &'a ItemSchedule)> {
    let mut due: Vec<_> = pool
        .iter()
        .copied()
        .filter(|(_, s)| is_due(s, today))
        .collect();
    due.sort_by_key(|(_, s)| (s.box_level, s.last_reviewed));
    due
}

/// Remaining items closest to becoming due first; never-scheduled items last.
fn fillers_sorted<'a>(
    pool: &[(&'a str, &'a ItemSchedule)],
    used: &HashSet<&str>,
) -> Vec<&'a str> {
    let mut fillers: Vec<_> = pool
        .iter()
        .copied()
        .filter(|(id, _)| !used.contains(id))
        .collect();
    fillers.sort_by_key(|(_, s)| s.next_review.unwrap_or(NaiveDate::MAX));
    fillers.into_iter().map(|(id, _)| id).collect()
}

fn daily_plan(
    catalog: &[&str],
    schedules: &BTreeMap<String, ItemSchedule>,
    known: &[(&str, &ItemSchedule)],
    settings: &Settings,
    today: NaiveDate,
) -> SessionPlan {
    let max_reviews = settings.max_reviews_per_session;
    let new_per_session = settings.new_phrases_per_session;

    let reviews: Vec<&str> = due_sorted(known, today)
        .into_iter()
        .take(max_reviews)
        .map(|(id, _)| id)
        .collect();

    let new_pool: Vec<&str> = catalog
        .iter()
        .copied()
        .filter(|id| !schedules.contains_key(*id))
        .collect();

    let target = (reviews.len() + new_per_session).clamp(MIN_INTERACTIONS, MAX_INTERACTIONS);
    let new_needed = new_per_session
        .min(target.saturating_sub(reviews.len()))
        .min(new_pool.len());
    let new_items = &new_pool[..new_needed];

    let used: HashSet<&str> = reviews.iter().copied().collect();
    let shortfall = MIN_INTERACTIONS.saturating_sub(reviews.len() + new_items.len());
    let fillers: Vec<&str> = fillers_sorted(known, &used)
        .into_iter()
        .take(shortfall)
        .collect();

    let mut review_queue = reviews
        .iter()
        .chain(fillers.iter())
        .map(|id| PlanItem::review(id))
        .peekable();
    let mut new_queue = new_items.iter().map(|id| PlanItem::new_item(id)).peekable();

    let mut items = Vec::new();
    while review_queue.peek().is_some() || new_queue.peek().is_some() {
        items.extend(review_queue.next());
        items.extend(review_queue.next());
        items.extend(new_queue.next());
    }
    items.truncate(max_reviews);

    SessionPlan::from_items(today, items)
}

fn extra_practice_plan(
    known: &[(&str, &ItemSchedule)],
    settings: &Settings,
    today: NaiveDate,
) -> SessionPlan {
    let max_reviews = settings.max_reviews_per_session;
    let learned: Vec<(&str, &ItemSchedule)> = known
        .iter()
        .copied()
        .filter(|(_, s)| s.is_learned())
        .collect();

    let mut selected: Vec<&str> = due_sorted(&learned, today)
        .into_iter()
        .take(max_reviews)
        .map(|(id, _)| id)
        .collect();

    let target = max_reviews.min(MIN_INTERACTIONS.max(selected.len()));
    let used: HashSet<&str> = selected.iter().copied().collect();
    let shortfall = target.saturating_sub(selected.len());
    selected.extend(fillers_sorted(&learned, &used).into_iter().take(shortfall));

    let items = selected.into_iter().map(PlanItem::review).collect();
    SessionPlan::from_items(today, items)
}
