// src/history.rs
//! Read-only views over completed workouts: relative-date buckets, volume,
//! streaks and the training heat map.
//!
//! Everything here is computed at call time against an injected "now", so a
//! workout viewed across midnight moves buckets on the next call.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use strum_macros::EnumIter;

use crate::db::{Exercise, HistorySet, SessionSet, WorkoutHistoryItem};

/// The streak walk never looks further back than this.
pub const STREAK_LOOKBACK_DAYS: i64 = 365;
pub const DEFAULT_HEATMAP_WEEKS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, Serialize)]
pub enum DateGroup {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    Earlier,
}

impl DateGroup {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Today => "Today",
            Self::Yesterday => "Yesterday",
            Self::ThisWeek => "This Week",
            Self::LastWeek => "Last Week",
            Self::Earlier => "Earlier",
        }
    }
}

/// Buckets a calendar day against `today`. Compares whole days, so exactly
/// seven days back is `LastWeek` whatever the time of day. Dates after today
/// land in `ThisWeek`.
pub fn relative_date_group(date: NaiveDate, today: NaiveDate) -> DateGroup {
    match (today - date).num_days() {
        0 => DateGroup::Today,
        1 => DateGroup::Yesterday,
        d if d < 7 => DateGroup::ThisWeek,
        d if d < 14 => DateGroup::LastWeek,
        _ => DateGroup::Earlier,
    }
}

/// The calendar day a UTC instant falls on in `tz`.
pub fn local_day<Tz: TimeZone>(ts: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    ts.with_timezone(tz).date_naive()
}

/// Groups workouts by the local day they ended on. Buckets come back in
/// `Today..Earlier` order, empty ones omitted; workouts keep their input
/// order inside a bucket.
pub fn group_by_relative_date<'a, Tz: TimeZone>(
    workouts: &'a [WorkoutHistoryItem],
    now: &DateTime<Tz>,
) -> Vec<(DateGroup, Vec<&'a WorkoutHistoryItem>)> {
    let tz = now.timezone();
    let today = now.date_naive();
    let mut groups: BTreeMap<DateGroup, Vec<&WorkoutHistoryItem>> = BTreeMap::new();
    for w in workouts {
        let group = relative_date_group(local_day(w.ended_at, &tz), today);
        groups.entry(group).or_default().push(w);
    }
    groups.into_iter().collect()
}

/// Anything that carries reps and an optional weight.
pub trait LoggedSet {
    fn reps(&self) -> u32;
    fn weight_kg(&self) -> Option<f64>;
}

impl LoggedSet for SessionSet {
    fn reps(&self) -> u32 {
        self.reps
    }
    fn weight_kg(&self) -> Option<f64> {
        self.weight_kg
    }
}

impl LoggedSet for HistorySet {
    fn reps(&self) -> u32 {
        self.reps
    }
    fn weight_kg(&self) -> Option<f64> {
        self.weight_kg
    }
}

/// Σ weight × reps in kg. Sets without a weight count as zero.
pub fn compute_volume<S: LoggedSet>(sets: &[S]) -> f64 {
    sets.iter()
        .map(|s| s.weight_kg().unwrap_or(0.0) * f64::from(s.reps()))
        .sum()
}

/// `—` for no volume, otherwise e.g. `12,340kg`.
pub fn format_volume(volume_kg: f64) -> String {
    let rounded = volume_kg.round();
    if rounded == 0.0 {
        return "—".to_string();
    }
    format!("{}kg", group_thousands(rounded as i64))
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Consecutive days with a workout, walking back from `today`.
///
/// An empty `today` does not break a run that ends yesterday; any other
/// empty day ends the walk.
pub fn compute_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    for i in 0..=STREAK_LOOKBACK_DAYS {
        let day = today - Duration::days(i);
        if days.contains(&day) {
            streak += 1;
        } else if i > 0 {
            break;
        }
    }
    streak
}

/// Distinct local days on which a workout ended.
pub fn workout_days<Tz: TimeZone>(workouts: &[WorkoutHistoryItem], tz: &Tz) -> BTreeSet<NaiveDate> {
    workouts.iter().map(|w| local_day(w.ended_at, tz)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub total_workouts: usize,
    pub active_days: usize,
    pub streak: u32,
}

pub fn history_stats<Tz: TimeZone>(
    workouts: &[WorkoutHistoryItem],
    now: &DateTime<Tz>,
) -> HistoryStats {
    let days = workout_days(workouts, &now.timezone());
    HistoryStats {
        total_workouts: workouts.len(),
        active_days: days.len(),
        streak: compute_streak(&days, now.date_naive()),
    }
}

/// Heat-map shade for a day's workout count, 0..=4.
pub const fn intensity(count: usize) -> u8 {
    match count {
        0 => 0,
        1 => 1,
        2 => 2,
        3 => 3,
        _ => 4,
    }
}

pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatMapDay {
    pub date: NaiveDate,
    pub workout_ids: Vec<i64>,
    pub intensity: u8,
    pub is_today: bool,
    pub is_future: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatMap {
    /// Oldest week first; each week runs Monday to Sunday.
    pub weeks: Vec<[HeatMapDay; 7]>,
    /// (week column, month name) at each week whose Monday starts a new month.
    pub month_labels: Vec<(usize, String)>,
}

/// Builds `weeks` Monday-first week columns ending with the current week.
pub fn build_heat_map<Tz: TimeZone>(
    workouts: &[WorkoutHistoryItem],
    now: &DateTime<Tz>,
    weeks: u32,
) -> HeatMap {
    let tz = now.timezone();
    let today = now.date_naive();
    let mut by_day: HashMap<NaiveDate, Vec<i64>> = HashMap::new();
    for w in workouts {
        by_day.entry(local_day(w.ended_at, &tz)).or_default().push(w.id);
    }

    let current_monday = monday_of(today);
    let mut grid = Vec::with_capacity(weeks as usize);
    let mut month_labels = Vec::new();
    let mut last_month = None;

    for back in (0..i64::from(weeks)).rev() {
        let week_start = current_monday - Duration::weeks(back);
        let column = grid.len();
        if last_month != Some(week_start.month()) {
            last_month = Some(week_start.month());
            month_labels.push((column, week_start.format("%b").to_string()));
        }
        let week: [HeatMapDay; 7] = std::array::from_fn(|d| {
            let date = week_start + Duration::days(d as i64);
            let workout_ids = by_day.get(&date).cloned().unwrap_or_default();
            HeatMapDay {
                intensity: intensity(workout_ids.len()),
                workout_ids,
                is_today: date == today,
                is_future: date > today,
                date,
            }
        });
        grid.push(week);
    }

    HeatMap {
        weeks: grid,
        month_labels,
    }
}

pub fn count_unique_exercises(sets: &[HistorySet]) -> usize {
    sets.iter()
        .map(|s| s.exercise.id)
        .collect::<BTreeSet<_>>()
        .len()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseSets<'a> {
    pub exercise: &'a Exercise,
    pub sets: Vec<&'a HistorySet>,
}

/// Sets grouped per exercise, exercises in order of first appearance.
pub fn group_sets_by_exercise(sets: &[HistorySet]) -> Vec<ExerciseSets<'_>> {
    let mut groups: Vec<ExerciseSets<'_>> = Vec::new();
    for set in sets {
        match groups.iter_mut().find(|g| g.exercise.id == set.exercise.id) {
            Some(g) => g.sets.push(set),
            None => groups.push(ExerciseSets {
                exercise: &set.exercise,
                sets: vec![set],
            }),
        }
    }
    groups
}

/// `45s`, `12m`, `1h 5m`.
pub fn format_duration_seconds(total_seconds: i64) -> String {
    if total_seconds < 60 {
        return format!("{total_seconds}s");
    }
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Seconds between start and end of a workout, preferring the stored total.
pub fn workout_duration_seconds(w: &WorkoutHistoryItem) -> i64 {
    w.total_duration_seconds
        .unwrap_or_else(|| (w.ended_at - w.started_at).num_seconds().max(0))
}
