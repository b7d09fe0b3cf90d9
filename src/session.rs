// src/session.rs
//! The in-progress workout: which sets are logged, which exercise is current,
//! and whether a rest countdown is running.
//!
//! Only the logged sets and the rest countdown are stored. The current
//! exercise and every per-exercise phase are recomputed from the routine
//! targets and the sets on each call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::db::{RoutineExerciseDetail, RoutineWithExercises, SessionSet, WorkoutSession};
use crate::error::{Error, Result};

pub const MAX_SET_REPS: i64 = 1000;
pub const MAX_SET_WEIGHT_KG: f64 = 1000.0;

/// Checks a set before anything is written. Returns the reps as stored.
pub fn validate_set_input(reps: i64, weight_kg: Option<f64>) -> Result<u32> {
    if !(1..=MAX_SET_REPS).contains(&reps) {
        return Err(Error::validation(format!(
            "Reps must be between 1 and {MAX_SET_REPS}"
        )));
    }
    if let Some(w) = weight_kg {
        if !w.is_finite() || !(0.0..=MAX_SET_WEIGHT_KG).contains(&w) {
            return Err(Error::validation(format!(
                "Weight must be between 0 and {MAX_SET_WEIGHT_KG} kg"
            )));
        }
    }
    u32::try_from(reps).map_err(|_| Error::validation("Reps out of range"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExercisePhase {
    AwaitingInput,
    Resting,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkoutState {
    Active,
    Completed,
    Abandoned,
}

impl WorkoutState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// What happens to workouts that were started but never completed. In
/// every case they stay out of the completed history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AbandonedRetention {
    /// Keep them and their sets until pruned by hand.
    KeepHidden,
    /// Delete them once they started more than this many days ago.
    PruneAfterDays(u32),
}

impl AbandonedRetention {
    pub const fn from_days(days: Option<u32>) -> Self {
        match days {
            Some(d) => Self::PruneAfterDays(d),
            None => Self::KeepHidden,
        }
    }

    /// Sessions started before the returned instant are due for deletion.
    pub fn cutoff(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::KeepHidden => None,
            Self::PruneAfterDays(d) => Some(now - chrono::Duration::days(i64::from(d))),
        }
    }
}

/// The single rest countdown a workout can have, tied to the exercise that
/// was just worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestCountdown {
    pub exercise_id: i64,
    pub duration_seconds: u32,
    pub remaining_seconds: u32,
    pub paused: bool,
}

impl RestCountdown {
    pub const fn new(exercise_id: i64, duration_seconds: u32) -> Self {
        Self {
            exercise_id,
            duration_seconds,
            remaining_seconds: duration_seconds,
            paused: false,
        }
    }

    /// One second passes. Never goes below zero; paused countdowns hold.
    pub fn tick(&mut self) {
        if !self.paused {
            self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        }
    }
}

/// Sets logged against one exercise.
pub fn completed_count(exercise_id: i64, sets: &[SessionSet]) -> u32 {
    let n = sets.iter().filter(|s| s.exercise_id == exercise_id).count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// The first exercise, in routine order, still short of its target sets.
/// `None` means every exercise is satisfied.
pub fn current_index(exercises: &[RoutineExerciseDetail], sets: &[SessionSet]) -> Option<usize> {
    exercises
        .iter()
        .position(|d| completed_count(d.entry.exercise_id, sets) < d.entry.targets.sets)
}

pub fn exercise_phase(
    exercise: &RoutineExerciseDetail,
    sets: &[SessionSet],
    rest: Option<&RestCountdown>,
) -> ExercisePhase {
    let exercise_id = exercise.entry.exercise_id;
    if completed_count(exercise_id, sets) >= exercise.entry.targets.sets {
        ExercisePhase::Complete
    } else if rest.is_some_and(|r| r.exercise_id == exercise_id) {
        ExercisePhase::Resting
    } else {
        ExercisePhase::AwaitingInput
    }
}

/// What logging one set changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogOutcome {
    pub set: SessionSet,
    /// Seconds of rest started by this set, if any.
    pub rest_started: Option<u32>,
    pub exercise_complete: bool,
    pub all_complete: bool,
    pub current_index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestTick {
    Running { exercise_id: i64, remaining_seconds: u32 },
    Paused { exercise_id: i64, remaining_seconds: u32 },
    Finished { exercise_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed_exercises: usize,
    pub total_exercises: usize,
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseProgress {
    pub exercise_id: i64,
    pub name: String,
    pub completed_sets: u32,
    pub target_sets: u32,
    pub phase: ExercisePhase,
    pub is_current: bool,
    pub rest_remaining_seconds: Option<u32>,
    /// Pre-fill values for the next set.
    pub default_reps: u32,
    pub default_weight_kg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActiveWorkout {
    routine: RoutineWithExercises,
    session: WorkoutSession,
    sets: Vec<SessionSet>,
    rest: Option<RestCountdown>,
    state: WorkoutState,
}

impl ActiveWorkout {
    pub fn new(routine: RoutineWithExercises, session: WorkoutSession) -> Self {
        Self::with_sets(routine, session, Vec::new())
    }

    /// Rebuilds a workout from sets already in the store. No rest is running.
    pub fn with_sets(
        routine: RoutineWithExercises,
        session: WorkoutSession,
        mut sets: Vec<SessionSet>,
    ) -> Self {
        sets.sort_by(|a, b| a.completed_at.cmp(&b.completed_at).then(a.id.cmp(&b.id)));
        let state = if session.is_completed() {
            WorkoutState::Completed
        } else {
            WorkoutState::Active
        };
        Self {
            routine,
            session,
            sets,
            rest: None,
            state,
        }
    }

    pub fn routine(&self) -> &RoutineWithExercises {
        &self.routine
    }

    pub fn workout_id(&self) -> i64 {
        self.session.id
    }

    pub fn sets(&self) -> &[SessionSet] {
        &self.sets
    }

    pub fn rest(&self) -> Option<&RestCountdown> {
        self.rest.as_ref()
    }

    pub fn state(&self) -> WorkoutState {
        self.state
    }

    pub fn current_index(&self) -> Option<usize> {
        current_index(&self.routine.exercises, &self.sets)
    }

    pub fn current_exercise(&self) -> Option<&RoutineExerciseDetail> {
        self.current_index().map(|i| &self.routine.exercises[i])
    }

    pub fn is_all_complete(&self) -> bool {
        self.current_index().is_none()
    }

    pub fn exercise(&self, exercise_id: i64) -> Option<&RoutineExerciseDetail> {
        self.routine
            .exercises
            .iter()
            .find(|d| d.entry.exercise_id == exercise_id)
    }

    fn ensure_active(&self, action: &'static str) -> Result<()> {
        if self.state == WorkoutState::Active {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                action,
                state: self.state.as_str(),
            })
        }
    }

    /// Validates a set before it is sent to the store.
    pub fn prepare_set(&self, exercise_id: i64, reps: i64, weight_kg: Option<f64>) -> Result<u32> {
        self.ensure_active("log a set in")?;
        if self.exercise(exercise_id).is_none() {
            return Err(Error::validation(format!(
                "Exercise ID {exercise_id} is not part of routine '{}'",
                self.routine.routine.name
            )));
        }
        validate_set_input(reps, weight_kg)
    }

    /// Adopts a set the store has confirmed and moves the exercise forward.
    ///
    /// A rest countdown starts only when the exercise has rest configured and
    /// the set was not its last required one; otherwise any running countdown
    /// is cleared.
    pub fn record_set(&mut self, set: SessionSet) -> LogOutcome {
        let exercise_id = set.exercise_id;
        self.sets.push(set.clone());

        let done = completed_count(exercise_id, &self.sets);
        let targets = self.exercise(exercise_id).map(|d| d.entry.targets);

        let (exercise_complete, rest_seconds) = match targets {
            Some(t) => (done >= t.sets, (done < t.sets).then_some(t.rest_seconds)),
            None => (false, None),
        };

        self.rest = match rest_seconds {
            Some(secs) if secs > 0 => Some(RestCountdown::new(exercise_id, secs)),
            _ => None,
        };

        let current = self.current_index();
        if exercise_complete {
            info!(
                workout_id = self.session.id,
                exercise_id,
                sets = done,
                "Exercise complete"
            );
        }
        if current.is_none() {
            info!(workout_id = self.session.id, "All exercises complete");
        }

        LogOutcome {
            set,
            rest_started: self.rest.map(|r| r.duration_seconds),
            exercise_complete,
            all_complete: current.is_none(),
            current_index: current,
        }
    }

    /// Advances the rest countdown by one second.
    pub fn tick_rest(&mut self) -> Option<RestTick> {
        let rest = self.rest.as_mut()?;
        if rest.paused {
            return Some(RestTick::Paused {
                exercise_id: rest.exercise_id,
                remaining_seconds: rest.remaining_seconds,
            });
        }
        rest.tick();
        let (exercise_id, remaining_seconds) = (rest.exercise_id, rest.remaining_seconds);
        if remaining_seconds == 0 {
            self.rest = None;
            debug!(exercise_id, "Rest finished");
            return Some(RestTick::Finished { exercise_id });
        }
        Some(RestTick::Running {
            exercise_id,
            remaining_seconds,
        })
    }

    /// Ends rest early. Equivalent to the countdown reaching zero.
    pub fn skip_rest(&mut self) -> Option<RestCountdown> {
        let skipped = self.rest.take();
        if let Some(r) = &skipped {
            debug!(exercise_id = r.exercise_id, remaining = r.remaining_seconds, "Rest skipped");
        }
        skipped
    }

    pub fn pause_rest(&mut self) -> bool {
        self.set_rest_paused(true)
    }

    pub fn resume_rest(&mut self) -> bool {
        self.set_rest_paused(false)
    }

    fn set_rest_paused(&mut self, paused: bool) -> bool {
        match self.rest.as_mut() {
            Some(r) if r.paused != paused => {
                r.paused = paused;
                true
            }
            _ => false,
        }
    }

    /// Wall-clock seconds since the session started, never negative.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.session.started_at).num_seconds().max(0)
    }

    /// Adopts the completed session row returned by the store.
    pub(crate) fn mark_completed(&mut self, session: WorkoutSession) -> Result<()> {
        self.ensure_active("complete")?;
        self.session = session;
        self.rest = None;
        self.state = WorkoutState::Completed;
        info!(workout_id = self.session.id, "Workout completed");
        Ok(())
    }

    pub(crate) fn ensure_can_complete(&self) -> Result<()> {
        self.ensure_active("complete")
    }

    /// Leaves the workout without completing it. Nothing is written.
    pub fn abandon(&mut self) -> Result<()> {
        self.ensure_active("abandon")?;
        self.rest = None;
        self.state = WorkoutState::Abandoned;
        info!(
            workout_id = self.session.id,
            sets = self.sets.len(),
            "Workout abandoned"
        );
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        let total = self.routine.exercises.len();
        let completed = self
            .routine
            .exercises
            .iter()
            .filter(|d| completed_count(d.entry.exercise_id, &self.sets) >= d.entry.targets.sets)
            .count();
        let percent = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u8
        };
        Progress {
            completed_exercises: completed,
            total_exercises: total,
            percent,
        }
    }

    pub fn exercise_progress(&self) -> Vec<ExerciseProgress> {
        let current = self.current_index();
        self.routine
            .exercises
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let phase = exercise_phase(d, &self.sets, self.rest.as_ref());
                ExerciseProgress {
                    exercise_id: d.entry.exercise_id,
                    name: d.exercise.name.clone(),
                    completed_sets: completed_count(d.entry.exercise_id, &self.sets),
                    target_sets: d.entry.targets.sets,
                    phase,
                    is_current: current == Some(i),
                    rest_remaining_seconds: self
                        .rest
                        .filter(|r| r.exercise_id == d.entry.exercise_id)
                        .map(|r| r.remaining_seconds),
                    default_reps: d.entry.targets.reps,
                    default_weight_kg: d.entry.targets.weight_kg,
                }
            })
            .collect()
    }
}

/// `H:MM:SS` once past an hour, `M:SS` before.
pub fn format_clock(total_seconds: i64) -> String {
    let s = total_seconds.max(0);
    let (hours, minutes, seconds) = (s / 3600, (s % 3600) / 60, s % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Rest countdown display, always `MM:SS`.
pub fn format_rest_clock(remaining_seconds: u32) -> String {
    format!("{:02}:{:02}", remaining_seconds / 60, remaining_seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Exercise, ExerciseTargets, Routine, RoutineExercise};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap()
    }

    fn detail(idx: u32, exercise_id: i64, sets: u32, rest_seconds: u32) -> RoutineExerciseDetail {
        RoutineExerciseDetail {
            entry: RoutineExercise {
                id: i64::from(idx) + 100,
                routine_id: 1,
                exercise_id,
                order_index: idx,
                targets: ExerciseTargets {
                    sets,
                    reps: 10,
                    weight_kg: Some(40.0),
                    rest_seconds,
                },
            },
            exercise: Exercise {
                id: exercise_id,
                name: format!("Exercise {exercise_id}"),
                muscle_group: "chest".into(),
                equipment: "barbell".into(),
            },
        }
    }

    fn workout(exercises: Vec<RoutineExerciseDetail>) -> ActiveWorkout {
        let routine = RoutineWithExercises {
            routine: Routine {
                id: 1,
                name: "Test".into(),
                session_id: "anon".into(),
                created_at: t0(),
            },
            exercises,
        };
        let session = WorkoutSession {
            id: 9,
            routine_id: 1,
            session_id: "anon".into(),
            started_at: t0(),
            ended_at: None,
            total_duration_seconds: None,
        };
        ActiveWorkout::new(routine, session)
    }

    fn set(id: i64, exercise_id: i64) -> SessionSet {
        SessionSet {
            id,
            workout_id: 9,
            exercise_id,
            reps: 10,
            weight_kg: None,
            completed_at: t0() + Duration::seconds(id),
        }
    }

    #[test]
    fn set_bounds() {
        assert!(validate_set_input(0, None).is_err());
        assert!(validate_set_input(-3, None).is_err());
        assert!(validate_set_input(1001, None).is_err());
        assert!(validate_set_input(5, Some(-0.5)).is_err());
        assert!(validate_set_input(5, Some(1000.1)).is_err());
        assert!(validate_set_input(5, Some(f64::NAN)).is_err());
        assert_eq!(validate_set_input(1000, Some(1000.0)).unwrap(), 1000);
        assert_eq!(validate_set_input(1, Some(0.0)).unwrap(), 1);
    }

    #[test]
    fn final_sets_never_rest() {
        let mut w = workout(vec![detail(0, 1, 3, 60), detail(1, 2, 2, 45)]);
        let mut id = 0;
        let mut log = |w: &mut ActiveWorkout, ex| {
            id += 1;
            w.record_set(set(id, ex))
        };

        assert_eq!(log(&mut w, 1).rest_started, Some(60));
        assert_eq!(log(&mut w, 1).rest_started, Some(60));
        let third = log(&mut w, 1);
        assert_eq!(third.rest_started, None);
        assert!(third.exercise_complete);
        assert_eq!(third.current_index, Some(1));
        assert!(w.rest().is_none());

        assert_eq!(log(&mut w, 2).rest_started, Some(45));
        let last = log(&mut w, 2);
        assert_eq!(last.rest_started, None);
        assert!(last.all_complete);
        assert!(w.is_all_complete());
        assert_eq!(w.progress().percent, 100);
    }

    #[test]
    fn zero_rest_never_enters_resting() {
        let mut w = workout(vec![detail(0, 1, 3, 0)]);
        let out = w.record_set(set(1, 1));
        assert_eq!(out.rest_started, None);
        assert_eq!(w.exercise_progress()[0].phase, ExercisePhase::AwaitingInput);
    }

    #[test]
    fn rest_counts_down_pauses_and_skips() {
        let mut w = workout(vec![detail(0, 1, 3, 3)]);
        w.record_set(set(1, 1));
        assert_eq!(w.exercise_progress()[0].phase, ExercisePhase::Resting);

        assert_eq!(
            w.tick_rest(),
            Some(RestTick::Running { exercise_id: 1, remaining_seconds: 2 })
        );
        assert!(w.pause_rest());
        assert!(!w.pause_rest());
        assert_eq!(
            w.tick_rest(),
            Some(RestTick::Paused { exercise_id: 1, remaining_seconds: 2 })
        );
        assert!(w.resume_rest());
        w.tick_rest();
        assert_eq!(w.tick_rest(), Some(RestTick::Finished { exercise_id: 1 }));
        assert_eq!(w.tick_rest(), None);
        assert_eq!(w.exercise_progress()[0].phase, ExercisePhase::AwaitingInput);

        w.record_set(set(2, 1));
        assert!(w.skip_rest().is_some());
        assert!(w.rest().is_none());
    }

    #[test]
    fn current_index_is_first_unsatisfied() {
        let exercises = vec![detail(0, 1, 1, 0), detail(1, 2, 1, 0), detail(2, 3, 1, 0)];
        assert_eq!(current_index(&exercises, &[]), Some(0));
        // Working out of order leaves the pointer on the earliest gap.
        assert_eq!(current_index(&exercises, &[set(1, 2)]), Some(0));
        assert_eq!(current_index(&exercises, &[set(1, 2), set(2, 1)]), Some(2));
        assert_eq!(current_index(&exercises, &[set(1, 2), set(2, 1), set(3, 3)]), None);
    }

    #[test]
    fn extra_sets_past_target_do_not_rest() {
        let mut w = workout(vec![detail(0, 1, 1, 90)]);
        w.record_set(set(1, 1));
        let extra = w.record_set(set(2, 1));
        assert!(extra.exercise_complete);
        assert_eq!(extra.rest_started, None);
        assert_eq!(w.exercise_progress()[0].completed_sets, 2);
    }

    #[test]
    fn terminal_states_reject_further_work() {
        let mut w = workout(vec![detail(0, 1, 2, 30)]);
        w.record_set(set(1, 1));
        w.abandon().unwrap();
        assert_eq!(w.state(), WorkoutState::Abandoned);
        assert!(w.rest().is_none());
        assert!(matches!(
            w.prepare_set(1, 10, None),
            Err(Error::InvalidTransition { state: "abandoned", .. })
        ));
        assert!(w.abandon().is_err());
    }

    #[test]
    fn prepare_set_rejects_foreign_exercise() {
        let w = workout(vec![detail(0, 1, 2, 30)]);
        assert!(matches!(w.prepare_set(99, 10, None), Err(Error::Validation(_))));
        assert_eq!(w.prepare_set(1, 8, Some(20.0)).unwrap(), 8);
    }

    #[test]
    fn retention_cutoff() {
        assert_eq!(AbandonedRetention::from_days(None).cutoff(t0()), None);
        assert_eq!(
            AbandonedRetention::from_days(Some(3)).cutoff(t0()),
            Some(t0() - Duration::days(3))
        );
    }

    #[test]
    fn elapsed_and_clock_formats() {
        let w = workout(vec![detail(0, 1, 1, 0)]);
        assert_eq!(w.elapsed_seconds(t0() - Duration::seconds(5)), 0);
        assert_eq!(w.elapsed_seconds(t0() + Duration::seconds(3725)), 3725);
        assert_eq!(format_clock(3725), "1:02:05");
        assert_eq!(format_clock(65), "1:05");
        assert_eq!(format_clock(0), "0:00");
        assert_eq!(format_rest_clock(90), "01:30");
        assert_eq!(format_rest_clock(5), "00:05");
    }
}
