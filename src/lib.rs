use anyhow::Context;
use chrono::{DateTime, Local};
use rusqlite::Connection;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

// --- Declare modules ---
pub mod catalog;
pub mod clock;
mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod routine;
pub mod session;
pub mod templates;
pub mod timer;

// --- Expose public types ---
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ensure_session_id, get_config_path as get_config_path_util, load_config as load_config_util,
    parse_color, save_config as save_config_util, Config, ConfigError, StandardColor,
    ThemeConfig, Units,
};
pub use db::{
    get_db_path as get_db_path_util, DbError, Exercise, ExerciseTargets, HistorySet, Routine,
    RoutineExerciseDetail, RoutineWithExercises, SessionSet, WorkoutHistoryItem, WorkoutSession,
};
pub use error::{Error, Result};
pub use history::{DateGroup, HeatMap, HistoryStats};
pub use routine::RoutineDraft;
pub use session::{
    AbandonedRetention, ActiveWorkout, ExercisePhase, ExerciseProgress, LogOutcome, Progress,
    RestTick, WorkoutState,
};
pub use templates::{WorkoutTemplate, WORKOUT_TEMPLATES};

/// An unfinished workout and how much was logged in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbandonedWorkout {
    pub session: WorkoutSession,
    pub routine_name: Option<String>,
    pub set_count: i64,
}

pub struct AppService {
    pub config: Config,
    pub conn: Connection,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub clock: Arc<dyn Clock>,
}

// Store "not found" errors become the matching domain error; everything
// else is a persistence failure.
fn domain_error(e: DbError) -> Error {
    match e {
        DbError::RoutineNotFound(id) => Error::RoutineNotFound(id),
        DbError::WorkoutNotFound(id) => Error::WorkoutNotFound(id),
        other => Error::Persistence(other),
    }
}

impl AppService {
    /// Initializes the application service.
    /// # Errors
    /// Returns `anyhow::Error` if config/db path determination, loading, or initialization fails.
    pub fn initialize() -> anyhow::Result<Self> {
        let config_path =
            config::get_config_path().context("Failed to determine configuration file path")?;
        let config = config::load_config(&config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"))?;

        let db_path = db::get_db_path().context("Failed to determine database path")?;
        let conn = db::open_db(&db_path)
            .with_context(|| format!("Failed to open database at {db_path:?}"))?;
        db::init_db(&conn).context("Failed to initialize database schema")?;

        let service = Self {
            config,
            conn,
            db_path,
            config_path,
            clock: Arc::new(SystemClock),
        };
        service
            .apply_abandoned_retention()
            .context("Failed to apply abandoned workout retention")?;
        Ok(service)
    }

    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    /// Saves the current configuration state.
    /// # Errors
    /// Returns `ConfigError` if saving fails.
    pub fn save_config(&self) -> std::result::Result<(), ConfigError> {
        config::save_config(&self.config_path, &self.config)
    }

    pub fn set_units(&mut self, units: Units) -> std::result::Result<(), ConfigError> {
        self.config.units = units;
        self.save_config()
    }

    pub fn set_heatmap_weeks(&mut self, weeks: u32) -> std::result::Result<(), ConfigError> {
        self.config.set_heatmap_weeks(weeks)?;
        self.save_config()
    }

    pub fn set_header_color(&mut self, color: &str) -> std::result::Result<(), ConfigError> {
        let parsed = parse_color(color)?;
        self.config.theme.header_color = format!("{parsed:?}");
        self.save_config()
    }

    /// The anonymous id that owns every routine and workout written here.
    /// # Errors
    /// `Error::Validation` if the config carries none.
    pub fn session_id(&self) -> Result<&str> {
        self.config
            .require_session_id()
            .map_err(|e| Error::validation(e.to_string()))
    }

    fn now_local(&self) -> DateTime<Local> {
        self.clock.now().with_timezone(&Local)
    }

    // --- Exercise catalog ---

    pub fn list_exercises(&self, muscle_group: Option<&str>) -> Result<Vec<Exercise>> {
        Ok(db::list_exercises(&self.conn, muscle_group)?)
    }

    /// Looks up an exercise by numeric id or by name (case-insensitive).
    /// # Errors
    /// `Error::Validation` when nothing matches.
    pub fn find_exercise(&self, identifier: &str) -> Result<Exercise> {
        let trimmed = identifier.trim();
        let found = match trimmed.parse::<i64>() {
            Ok(id) => db::get_exercise_by_id(&self.conn, id)?,
            Err(_) => db::get_exercise_by_name(&self.conn, trimmed)?,
        };
        found.ok_or_else(|| Error::validation(format!("Exercise '{trimmed}' not found")))
    }

    // --- Routines ---

    fn check_exercises_exist(&self, draft: &RoutineDraft) -> Result<()> {
        for e in draft.exercises() {
            if db::get_exercise_by_id(&self.conn, e.exercise_id)?.is_none() {
                return Err(Error::validation(format!(
                    "Exercise ID {} not found",
                    e.exercise_id
                )));
            }
        }
        Ok(())
    }

    /// Validates and writes a new routine together with all its exercises.
    /// # Errors
    /// - `Error::Validation` / `Error::DuplicateExercise` for a bad draft; nothing is written.
    /// - `Error::Persistence` if the store rejects the write; nothing is kept.
    pub fn create_routine(&mut self, draft: &RoutineDraft) -> Result<RoutineWithExercises> {
        let name = draft.validate()?;
        self.check_exercises_exist(draft)?;
        let session_id = self.session_id()?.to_string();
        let now = self.clock.now();

        let routine = db::create_routine_transactional(
            &mut self.conn,
            &session_id,
            name,
            draft.exercises(),
            now,
        )?;
        info!(routine_id = routine.id, name = %routine.name, "Routine created");
        self.get_routine(routine.id)
    }

    /// Renames a routine and replaces its whole exercise list.
    /// # Errors
    /// `Error::RoutineNotFound` if the id is unknown, plus the errors of
    /// [`create_routine`](Self::create_routine).
    pub fn update_routine(
        &mut self,
        routine_id: i64,
        draft: &RoutineDraft,
    ) -> Result<RoutineWithExercises> {
        let name = draft.validate()?;
        self.check_exercises_exist(draft)?;
        db::update_routine(&mut self.conn, routine_id, name, draft.exercises())
            .map_err(domain_error)?;
        info!(routine_id, "Routine updated");
        self.get_routine(routine_id)
    }

    /// Deletes a routine with its exercises, workouts and their sets.
    pub fn delete_routine(&self, routine_id: i64) -> Result<()> {
        db::delete_routine(&self.conn, routine_id).map_err(domain_error)?;
        info!(routine_id, "Routine deleted");
        Ok(())
    }

    /// Routines of the current anonymous session, newest first.
    pub fn list_routines(&self) -> Result<Vec<Routine>> {
        Ok(db::list_routines(&self.conn, self.session_id()?)?)
    }

    pub fn get_routine(&self, routine_id: i64) -> Result<RoutineWithExercises> {
        db::get_routine_with_exercises(&self.conn, routine_id)?
            .ok_or(Error::RoutineNotFound(routine_id))
    }

    /// Creates `My <template>` from a starter template. Template exercises
    /// missing from the catalog are skipped.
    /// # Errors
    /// `Error::Validation` for an unknown template or when no exercise matched.
    pub fn copy_template_to_routine(&mut self, template_id: &str) -> Result<RoutineWithExercises> {
        let template = templates::find_template(template_id)
            .ok_or_else(|| Error::validation(format!("Template '{template_id}' not found")))?;

        let mut entries = Vec::with_capacity(template.exercises.len());
        for te in template.exercises {
            match db::get_exercise_by_name(&self.conn, te.name)? {
                Some(ex) => entries.push((ex.id, te.targets)),
                None => warn!(template = template.id, exercise = te.name, "Template exercise not in catalog, skipping"),
            }
        }
        if entries.is_empty() {
            return Err(Error::validation(format!(
                "None of the exercises in '{}' are in the exercise catalog",
                template.name
            )));
        }

        let draft = RoutineDraft::from_entries(templates::routine_name_for(template), entries);
        self.create_routine(&draft)
    }

    // --- Workouts ---

    /// Creates the session row and returns the workout ready for logging.
    /// # Errors
    /// - `Error::RoutineNotFound` if the routine id is unknown.
    /// - `Error::SessionCreate` if the store fails to create the session.
    pub fn start_workout(&self, routine_id: i64) -> Result<ActiveWorkout> {
        let routine = self.get_routine(routine_id)?;
        let session = db::create_workout_session(
            &self.conn,
            self.session_id()?,
            routine_id,
            self.clock.now(),
        )
        .map_err(Error::SessionCreate)?;
        info!(workout_id = session.id, routine = %routine.routine.name, "Workout started");
        Ok(ActiveWorkout::new(routine, session))
    }

    /// Picks up an unfinished workout with the sets already stored for it.
    pub fn resume_workout(&self, workout_id: i64) -> Result<ActiveWorkout> {
        let session = db::get_workout_session(&self.conn, workout_id)?
            .ok_or(Error::WorkoutNotFound(workout_id))?;
        if session.is_completed() {
            return Err(Error::InvalidTransition {
                action: "resume",
                state: WorkoutState::Completed.as_str(),
            });
        }
        let routine = self.get_routine(session.routine_id)?;
        let sets = db::list_session_sets(&self.conn, workout_id)?;
        info!(workout_id, sets = sets.len(), "Workout resumed");
        Ok(ActiveWorkout::with_sets(routine, session, sets))
    }

    /// Validates, stores and then records one set.
    ///
    /// The set reaches `workout` only after the store has accepted it.
    /// # Errors
    /// - `Error::Validation` for out-of-range input or an exercise outside the routine.
    /// - `Error::InvalidTransition` if the workout is no longer active.
    /// - `Error::SetLog` if the store write fails.
    pub fn log_set(
        &self,
        workout: &mut ActiveWorkout,
        exercise_id: i64,
        reps: i64,
        weight_kg: Option<f64>,
    ) -> Result<LogOutcome> {
        let reps = workout.prepare_set(exercise_id, reps, weight_kg)?;
        let stored = db::insert_session_set(
            &self.conn,
            workout.workout_id(),
            exercise_id,
            reps,
            weight_kg,
            self.clock.now(),
        )
        .map_err(Error::SetLog)?;
        Ok(workout.record_set(stored))
    }

    /// Finishes the workout, storing ended_at and the wall-clock duration.
    /// Allowed at any point while the workout is active.
    pub fn complete_workout(&self, workout: &mut ActiveWorkout) -> Result<WorkoutSession> {
        workout.ensure_can_complete()?;
        let now = self.clock.now();
        let duration = workout.elapsed_seconds(now);
        let session = db::complete_workout_session(&self.conn, workout.workout_id(), now, duration)
            .map_err(|e| match e {
                DbError::WorkoutAlreadyCompleted(_) => Error::InvalidTransition {
                    action: "complete",
                    state: WorkoutState::Completed.as_str(),
                },
                other => domain_error(other),
            })?;
        workout.mark_completed(session.clone())?;
        Ok(session)
    }

    /// Leaves the workout unfinished. The store is not touched: the session
    /// keeps `ended_at` unset and is handled by [`AbandonedRetention`].
    pub fn abandon_workout(&self, workout: &mut ActiveWorkout) -> Result<()> {
        workout.abandon()
    }

    pub fn elapsed_seconds(&self, workout: &ActiveWorkout) -> i64 {
        workout.elapsed_seconds(self.clock.now())
    }

    // --- Abandoned workouts ---

    pub fn abandoned_retention(&self) -> AbandonedRetention {
        AbandonedRetention::from_days(self.config.abandoned_retention_days)
    }

    pub fn list_abandoned_workouts(&self) -> Result<Vec<AbandonedWorkout>> {
        let sessions = db::list_incomplete_workouts(&self.conn, self.session_id()?)?;
        sessions
            .into_iter()
            .map(|session| -> Result<AbandonedWorkout> {
                let routine_name = db::get_routine(&self.conn, session.routine_id)?.map(|r| r.name);
                let set_count = db::count_session_sets(&self.conn, session.id)?;
                Ok(AbandonedWorkout {
                    session,
                    routine_name,
                    set_count,
                })
            })
            .collect()
    }

    /// Deletes unfinished workouts started more than `older_than` ago.
    /// `keep` protects a workout that is still in progress.
    pub fn prune_abandoned_workouts(
        &self,
        older_than: chrono::Duration,
        keep: Option<i64>,
    ) -> Result<usize> {
        let cutoff = self.clock.now() - older_than;
        let removed =
            db::delete_incomplete_workouts(&self.conn, self.session_id()?, cutoff, keep)?;
        if removed > 0 {
            info!(removed, "Pruned abandoned workouts");
        }
        Ok(removed)
    }

    /// Applies the configured retention. Returns how many sessions were removed.
    pub fn apply_abandoned_retention(&self) -> Result<usize> {
        match self.abandoned_retention().cutoff(self.clock.now()) {
            None => Ok(0),
            Some(cutoff) => Ok(db::delete_incomplete_workouts(
                &self.conn,
                self.session_id()?,
                cutoff,
                None,
            )?),
        }
    }

    // --- History ---

    /// Completed workouts, most recent first. Unfinished ones never appear.
    pub fn workout_history(&self) -> Result<Vec<WorkoutHistoryItem>> {
        Ok(db::list_completed_workouts(&self.conn, self.session_id()?)?)
    }

    pub fn group_history<'a>(
        &self,
        workouts: &'a [WorkoutHistoryItem],
    ) -> Vec<(DateGroup, Vec<&'a WorkoutHistoryItem>)> {
        history::group_by_relative_date(workouts, &self.now_local())
    }

    pub fn history_stats(&self) -> Result<HistoryStats> {
        let workouts = self.workout_history()?;
        Ok(history::history_stats(&workouts, &self.now_local()))
    }

    /// Heat map over `weeks` weeks, or the configured default.
    pub fn heat_map(&self, weeks: Option<u32>) -> Result<HeatMap> {
        let weeks = weeks.unwrap_or(self.config.heatmap_weeks).max(1);
        let workouts = self.workout_history()?;
        Ok(history::build_heat_map(&workouts, &self.now_local(), weeks))
    }
}
