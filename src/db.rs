// src/db.rs
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{named_params, params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog;

const DB_FILE_NAME: &str = "strongo.sqlite";
const APP_DATA_DIR: &str = "strongo";
const DB_PATH_ENV_VAR: &str = "STRONGO_DB_PATH";

// Custom Error type for DB operations
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    Connection(#[from] rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing database file")]
    Io(#[from] std::io::Error),
    #[error("Database query failed: {0}")]
    QueryFailed(rusqlite::Error),
    #[error("Database update failed: {0}")]
    UpdateFailed(rusqlite::Error),
    #[error("Database insert failed: {0}")]
    InsertFailed(rusqlite::Error),
    #[error("Database delete failed: {0}")]
    DeleteFailed(rusqlite::Error),
    #[error("Routine not found: ID {0}")]
    RoutineNotFound(i64),
    #[error("Workout session not found: ID {0}")]
    WorkoutNotFound(i64),
    #[error("Workout session {0} has already been completed")]
    WorkoutAlreadyCompleted(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exercise {
    pub id: i64,
    pub name: String,
    pub muscle_group: String,
    pub equipment: String,
}

/// Prescribed work for one exercise inside a routine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExerciseTargets {
    pub sets: u32,
    pub reps: u32,
    pub weight_kg: Option<f64>,
    pub rest_seconds: u32,
}

impl Default for ExerciseTargets {
    fn default() -> Self {
        Self {
            sets: 3,
            reps: 10,
            weight_kg: None,
            rest_seconds: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Routine {
    pub id: i64,
    pub name: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutineExercise {
    pub id: i64,
    pub routine_id: i64,
    pub exercise_id: i64,
    pub order_index: u32,
    pub targets: ExerciseTargets,
}

/// A routine exercise joined with its catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutineExerciseDetail {
    pub entry: RoutineExercise,
    pub exercise: Exercise,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutineWithExercises {
    pub routine: Routine,
    pub exercises: Vec<RoutineExerciseDetail>, // ordered by order_index
}

/// Data needed to write one routine exercise row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewRoutineExercise {
    pub exercise_id: i64,
    pub order_index: u32,
    pub targets: ExerciseTargets,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutSession {
    pub id: i64,
    pub routine_id: i64,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_duration_seconds: Option<i64>,
}

impl WorkoutSession {
    pub const fn is_completed(&self) -> bool {
        self.ended_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSet {
    pub id: i64,
    pub workout_id: i64,
    pub exercise_id: i64,
    pub reps: u32,
    pub weight_kg: Option<f64>,
    pub completed_at: DateTime<Utc>,
}

/// A logged set joined with its exercise, as shown in history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySet {
    pub id: i64,
    pub reps: u32,
    pub weight_kg: Option<f64>,
    pub completed_at: DateTime<Utc>,
    pub exercise: Exercise,
}

/// A completed workout with its routine and every set it logged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutHistoryItem {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total_duration_seconds: Option<i64>,
    pub routine: Routine,
    pub sets: Vec<HistorySet>,
}

/// Gets the path to the SQLite database file within the app's data directory.
/// `STRONGO_DB_PATH` overrides the location.
pub fn get_db_path() -> Result<PathBuf, DbError> {
    if let Ok(path) = std::env::var(DB_PATH_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    let data_dir = dirs::data_dir().ok_or(DbError::DataDir)?;
    let app_dir = data_dir.join(APP_DATA_DIR);
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// Opens a connection to the SQLite database.
pub fn open_db<P: AsRef<Path>>(path: P) -> Result<Connection, DbError> {
    let conn = Connection::open(path).map_err(DbError::Connection)?;
    Ok(conn)
}

/// Creates the schema if missing and seeds the exercise catalog on first run.
/// Also turns on foreign key enforcement for this connection.
pub fn init_db(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            muscle_group TEXT NOT NULL,
            equipment TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS routines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            session_id TEXT NOT NULL,
            created_at TEXT NOT NULL -- RFC3339, UTC
        );

        CREATE TABLE IF NOT EXISTS routine_exercises (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            routine_id INTEGER NOT NULL REFERENCES routines(id) ON DELETE CASCADE,
            exercise_id INTEGER NOT NULL REFERENCES exercises(id),
            order_index INTEGER NOT NULL CHECK(order_index >= 0),
            target_sets INTEGER NOT NULL CHECK(target_sets >= 1),
            target_reps INTEGER NOT NULL CHECK(target_reps >= 1),
            target_weight_kg REAL CHECK(target_weight_kg IS NULL OR target_weight_kg >= 0),
            target_rest_seconds INTEGER NOT NULL DEFAULT 0 CHECK(target_rest_seconds >= 0),
            UNIQUE(routine_id, exercise_id),
            UNIQUE(routine_id, order_index)
        );

        CREATE TABLE IF NOT EXISTS workout_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            routine_id INTEGER NOT NULL REFERENCES routines(id) ON DELETE CASCADE,
            session_id TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT, -- NULL while active (or abandoned)
            total_duration_seconds INTEGER
        );

        CREATE TABLE IF NOT EXISTS session_sets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            workout_id INTEGER NOT NULL REFERENCES workout_sessions(id) ON DELETE CASCADE,
            exercise_id INTEGER NOT NULL REFERENCES exercises(id),
            reps INTEGER NOT NULL CHECK(reps > 0),
            weight_kg REAL CHECK(weight_kg IS NULL OR weight_kg >= 0),
            completed_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_routines_session_id ON routines(session_id);
        CREATE INDEX IF NOT EXISTS idx_routine_exercises_routine ON routine_exercises(routine_id);
        CREATE INDEX IF NOT EXISTS idx_workout_sessions_session_id ON workout_sessions(session_id);
        CREATE INDEX IF NOT EXISTS idx_session_sets_workout ON session_sets(workout_id);",
    )
    .map_err(DbError::Connection)?;

    seed_exercise_catalog(conn)?;
    Ok(())
}

fn seed_exercise_catalog(conn: &Connection) -> Result<(), DbError> {
    let existing: i64 = conn
        .query_row("SELECT COUNT(*) FROM exercises", [], |row| row.get(0))
        .map_err(DbError::QueryFailed)?;
    if existing > 0 {
        return Ok(());
    }

    let mut stmt = conn
        .prepare("INSERT INTO exercises (name, muscle_group, equipment) VALUES (?1, ?2, ?3)")
        .map_err(DbError::InsertFailed)?;
    for e in catalog::EXERCISES {
        stmt.execute(params![e.name, e.muscle_group, e.equipment])
            .map_err(DbError::InsertFailed)?;
    }
    debug!(count = catalog::EXERCISES.len(), "Seeded exercise catalog");
    Ok(())
}

// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_optional_timestamp(
    idx: usize,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    value.map(|s| parse_timestamp(idx, &s)).transpose()
}

// ---- Row mappers ----
// Each mapper reads its columns starting at `offset`, so joined queries can
// place several entities side by side in one row.

fn map_exercise(row: &Row, offset: usize) -> Result<Exercise, rusqlite::Error> {
    Ok(Exercise {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        muscle_group: row.get(offset + 2)?,
        equipment: row.get(offset + 3)?,
    })
}

fn map_routine(row: &Row, offset: usize) -> Result<Routine, rusqlite::Error> {
    let created_at: String = row.get(offset + 3)?;
    Ok(Routine {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        session_id: row.get(offset + 2)?,
        created_at: parse_timestamp(offset + 3, &created_at)?,
    })
}

fn map_routine_exercise(row: &Row, offset: usize) -> Result<RoutineExercise, rusqlite::Error> {
    Ok(RoutineExercise {
        id: row.get(offset)?,
        routine_id: row.get(offset + 1)?,
        exercise_id: row.get(offset + 2)?,
        order_index: row.get(offset + 3)?,
        targets: ExerciseTargets {
            sets: row.get(offset + 4)?,
            reps: row.get(offset + 5)?,
            weight_kg: row.get(offset + 6)?,
            rest_seconds: row.get(offset + 7)?,
        },
    })
}

fn map_workout_session(row: &Row) -> Result<WorkoutSession, rusqlite::Error> {
    let started_at: String = row.get(3)?;
    let ended_at: Option<String> = row.get(4)?;
    Ok(WorkoutSession {
        id: row.get(0)?,
        routine_id: row.get(1)?,
        session_id: row.get(2)?,
        started_at: parse_timestamp(3, &started_at)?,
        ended_at: parse_optional_timestamp(4, ended_at)?,
        total_duration_seconds: row.get(5)?,
    })
}

fn map_session_set(row: &Row) -> Result<SessionSet, rusqlite::Error> {
    let completed_at: String = row.get(5)?;
    Ok(SessionSet {
        id: row.get(0)?,
        workout_id: row.get(1)?,
        exercise_id: row.get(2)?,
        reps: row.get(3)?,
        weight_kg: row.get(4)?,
        completed_at: parse_timestamp(5, &completed_at)?,
    })
}

const EXERCISE_COLUMNS: &str = "id, name, muscle_group, equipment";
const ROUTINE_COLUMNS: &str = "id, name, session_id, created_at";
const WORKOUT_COLUMNS: &str =
    "id, routine_id, session_id, started_at, ended_at, total_duration_seconds";
const SET_COLUMNS: &str = "id, workout_id, exercise_id, reps, weight_kg, completed_at";

// ---- Exercise catalog ----

/// Lists catalog exercises ordered by name, optionally limited to one muscle group.
pub fn list_exercises(
    conn: &Connection,
    muscle_group: Option<&str>,
) -> Result<Vec<Exercise>, DbError> {
    let sql = format!(
        "SELECT {EXERCISE_COLUMNS} FROM exercises
         WHERE (:muscle IS NULL OR muscle_group = :muscle COLLATE NOCASE)
         ORDER BY name ASC"
    );
    let mut stmt = conn.prepare(&sql).map_err(DbError::QueryFailed)?;
    let iter = stmt
        .query_map(named_params! { ":muscle": muscle_group }, |row| {
            map_exercise(row, 0)
        })
        .map_err(DbError::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(DbError::QueryFailed)
}

pub fn get_exercise_by_id(conn: &Connection, id: i64) -> Result<Option<Exercise>, DbError> {
    let sql = format!("SELECT {EXERCISE_COLUMNS} FROM exercises WHERE id = ?1");
    conn.query_row(&sql, params![id], |row| map_exercise(row, 0))
        .optional()
        .map_err(DbError::QueryFailed)
}

/// Retrieves an exercise by its name (case-insensitive).
pub fn get_exercise_by_name(conn: &Connection, name: &str) -> Result<Option<Exercise>, DbError> {
    let sql = format!("SELECT {EXERCISE_COLUMNS} FROM exercises WHERE name = ?1 COLLATE NOCASE");
    conn.query_row(&sql, params![name.trim()], |row| map_exercise(row, 0))
        .optional()
        .map_err(DbError::QueryFailed)
}

// ---- Routines ----

fn insert_routine_exercises(
    conn: &Connection,
    routine_id: i64,
    exercises: &[NewRoutineExercise],
) -> Result<(), DbError> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO routine_exercises
                (routine_id, exercise_id, order_index, target_sets, target_reps, target_weight_kg, target_rest_seconds)
             VALUES (:routine_id, :exercise_id, :order_index, :sets, :reps, :weight, :rest)",
        )
        .map_err(DbError::InsertFailed)?;
    for ex in exercises {
        stmt.execute(named_params! {
            ":routine_id": routine_id,
            ":exercise_id": ex.exercise_id,
            ":order_index": ex.order_index,
            ":sets": ex.targets.sets,
            ":reps": ex.targets.reps,
            ":weight": ex.targets.weight_kg,
            ":rest": ex.targets.rest_seconds,
        })
        .map_err(DbError::InsertFailed)?;
    }
    Ok(())
}

/// Writes a routine and all of its exercise rows as one unit.
///
/// Both inserts run inside a single transaction: if any exercise row is
/// rejected the routine row is rolled back with it, so no orphan routine
/// without exercises can be left behind.
pub fn create_routine_transactional(
    conn: &mut Connection,
    session_id: &str,
    name: &str,
    exercises: &[NewRoutineExercise],
    created_at: DateTime<Utc>,
) -> Result<Routine, DbError> {
    let tx = conn.transaction().map_err(DbError::Connection)?;

    let sql = format!(
        "INSERT INTO routines (name, session_id, created_at) VALUES (?1, ?2, ?3)
         RETURNING {ROUTINE_COLUMNS}"
    );
    let routine = tx
        .query_row(
            &sql,
            params![name, session_id, format_timestamp(created_at)],
            |row| map_routine(row, 0),
        )
        .map_err(DbError::InsertFailed)?;

    insert_routine_exercises(&tx, routine.id, exercises)?;

    tx.commit().map_err(DbError::Connection)?;
    debug!(routine_id = routine.id, exercises = exercises.len(), "Created routine");
    Ok(routine)
}

/// Renames a routine and replaces its whole exercise list in one transaction.
pub fn update_routine(
    conn: &mut Connection,
    routine_id: i64,
    name: &str,
    exercises: &[NewRoutineExercise],
) -> Result<(), DbError> {
    let tx = conn.transaction().map_err(DbError::Connection)?;

    let updated = tx
        .execute(
            "UPDATE routines SET name = ?1 WHERE id = ?2",
            params![name, routine_id],
        )
        .map_err(DbError::UpdateFailed)?;
    if updated == 0 {
        return Err(DbError::RoutineNotFound(routine_id));
    }

    tx.execute(
        "DELETE FROM routine_exercises WHERE routine_id = ?1",
        params![routine_id],
    )
    .map_err(DbError::DeleteFailed)?;
    insert_routine_exercises(&tx, routine_id, exercises)?;

    tx.commit().map_err(DbError::Connection)?;
    debug!(routine_id, exercises = exercises.len(), "Replaced routine exercises");
    Ok(())
}

/// Deletes a routine. Its exercises, workout sessions and their sets go with it.
pub fn delete_routine(conn: &Connection, routine_id: i64) -> Result<(), DbError> {
    let rows = conn
        .execute("DELETE FROM routines WHERE id = ?1", params![routine_id])
        .map_err(DbError::DeleteFailed)?;
    if rows == 0 {
        Err(DbError::RoutineNotFound(routine_id))
    } else {
        Ok(())
    }
}

/// Lists the routines owned by `session_id`, newest first.
pub fn list_routines(conn: &Connection, session_id: &str) -> Result<Vec<Routine>, DbError> {
    let sql = format!(
        "SELECT {ROUTINE_COLUMNS} FROM routines WHERE session_id = ?1
         ORDER BY created_at DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql).map_err(DbError::QueryFailed)?;
    let iter = stmt
        .query_map(params![session_id], |row| map_routine(row, 0))
        .map_err(DbError::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(DbError::QueryFailed)
}

pub fn get_routine(conn: &Connection, routine_id: i64) -> Result<Option<Routine>, DbError> {
    let sql = format!("SELECT {ROUTINE_COLUMNS} FROM routines WHERE id = ?1");
    conn.query_row(&sql, params![routine_id], |row| map_routine(row, 0))
        .optional()
        .map_err(DbError::QueryFailed)
}

/// Fetches a routine with its exercises joined to the catalog, in order_index order.
pub fn get_routine_with_exercises(
    conn: &Connection,
    routine_id: i64,
) -> Result<Option<RoutineWithExercises>, DbError> {
    let Some(routine) = get_routine(conn, routine_id)? else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT re.id, re.routine_id, re.exercise_id, re.order_index, re.target_sets,
                    re.target_reps, re.target_weight_kg, re.target_rest_seconds,
                    e.id, e.name, e.muscle_group, e.equipment
             FROM routine_exercises re
             JOIN exercises e ON e.id = re.exercise_id
             WHERE re.routine_id = ?1
             ORDER BY re.order_index ASC",
        )
        .map_err(DbError::QueryFailed)?;
    let iter = stmt
        .query_map(params![routine_id], |row| {
            Ok(RoutineExerciseDetail {
                entry: map_routine_exercise(row, 0)?,
                exercise: map_exercise(row, 8)?,
            })
        })
        .map_err(DbError::QueryFailed)?;
    let exercises = iter
        .collect::<Result<Vec<_>, _>>()
        .map_err(DbError::QueryFailed)?;

    Ok(Some(RoutineWithExercises { routine, exercises }))
}

// ---- Workout sessions ----

/// Inserts a new, active workout session row and returns it as stored.
pub fn create_workout_session(
    conn: &Connection,
    session_id: &str,
    routine_id: i64,
    started_at: DateTime<Utc>,
) -> Result<WorkoutSession, DbError> {
    let sql = format!(
        "INSERT INTO workout_sessions (routine_id, session_id, started_at) VALUES (?1, ?2, ?3)
         RETURNING {WORKOUT_COLUMNS}"
    );
    let session = conn
        .query_row(
            &sql,
            params![routine_id, session_id, format_timestamp(started_at)],
            map_workout_session,
        )
        .map_err(DbError::InsertFailed)?;
    debug!(workout_id = session.id, routine_id, "Created workout session");
    Ok(session)
}

pub fn get_workout_session(
    conn: &Connection,
    workout_id: i64,
) -> Result<Option<WorkoutSession>, DbError> {
    let sql = format!("SELECT {WORKOUT_COLUMNS} FROM workout_sessions WHERE id = ?1");
    conn.query_row(&sql, params![workout_id], map_workout_session)
        .optional()
        .map_err(DbError::QueryFailed)
}

/// Stamps `ended_at` and the total duration on an active session.
/// This is the only update a session row ever receives.
pub fn complete_workout_session(
    conn: &Connection,
    workout_id: i64,
    ended_at: DateTime<Utc>,
    total_duration_seconds: i64,
) -> Result<WorkoutSession, DbError> {
    let sql = format!(
        "UPDATE workout_sessions SET ended_at = ?1, total_duration_seconds = ?2
         WHERE id = ?3 AND ended_at IS NULL
         RETURNING {WORKOUT_COLUMNS}"
    );
    let updated = conn
        .query_row(
            &sql,
            params![format_timestamp(ended_at), total_duration_seconds, workout_id],
            map_workout_session,
        )
        .optional()
        .map_err(DbError::UpdateFailed)?;

    match updated {
        Some(session) => Ok(session),
        None => match get_workout_session(conn, workout_id)? {
            Some(_) => Err(DbError::WorkoutAlreadyCompleted(workout_id)),
            None => Err(DbError::WorkoutNotFound(workout_id)),
        },
    }
}

/// Sessions that were started but never completed, oldest first.
pub fn list_incomplete_workouts(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<WorkoutSession>, DbError> {
    let sql = format!(
        "SELECT {WORKOUT_COLUMNS} FROM workout_sessions
         WHERE session_id = ?1 AND ended_at IS NULL
         ORDER BY started_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql).map_err(DbError::QueryFailed)?;
    let iter = stmt
        .query_map(params![session_id], map_workout_session)
        .map_err(DbError::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(DbError::QueryFailed)
}

/// Deletes incomplete sessions started before `started_before`, with their sets.
/// `exclude` protects a session that is still being worked.
pub fn delete_incomplete_workouts(
    conn: &Connection,
    session_id: &str,
    started_before: DateTime<Utc>,
    exclude: Option<i64>,
) -> Result<usize, DbError> {
    conn.execute(
        "DELETE FROM workout_sessions
         WHERE session_id = :session_id AND ended_at IS NULL AND started_at < :before
           AND (:exclude IS NULL OR id != :exclude)",
        named_params! {
            ":session_id": session_id,
            ":before": format_timestamp(started_before),
            ":exclude": exclude,
        },
    )
    .map_err(DbError::DeleteFailed)
}

// ---- Session sets ----

/// Appends one logged set and returns the stored row.
pub fn insert_session_set(
    conn: &Connection,
    workout_id: i64,
    exercise_id: i64,
    reps: u32,
    weight_kg: Option<f64>,
    completed_at: DateTime<Utc>,
) -> Result<SessionSet, DbError> {
    let sql = format!(
        "INSERT INTO session_sets (workout_id, exercise_id, reps, weight_kg, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING {SET_COLUMNS}"
    );
    let set = conn
        .query_row(
            &sql,
            params![
                workout_id,
                exercise_id,
                reps,
                weight_kg,
                format_timestamp(completed_at)
            ],
            map_session_set,
        )
        .map_err(DbError::InsertFailed)?;
    debug!(set_id = set.id, workout_id, exercise_id, reps, "Logged set");
    Ok(set)
}

/// All sets of a workout in the order the store received them.
pub fn list_session_sets(conn: &Connection, workout_id: i64) -> Result<Vec<SessionSet>, DbError> {
    let sql = format!(
        "SELECT {SET_COLUMNS} FROM session_sets WHERE workout_id = ?1
         ORDER BY completed_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql).map_err(DbError::QueryFailed)?;
    let iter = stmt
        .query_map(params![workout_id], map_session_set)
        .map_err(DbError::QueryFailed)?;
    iter.collect::<Result<Vec<_>, _>>()
        .map_err(DbError::QueryFailed)
}

pub fn count_session_sets(conn: &Connection, workout_id: i64) -> Result<i64, DbError> {
    conn.query_row(
        "SELECT COUNT(*) FROM session_sets WHERE workout_id = ?1",
        params![workout_id],
        |row| row.get(0),
    )
    .map_err(DbError::QueryFailed)
}

// ---- History ----

/// Completed workouts of `session_id`, most recently finished first, each
/// carrying its routine and its sets (joined with the exercise) in logged order.
pub fn list_completed_workouts(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<WorkoutHistoryItem>, DbError> {
    let mut stmt = conn
        .prepare(
            "SELECT w.id, w.started_at, w.ended_at, w.total_duration_seconds,
                    r.id, r.name, r.session_id, r.created_at
             FROM workout_sessions w
             LEFT JOIN routines r ON r.id = w.routine_id
             WHERE w.session_id = ?1 AND w.ended_at IS NOT NULL
             ORDER BY w.ended_at DESC, w.id DESC",
        )
        .map_err(DbError::QueryFailed)?;
    let rows = stmt
        .query_map(params![session_id], |row| {
            let id: i64 = row.get(0)?;
            let started_at: String = row.get(1)?;
            let ended_at: String = row.get(2)?;
            let total: Option<i64> = row.get(3)?;
            let routine_id: Option<i64> = row.get(4)?;
            let routine = match routine_id {
                Some(_) => Some(map_routine(row, 4)?),
                None => None,
            };
            Ok((
                id,
                parse_timestamp(1, &started_at)?,
                parse_timestamp(2, &ended_at)?,
                total,
                routine,
            ))
        })
        .map_err(DbError::QueryFailed)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(DbError::QueryFailed)?;

    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut sets_by_workout = list_history_sets(conn, session_id)?;

    let items = rows
        .into_iter()
        .filter_map(|(id, started_at, ended_at, total, routine)| {
            let Some(routine) = routine else {
                warn!(workout_id = id, "Skipping completed workout whose routine is missing");
                return None;
            };
            Some(WorkoutHistoryItem {
                id,
                started_at,
                ended_at,
                total_duration_seconds: total,
                routine,
                sets: sets_by_workout.remove(&id).unwrap_or_default(),
            })
        })
        .collect();
    Ok(items)
}

fn list_history_sets(
    conn: &Connection,
    session_id: &str,
) -> Result<HashMap<i64, Vec<HistorySet>>, DbError> {
    let mut stmt = conn
        .prepare(
            "SELECT s.workout_id, s.id, s.reps, s.weight_kg, s.completed_at,
                    e.id, e.name, e.muscle_group, e.equipment
             FROM session_sets s
             JOIN workout_sessions w ON w.id = s.workout_id
             JOIN exercises e ON e.id = s.exercise_id
             WHERE w.session_id = ?1 AND w.ended_at IS NOT NULL
             ORDER BY s.completed_at ASC, s.id ASC",
        )
        .map_err(DbError::QueryFailed)?;
    let iter = stmt
        .query_map(params![session_id], |row| {
            let workout_id: i64 = row.get(0)?;
            let completed_at: String = row.get(4)?;
            Ok((
                workout_id,
                HistorySet {
                    id: row.get(1)?,
                    reps: row.get(2)?,
                    weight_kg: row.get(3)?,
                    completed_at: parse_timestamp(4, &completed_at)?,
                    exercise: map_exercise(row, 5)?,
                },
            ))
        })
        .map_err(DbError::QueryFailed)?;

    let mut grouped: HashMap<i64, Vec<HistorySet>> = HashMap::new();
    for item in iter {
        let (workout_id, set) = item.map_err(DbError::QueryFailed)?;
        grouped.entry(workout_id).or_default().push(set);
    }
    Ok(grouped)
}
