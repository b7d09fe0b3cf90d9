// src/error.rs
use thiserror::Error;

use crate::db::DbError;

/// Errors surfaced by routine and workout operations.
///
/// None of these are retried by the library; callers decide what to show.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Routine not found: ID {0}")]
    RoutineNotFound(i64),
    #[error("Workout session not found: ID {0}")]
    WorkoutNotFound(i64),
    #[error("Duplicate exercises are not allowed (exercise ID {0} appears more than once)")]
    DuplicateExercise(i64),
    #[error("Failed to start workout session: {0}")]
    SessionCreate(#[source] DbError),
    #[error("Failed to log set: {0}")]
    SetLog(#[source] DbError),
    #[error("Cannot {action} a workout that is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
    #[error("Storage error: {0}")]
    Persistence(#[from] DbError),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
