// src/routine.rs
//! Routine editing and write-time validation.
//!
//! A [`RoutineDraft`] is the working copy of a routine's exercise list. Every
//! editing operation leaves `order_index` as the dense `0..n` sequence, so the
//! draft can be handed to the store as-is.

use std::collections::HashSet;

use crate::db::{ExerciseTargets, NewRoutineExercise, RoutineWithExercises};
use crate::error::{Error, Result};

pub const MIN_TARGET_SETS: u32 = 1;
pub const MAX_TARGET_SETS: u32 = 20;
pub const MIN_TARGET_REPS: u32 = 1;
pub const MAX_TARGET_REPS: u32 = 100;
pub const MAX_TARGET_WEIGHT_KG: f64 = 1000.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutineDraft {
    pub name: String,
    exercises: Vec<NewRoutineExercise>,
}

impl RoutineDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exercises: Vec::new(),
        }
    }

    /// Starts an edit from a stored routine, keeping its order.
    pub fn from_routine(routine: &RoutineWithExercises) -> Self {
        Self::from_entries(
            routine.routine.name.clone(),
            routine
                .exercises
                .iter()
                .map(|d| (d.entry.exercise_id, d.entry.targets)),
        )
    }

    /// Builds a draft without rejecting duplicates; [`validate`](Self::validate)
    /// reports them. Order follows the iterator.
    pub fn from_entries(
        name: impl Into<String>,
        entries: impl IntoIterator<Item = (i64, ExerciseTargets)>,
    ) -> Self {
        let mut draft = Self::new(name);
        draft.exercises = entries
            .into_iter()
            .map(|(exercise_id, targets)| NewRoutineExercise {
                exercise_id,
                order_index: 0,
                targets,
            })
            .collect();
        draft.reindex();
        draft
    }

    pub fn exercises(&self) -> &[NewRoutineExercise] {
        &self.exercises
    }

    pub fn len(&self) -> usize {
        self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exercises.is_empty()
    }

    pub fn contains(&self, exercise_id: i64) -> bool {
        self.exercises.iter().any(|e| e.exercise_id == exercise_id)
    }

    /// Appends an exercise at the end of the list.
    pub fn add_exercise(&mut self, exercise_id: i64, targets: ExerciseTargets) -> Result<()> {
        if self.contains(exercise_id) {
            return Err(Error::DuplicateExercise(exercise_id));
        }
        self.exercises.push(NewRoutineExercise {
            exercise_id,
            order_index: 0,
            targets,
        });
        self.reindex();
        Ok(())
    }

    pub fn remove_exercise(&mut self, index: usize) -> Result<NewRoutineExercise> {
        if index >= self.exercises.len() {
            return Err(out_of_range(index, self.exercises.len()));
        }
        let removed = self.exercises.remove(index);
        self.reindex();
        Ok(removed)
    }

    /// Moves the exercise at `from` so that it ends up at position `to`.
    pub fn move_exercise(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.exercises.len();
        if from >= len {
            return Err(out_of_range(from, len));
        }
        if to >= len {
            return Err(out_of_range(to, len));
        }
        let item = self.exercises.remove(from);
        self.exercises.insert(to, item);
        self.reindex();
        Ok(())
    }

    pub fn update_targets(&mut self, index: usize, targets: ExerciseTargets) -> Result<()> {
        let len = self.exercises.len();
        let entry = self
            .exercises
            .get_mut(index)
            .ok_or_else(|| out_of_range(index, len))?;
        entry.targets = targets;
        Ok(())
    }

    fn reindex(&mut self) {
        for (i, e) in self.exercises.iter_mut().enumerate() {
            // Routines are far smaller than u32::MAX.
            e.order_index = i as u32;
        }
    }

    /// Checks the draft can be written and returns the trimmed name.
    pub fn validate(&self) -> Result<&str> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::validation("Routine name is required"));
        }
        if self.exercises.is_empty() {
            return Err(Error::validation("Add at least one exercise"));
        }

        let mut seen = HashSet::with_capacity(self.exercises.len());
        for e in &self.exercises {
            if !seen.insert(e.exercise_id) {
                return Err(Error::DuplicateExercise(e.exercise_id));
            }
            validate_targets(&e.targets)?;
        }
        Ok(name)
    }
}

fn out_of_range(index: usize, len: usize) -> Error {
    Error::validation(format!(
        "Exercise position {} is out of range (routine has {len} exercises)",
        index + 1
    ))
}

pub fn validate_targets(targets: &ExerciseTargets) -> Result<()> {
    if !(MIN_TARGET_SETS..=MAX_TARGET_SETS).contains(&targets.sets) {
        return Err(Error::validation(format!(
            "Target sets must be between {MIN_TARGET_SETS} and {MAX_TARGET_SETS}"
        )));
    }
    if !(MIN_TARGET_REPS..=MAX_TARGET_REPS).contains(&targets.reps) {
        return Err(Error::validation(format!(
            "Target reps must be between {MIN_TARGET_REPS} and {MAX_TARGET_REPS}"
        )));
    }
    if let Some(w) = targets.weight_kg {
        if !w.is_finite() || !(0.0..=MAX_TARGET_WEIGHT_KG).contains(&w) {
            return Err(Error::validation(format!(
                "Target weight must be between 0 and {MAX_TARGET_WEIGHT_KG} kg"
            )));
        }
    }
    Ok(())
}
