// src/templates.rs
//! Starter programmes that can be copied into a user's own routines.
//!
//! Template exercises are referenced by name and matched against the catalog
//! when copied, so a template never depends on database ids.

use crate::db::ExerciseTargets;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateExercise {
    pub name: &'static str,
    pub targets: ExerciseTargets,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkoutTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub source: &'static str,
    pub source_type: &'static str,
    pub days_per_week: u8,
    pub focus: &'static str,
    pub exercises: &'static [TemplateExercise],
}

const fn ex(name: &'static str, sets: u32, reps: u32, rest_seconds: u32) -> TemplateExercise {
    TemplateExercise {
        name,
        targets: ExerciseTargets {
            sets,
            reps,
            weight_kg: None,
            rest_seconds,
        },
    }
}

pub const WORKOUT_TEMPLATES: &[WorkoutTemplate] = &[
    WorkoutTemplate {
        id: "huberman-foundational",
        name: "Huberman Foundational Fitness",
        source: "Andrew Huberman",
        source_type: "Neuroscientist",
        days_per_week: 3,
        focus: "Strength + Endurance",
        exercises: &[
            ex("Barbell Squat", 3, 8, 90),
            ex("Barbell Bench Press", 3, 8, 90),
            ex("Barbell Row", 3, 8, 90),
            ex("Overhead Press", 3, 8, 90),
            ex("Deadlift", 3, 5, 120),
        ],
    },
    WorkoutTemplate {
        id: "stronglifts-5x5",
        name: "StrongLifts 5x5",
        source: "Mehdi Hadim",
        source_type: "Strength Coach",
        days_per_week: 3,
        focus: "Strength",
        exercises: &[
            ex("Barbell Squat", 5, 5, 180),
            ex("Barbell Bench Press", 5, 5, 180),
            ex("Barbell Row", 5, 5, 180),
        ],
    },
    WorkoutTemplate {
        id: "ppl-classic",
        name: "Push/Pull/Legs Classic",
        source: "Bodybuilding",
        source_type: "Classic Split",
        days_per_week: 6,
        focus: "Hypertrophy",
        exercises: &[
            ex("Barbell Bench Press", 4, 10, 60),
            ex("Overhead Press", 3, 10, 60),
            ex("Dumbbell Flyes", 3, 12, 60),
            ex("Tricep Dips", 3, 12, 60),
        ],
    },
    WorkoutTemplate {
        id: "starting-strength",
        name: "Starting Strength",
        source: "Mark Rippetoe",
        source_type: "Strength Coach",
        days_per_week: 3,
        focus: "Beginner Strength",
        exercises: &[
            ex("Barbell Squat", 3, 5, 180),
            ex("Barbell Bench Press", 3, 5, 180),
            ex("Deadlift", 1, 5, 180),
        ],
    },
];

/// Looks a template up by its id (case-insensitive).
pub fn find_template(id: &str) -> Option<&'static WorkoutTemplate> {
    WORKOUT_TEMPLATES
        .iter()
        .find(|t| t.id.eq_ignore_ascii_case(id.trim()))
}

/// Name given to a routine copied from `template`.
pub fn routine_name_for(template: &WorkoutTemplate) -> String {
    format!("My {}", template.name)
}
