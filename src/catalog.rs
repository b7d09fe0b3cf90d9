// src/catalog.rs
//! Built-in exercise library, seeded into the `exercises` table on first run.

/// One row of the seed catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub muscle_group: &'static str,
    pub equipment: &'static str,
}

const fn entry(
    name: &'static str,
    muscle_group: &'static str,
    equipment: &'static str,
) -> CatalogEntry {
    CatalogEntry {
        name,
        muscle_group,
        equipment,
    }
}

/// Muscle groups used by the filter in `exercises --muscle`.
pub const MUSCLE_GROUPS: &[&str] = &["chest", "back", "legs", "arms", "shoulders", "core"];

pub const EXERCISES: &[CatalogEntry] = &[
    // Chest
    entry("Barbell Bench Press", "chest", "barbell"),
    entry("Incline Dumbbell Press", "chest", "dumbbell"),
    entry("Dumbbell Flyes", "chest", "dumbbell"),
    entry("Push-ups", "chest", "bodyweight"),
    entry("Cable Crossover", "chest", "cable"),
    // Back
    entry("Deadlift", "back", "barbell"),
    entry("Barbell Row", "back", "barbell"),
    entry("Pull-ups", "back", "bodyweight"),
    entry("Lat Pulldown", "back", "cable"),
    entry("Seated Cable Row", "back", "cable"),
    // Legs
    entry("Barbell Squat", "legs", "barbell"),
    entry("Romanian Deadlift", "legs", "barbell"),
    entry("Leg Press", "legs", "machine"),
    entry("Walking Lunges", "legs", "dumbbell"),
    entry("Leg Curl", "legs", "machine"),
    entry("Calf Raises", "legs", "machine"),
    // Arms
    entry("Barbell Curl", "arms", "barbell"),
    entry("Hammer Curl", "arms", "dumbbell"),
    entry("Tricep Dips", "arms", "bodyweight"),
    entry("Tricep Pushdown", "arms", "cable"),
    entry("Skull Crushers", "arms", "barbell"),
    // Shoulders
    entry("Overhead Press", "shoulders", "barbell"),
    entry("Lateral Raises", "shoulders", "dumbbell"),
    entry("Face Pulls", "shoulders", "cable"),
    entry("Arnold Press", "shoulders", "dumbbell"),
    // Core
    entry("Plank", "core", "bodyweight"),
    entry("Hanging Leg Raise", "core", "bodyweight"),
    entry("Cable Crunch", "core", "cable"),
    entry("Ab Wheel Rollout", "core", "other"),
];
