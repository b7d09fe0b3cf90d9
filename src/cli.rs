// src/cli.rs
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(author, version, about = "Plan routines, run timed workouts and review your training history", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print history and exercise listings as CSV instead of tables
    #[arg(long, global = true)]
    pub export_csv: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitsCli {
    Metric,
    Imperial,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the exercise catalog
    Exercises {
        /// Only show one muscle group (chest, back, legs, arms, shoulders, core)
        #[arg(short, long)]
        muscle: Option<String>,
    },
    /// List your routines, newest first
    Routines,
    /// Show a routine with its exercises and targets
    ShowRoutine { id: i64 },
    /// Create a routine
    CreateRoutine {
        /// Name of the routine (e.g., "Push Day")
        name: String,
        /// Exercise with targets as NAME[:SETS[:REPS[:WEIGHT[:REST]]]]; use '-' for no weight.
        /// Repeat for each exercise, in order.
        #[arg(short, long = "exercise", required = true, value_name = "SPEC")]
        exercises: Vec<String>,
    },
    /// Edit a routine. Changes are applied in the order: remove, add, targets, move.
    EditRoutine {
        id: i64,
        /// New name
        #[arg(short, long)]
        name: Option<String>,
        /// Append an exercise (same SPEC format as create-routine)
        #[arg(short, long = "add", value_name = "SPEC")]
        add: Vec<String>,
        /// Remove an exercise by name or id
        #[arg(short, long = "remove", value_name = "EXERCISE")]
        remove: Vec<String>,
        /// Replace the targets of an exercise already in the routine (SPEC format)
        #[arg(short = 't', long = "targets", value_name = "SPEC")]
        targets: Vec<String>,
        /// Move an exercise to a 1-based position, as EXERCISE:POSITION
        #[arg(long = "move", value_name = "EXERCISE:POSITION")]
        moves: Vec<String>,
    },
    /// Delete a routine with all of its workouts
    DeleteRoutine { id: i64 },
    /// List the starter templates
    Templates,
    /// Copy a starter template into your routines
    UseTemplate {
        /// Template id (see `templates`)
        template: String,
    },
    /// Run a workout from a routine, with live rest and session timers
    Workout {
        /// Routine to start
        #[arg(required_unless_present = "resume", conflicts_with = "resume")]
        routine_id: Option<i64>,
        /// Continue an unfinished workout instead of starting a new one
        #[arg(long, value_name = "WORKOUT_ID")]
        resume: Option<i64>,
    },
    /// Show completed workouts grouped by date
    History {
        /// Show only the last N workouts
        #[arg(short, long)]
        limit: Option<usize>,
        /// Also list every set of each workout
        #[arg(short, long)]
        sets: bool,
    },
    /// Show the training heat map and streak
    Heatmap {
        /// Number of weeks to show (defaults to the configured value)
        #[arg(short, long)]
        weeks: Option<u32>,
    },
    /// List workouts that were started but never completed
    Abandoned,
    /// Delete unfinished workouts older than the given number of days
    PruneAbandoned {
        #[arg(long, default_value_t = 7)]
        older_than_days: u32,
    },
    /// Set the display units for weights
    SetUnits {
        #[arg(value_enum)]
        units: UnitsCli,
    },
    /// Set the number of weeks the heat map shows by default
    SetHeatmapWeeks { weeks: u32 },
    /// Set the table header colour (e.g., Green, DarkCyan)
    SetHeaderColor { color: String },
    /// Show the path to the config file
    ConfigPath,
    /// Show the path to the database file
    DbPath,
    /// Generate a shell completion script
    GenerateCompletion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// One exercise as typed on the command line. Missing targets fall back to
/// the routine defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ExerciseSpec {
    pub exercise: String,
    pub sets: Option<u32>,
    pub reps: Option<u32>,
    /// In the configured display units.
    pub weight: Option<f64>,
    pub rest_seconds: Option<u32>,
}

fn parse_field<T: std::str::FromStr>(value: Option<&str>, what: &str) -> Result<Option<T>, String> {
    match value.map(str::trim) {
        None | Some("") | Some("-") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| format!("Invalid {what} '{v}'")),
    }
}

/// Parses `NAME[:SETS[:REPS[:WEIGHT[:REST]]]]`.
pub fn parse_exercise_spec(spec: &str) -> Result<ExerciseSpec, String> {
    let mut parts = spec.split(':');
    let exercise = parts.next().unwrap_or_default().trim().to_string();
    if exercise.is_empty() {
        return Err(format!("Missing exercise name in '{spec}'"));
    }
    let parsed = ExerciseSpec {
        exercise,
        sets: parse_field(parts.next(), "sets")?,
        reps: parse_field(parts.next(), "reps")?,
        weight: parse_field(parts.next(), "weight")?,
        rest_seconds: parse_field(parts.next(), "rest seconds")?,
    };
    if parts.next().is_some() {
        return Err(format!("Too many ':' fields in '{spec}'"));
    }
    Ok(parsed)
}

/// Parses `EXERCISE:POSITION` with a 1-based position.
pub fn parse_move(spec: &str) -> Result<(String, usize), String> {
    let (exercise, position) = spec
        .rsplit_once(':')
        .ok_or_else(|| format!("Expected EXERCISE:POSITION, got '{spec}'"))?;
    let position: usize = position
        .trim()
        .parse()
        .map_err(|_| format!("Invalid position in '{spec}'"))?;
    if position == 0 {
        return Err("Positions start at 1".to_string());
    }
    Ok((exercise.trim().to_string(), position))
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
