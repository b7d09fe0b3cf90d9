//src/main.rs
mod cli; // Keep cli module for parsing args

use anyhow::{bail, Context, Result};
use chrono::{Duration, Local};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use std::io::{self, stdout, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::prelude::*;

use strongo_lib::history::{self, HeatMap};
use strongo_lib::session::{format_clock, format_rest_clock};
use strongo_lib::timer::{SessionTimers, TickUpdate};
use strongo_lib::{
    AbandonedWorkout, ActiveWorkout, AppService, DateGroup, Exercise, ExercisePhase,
    ExerciseTargets, Routine, RoutineDraft, RoutineWithExercises, RestTick, Units,
    WorkoutHistoryItem, WORKOUT_TEMPLATES,
};

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("STRONGO_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli_args = cli::parse_args(); // Parse arguments once
    let export_csv = cli_args.export_csv;

    if let cli::Commands::GenerateCompletion { shell } = cli_args.command {
        let mut cmd = cli::build_cli_command();
        let bin_name = cmd.get_name().to_string();
        eprintln!("Generating completion script for {shell}...");
        clap_complete::generate(shell, &mut cmd, bin_name, &mut stdout());
        return Ok(());
    }

    init_tracing();

    // Initialize the application service (loads config, connects to DB)
    let mut service =
        AppService::initialize().context("Failed to initialize application service")?;
    let header_color = service.config.theme.header_color();
    let units = service.config.units;

    match cli_args.command {
        cli::Commands::GenerateCompletion { .. } => {
            unreachable!("Completion generation should have exited already");
        }
        cli::Commands::Exercises { muscle } => {
            let exercises = service.list_exercises(muscle.as_deref())?;
            if exercises.is_empty() {
                println!("No exercises found for muscle group '{}'.", muscle.unwrap_or_default());
            } else if export_csv {
                print_exercise_csv(&exercises)?;
            } else {
                print_exercise_table(&exercises, header_color);
            }
        }
        cli::Commands::Routines => {
            let routines = service.list_routines()?;
            if routines.is_empty() {
                println!("No routines yet. Create one with 'create-routine' or 'use-template'.");
            } else {
                let detailed = routines
                    .iter()
                    .map(|r| service.get_routine(r.id))
                    .collect::<Result<Vec<_>, _>>()?;
                print_routine_list(&detailed, header_color);
            }
        }
        cli::Commands::ShowRoutine { id } => {
            let routine = service.get_routine(id)?;
            print_routine_detail(&routine, header_color, units);
        }
        cli::Commands::CreateRoutine { name, exercises } => {
            let mut draft = RoutineDraft::new(name);
            for raw in &exercises {
                let spec = cli::parse_exercise_spec(raw).map_err(anyhow::Error::msg)?;
                let exercise = service.find_exercise(&spec.exercise)?;
                let targets = targets_from_spec(&spec, None, &service);
                draft.add_exercise(exercise.id, targets)?;
            }
            let routine = service.create_routine(&draft)?;
            println!(
                "Created routine '{}' (ID: {}) with {} exercise(s).",
                routine.routine.name,
                routine.routine.id,
                routine.exercises.len()
            );
        }
        cli::Commands::EditRoutine {
            id,
            name,
            add,
            remove,
            targets,
            moves,
        } => {
            let existing = service.get_routine(id)?;
            let mut draft = RoutineDraft::from_routine(&existing);
            if let Some(new_name) = name {
                draft.name = new_name;
            }
            for ident in &remove {
                let index = draft_position(&service, &draft, ident)?;
                draft.remove_exercise(index)?;
            }
            for raw in &add {
                let spec = cli::parse_exercise_spec(raw).map_err(anyhow::Error::msg)?;
                let exercise = service.find_exercise(&spec.exercise)?;
                draft.add_exercise(exercise.id, targets_from_spec(&spec, None, &service))?;
            }
            for raw in &targets {
                let spec = cli::parse_exercise_spec(raw).map_err(anyhow::Error::msg)?;
                let index = draft_position(&service, &draft, &spec.exercise)?;
                let current = draft.exercises()[index].targets;
                draft.update_targets(index, targets_from_spec(&spec, Some(current), &service))?;
            }
            for raw in &moves {
                let (ident, position) = cli::parse_move(raw).map_err(anyhow::Error::msg)?;
                let index = draft_position(&service, &draft, &ident)?;
                draft.move_exercise(index, position - 1)?;
            }
            let updated = service.update_routine(id, &draft)?;
            println!("Updated routine '{}' (ID: {}).", updated.routine.name, id);
            print_routine_detail(&updated, header_color, units);
        }
        cli::Commands::DeleteRoutine { id } => {
            service.delete_routine(id)?;
            println!("Deleted routine ID {id} and its workouts.");
        }
        cli::Commands::Templates => print_template_table(header_color),
        cli::Commands::UseTemplate { template } => {
            let routine = service.copy_template_to_routine(&template)?;
            println!(
                "Created routine '{}' (ID: {}) from template.",
                routine.routine.name, routine.routine.id
            );
            print_routine_detail(&routine, header_color, units);
        }
        cli::Commands::Workout { routine_id, resume } => {
            let workout = match (resume, routine_id) {
                (Some(workout_id), _) => service.resume_workout(workout_id)?,
                (None, Some(routine_id)) => service.start_workout(routine_id)?,
                (None, None) => bail!("Give a routine id or --resume <WORKOUT_ID>"),
            };
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start the workout timer runtime")?;
            runtime.block_on(run_workout(&service, workout))?;
        }
        cli::Commands::History { limit, sets } => {
            let mut workouts = service.workout_history()?;
            if let Some(n) = limit {
                workouts.truncate(n);
            }
            if workouts.is_empty() {
                println!("No completed workouts yet.");
            } else if export_csv {
                print_history_csv(&workouts, units)?;
            } else {
                print_history(&service, &workouts, sets, header_color, units);
            }
        }
        cli::Commands::Heatmap { weeks } => {
            let map = service.heat_map(weeks)?;
            let stats = service.history_stats()?;
            print_heat_map(&map);
            print!(
                "\nWorkouts: {}   Active days: {}",
                stats.total_workouts, stats.active_days
            );
            if stats.streak > 0 {
                print!(
                    "   Streak: {} day{}",
                    stats.streak,
                    if stats.streak == 1 { "" } else { "s" }
                );
            }
            println!();
        }
        cli::Commands::Abandoned => {
            let abandoned = service.list_abandoned_workouts()?;
            if abandoned.is_empty() {
                println!("No unfinished workouts.");
            } else {
                print_abandoned_table(&abandoned, header_color);
                println!("Unfinished workouts are kept out of history. Resume one with 'workout --resume <ID>'.");
            }
        }
        cli::Commands::PruneAbandoned { older_than_days } => {
            let removed = service
                .prune_abandoned_workouts(Duration::days(i64::from(older_than_days)), None)?;
            println!("Removed {removed} unfinished workout(s) older than {older_than_days} day(s).");
        }
        cli::Commands::SetUnits { units } => {
            let units = match units {
                cli::UnitsCli::Metric => Units::Metric,
                cli::UnitsCli::Imperial => Units::Imperial,
            };
            service.set_units(units)?;
            println!("Units set to {units:?}.");
        }
        cli::Commands::SetHeatmapWeeks { weeks } => {
            service.set_heatmap_weeks(weeks)?;
            println!("Heat map now shows {weeks} weeks by default.");
        }
        cli::Commands::SetHeaderColor { color } => {
            service.set_header_color(&color)?;
            println!("Header color set to {}.", service.config.theme.header_color);
        }
        cli::Commands::ConfigPath => println!("{}", service.get_config_path().display()),
        cli::Commands::DbPath => println!("{}", service.get_db_path().display()),
    }

    Ok(())
}

fn targets_from_spec(
    spec: &cli::ExerciseSpec,
    current: Option<ExerciseTargets>,
    service: &AppService,
) -> ExerciseTargets {
    let base = current.unwrap_or(ExerciseTargets {
        rest_seconds: service.config.default_rest_seconds,
        ..ExerciseTargets::default()
    });
    ExerciseTargets {
        sets: spec.sets.unwrap_or(base.sets),
        reps: spec.reps.unwrap_or(base.reps),
        weight_kg: spec
            .weight
            .map(|w| service.config.units.input_to_kg(w))
            .or(base.weight_kg),
        rest_seconds: spec.rest_seconds.unwrap_or(base.rest_seconds),
    }
}

fn draft_position(service: &AppService, draft: &RoutineDraft, identifier: &str) -> Result<usize> {
    let exercise = service.find_exercise(identifier)?;
    draft
        .exercises()
        .iter()
        .position(|e| e.exercise_id == exercise.id)
        .with_context(|| format!("'{}' is not in this routine", exercise.name))
}

fn format_weight(kg: Option<f64>, units: Units) -> String {
    kg.map_or("-".to_string(), |v| {
        format!("{:.1} {}", units.display_weight(v), units.weight_label())
    })
}

// --- Interactive workout ---

const WORKOUT_HELP: &str = "\
Commands:
  <enter>                 log the current exercise with its target reps/weight
  <reps> [weight]         log a set for the current exercise
  log <N> <reps> [weight] log a set for exercise number N
  skip | pause | resume   control the rest timer
  status                  show progress
  done                    complete the workout (done! to finish early)
  quit                    leave without completing (the workout stays unfinished)
  help                    show this help";

enum Flow {
    Continue,
    Finished,
}

async fn run_workout(service: &AppService, mut workout: ActiveWorkout) -> Result<()> {
    let units = service.config.units;
    let (mut timers, mut ticks) = SessionTimers::new();
    timers.start_elapsed();

    println!(
        "Workout #{} · {} ({} exercises)",
        workout.workout_id(),
        workout.routine().routine.name,
        workout.routine().exercises.len()
    );
    println!("{WORKOUT_HELP}\n");
    print_workout_status(service, &workout, units);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    service.abandon_workout(&mut workout)?;
                    println!("\nInput closed; the workout stays unfinished.");
                    break;
                };
                match handle_workout_input(service, &mut workout, &mut timers, line.trim(), units) {
                    Ok(Flow::Finished) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => println!("Error: {e}"),
                }
            }
            Some(event) = ticks.recv() => match timers.apply(event, &mut workout) {
                None => {}
                Some(TickUpdate::Rest(RestTick::Finished { .. })) => {
                    eprintln!("\r{:<40}", "Rest over.");
                    print_next_up(&workout, units);
                }
                Some(TickUpdate::Elapsed | TickUpdate::Rest(_)) => {
                    let line = live_status_line(service.elapsed_seconds(&workout), &workout);
                    eprint!("\r{line:<40}");
                    io::stderr().flush().ok();
                }
            },
        }
    }

    timers.stop_all();
    Ok(())
}

/// The line redrawn on every tick, e.g. `Elapsed 12:34 · Rest 01:05`.
fn live_status_line(elapsed_seconds: i64, workout: &ActiveWorkout) -> String {
    let mut line = format!("Elapsed {}", format_clock(elapsed_seconds));
    if let Some(rest) = workout.rest() {
        line.push_str(" · Rest ");
        line.push_str(&format_rest_clock(rest.remaining_seconds));
        if rest.paused {
            line.push_str(" (paused)");
        }
    }
    line
}

fn handle_workout_input(
    service: &AppService,
    workout: &mut ActiveWorkout,
    timers: &mut SessionTimers,
    input: &str,
    units: Units,
) -> Result<Flow> {
    let mut words = input.split_whitespace();
    match words.next() {
        None => {
            let Some(current) = workout.current_exercise() else {
                println!("All exercises are complete. Type 'done' to finish.");
                return Ok(Flow::Continue);
            };
            let (id, reps, weight) = (
                current.entry.exercise_id,
                current.entry.targets.reps,
                current.entry.targets.weight_kg,
            );
            log_and_report(service, workout, timers, id, i64::from(reps), weight, units)?;
        }
        Some("help") => println!("{WORKOUT_HELP}"),
        Some("status") => print_workout_status(service, workout, units),
        Some("skip") => {
            if workout.skip_rest().is_some() {
                timers.stop_rest();
                println!("Rest skipped.");
                print_next_up(workout, units);
            }
        }
        Some("pause") => {
            if workout.pause_rest() {
                println!("Rest paused.");
            }
        }
        Some("resume") => {
            if workout.resume_rest() {
                println!("Rest resumed.");
            }
        }
        Some(cmd @ ("done" | "done!")) => {
            if !workout.is_all_complete() && cmd == "done" {
                println!("Not every exercise is complete. Type 'done!' to finish anyway.");
                return Ok(Flow::Continue);
            }
            let session = service.complete_workout(workout)?;
            timers.stop_all();
            let volume = history::compute_volume(workout.sets());
            println!(
                "Workout complete in {} · {} sets · volume {}",
                history::format_duration_seconds(session.total_duration_seconds.unwrap_or(0)),
                workout.sets().len(),
                history::format_volume(volume)
            );
            return Ok(Flow::Finished);
        }
        Some("quit") => {
            service.abandon_workout(workout)?;
            println!(
                "Left workout #{} unfinished. It will not appear in history.",
                workout.workout_id()
            );
            return Ok(Flow::Finished);
        }
        Some("log") => {
            let number: usize = words
                .next()
                .context("Usage: log <N> <reps> [weight]")?
                .parse()
                .context("Exercise number must be a positive integer")?;
            let exercise_id = number
                .checked_sub(1)
                .and_then(|i| workout.routine().exercises.get(i))
                .map(|d| d.entry.exercise_id)
                .with_context(|| format!("No exercise number {number} in this routine"))?;
            let (reps, weight) = parse_reps_weight(words.next(), words.next(), units)?;
            log_and_report(service, workout, timers, exercise_id, reps, weight, units)?;
        }
        Some(first) => {
            let Some(current) = workout.current_exercise() else {
                println!("All exercises are complete. Use 'log <N> ...' for extra sets or 'done'.");
                return Ok(Flow::Continue);
            };
            let exercise_id = current.entry.exercise_id;
            let (reps, weight) = parse_reps_weight(Some(first), words.next(), units)?;
            let weight = weight.or(current.entry.targets.weight_kg);
            log_and_report(service, workout, timers, exercise_id, reps, weight, units)?;
        }
    }
    Ok(Flow::Continue)
}

fn parse_reps_weight(
    reps: Option<&str>,
    weight: Option<&str>,
    units: Units,
) -> Result<(i64, Option<f64>)> {
    let reps: i64 = reps
        .context("Reps are required")?
        .parse()
        .context("Reps must be a whole number")?;
    let weight = weight
        .map(|w| w.parse::<f64>().context("Weight must be a number"))
        .transpose()?
        .map(|w| units.input_to_kg(w));
    Ok((reps, weight))
}

fn log_and_report(
    service: &AppService,
    workout: &mut ActiveWorkout,
    timers: &mut SessionTimers,
    exercise_id: i64,
    reps: i64,
    weight_kg: Option<f64>,
    units: Units,
) -> Result<()> {
    let outcome = service.log_set(workout, exercise_id, reps, weight_kg)?;
    let name = workout
        .exercise(exercise_id)
        .map_or("exercise", |d| d.exercise.name.as_str());
    println!(
        "Logged {} × {} for {}.",
        outcome.set.reps,
        format_weight(outcome.set.weight_kg, units),
        name
    );
    match outcome.rest_started {
        Some(secs) => {
            timers.start_rest();
            println!("Rest {} (skip | pause).", format_rest_clock(secs));
        }
        None => {
            timers.stop_rest();
            if outcome.all_complete {
                println!("All exercises complete! Type 'done' to finish.");
            } else {
                print_next_up(workout, units);
            }
        }
    }
    Ok(())
}

fn print_next_up(workout: &ActiveWorkout, units: Units) {
    if let Some(current) = workout.current_exercise() {
        let done = strongo_lib::session::completed_count(current.entry.exercise_id, workout.sets());
        println!(
            "Next: {} · set {}/{} · {} reps @ {}",
            current.exercise.name,
            done + 1,
            current.entry.targets.sets,
            current.entry.targets.reps,
            format_weight(current.entry.targets.weight_kg, units)
        );
    }
}

fn print_workout_status(service: &AppService, workout: &ActiveWorkout, units: Units) {
    let progress = workout.progress();
    println!(
        "Elapsed {} · {}/{} exercises ({}%)",
        format_clock(service.elapsed_seconds(workout)),
        progress.completed_exercises,
        progress.total_exercises,
        progress.percent
    );
    for (i, p) in workout.exercise_progress().iter().enumerate() {
        let marker = match p.phase {
            ExercisePhase::Complete => "✓",
            ExercisePhase::Resting => "…",
            ExercisePhase::AwaitingInput if p.is_current => "›",
            ExercisePhase::AwaitingInput => " ",
        };
        let rest = p
            .rest_remaining_seconds
            .map(|s| format!("  rest {}", format_rest_clock(s)))
            .unwrap_or_default();
        println!(
            " {marker} {}. {:<28} {}/{} sets · {} reps @ {}{rest}",
            i + 1,
            p.name,
            p.completed_sets,
            p.target_sets,
            p.default_reps,
            format_weight(p.default_weight_kg, units)
        );
    }
}

// --- Tables ---

fn header(names: &[&str], color: Color) -> Vec<Cell> {
    names.iter().map(|n| Cell::new(n).fg(color)).collect()
}

fn new_table(names: &[&str], color: Color) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header(names, color));
    table
}

fn print_exercise_table(exercises: &[Exercise], header_color: Color) {
    let mut table = new_table(&["ID", "Name", "Muscle Group", "Equipment"], header_color);
    for e in exercises {
        table.add_row(vec![
            Cell::new(e.id),
            Cell::new(&e.name),
            Cell::new(&e.muscle_group),
            Cell::new(&e.equipment),
        ]);
    }
    println!("{table}");
}

fn print_routine_list(routines: &[RoutineWithExercises], header_color: Color) {
    let mut table = new_table(&["ID", "Name", "Exercises", "Created"], header_color);
    for r in routines {
        table.add_row(vec![
            Cell::new(r.routine.id),
            Cell::new(&r.routine.name),
            Cell::new(r.exercises.len()),
            Cell::new(created_label(&r.routine)),
        ]);
    }
    println!("{table}");
}

fn created_label(routine: &Routine) -> String {
    routine
        .created_at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn print_routine_detail(routine: &RoutineWithExercises, header_color: Color, units: Units) {
    println!(
        "{} (ID: {}, created {})",
        routine.routine.name,
        routine.routine.id,
        created_label(&routine.routine)
    );
    let mut table = new_table(&["#", "Exercise", "Sets", "Reps", "Weight", "Rest"], header_color);
    for d in &routine.exercises {
        let t = &d.entry.targets;
        table.add_row(vec![
            Cell::new(d.entry.order_index + 1),
            Cell::new(&d.exercise.name),
            Cell::new(t.sets),
            Cell::new(t.reps),
            Cell::new(format_weight(t.weight_kg, units)),
            Cell::new(if t.rest_seconds == 0 {
                "-".to_string()
            } else {
                format_rest_clock(t.rest_seconds)
            }),
        ]);
    }
    println!("{table}");
}

fn print_template_table(header_color: Color) {
    let mut table = new_table(
        &["ID", "Name", "By", "Days/Week", "Focus", "Exercises"],
        header_color,
    );
    for t in WORKOUT_TEMPLATES {
        let exercises = t
            .exercises
            .iter()
            .map(|e| format!("{} {}x{}", e.name, e.targets.sets, e.targets.reps))
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(t.id),
            Cell::new(t.name).add_attribute(Attribute::Bold),
            Cell::new(format!("{} ({})", t.source, t.source_type)),
            Cell::new(t.days_per_week),
            Cell::new(t.focus),
            Cell::new(exercises),
        ]);
    }
    println!("{table}");
}

fn print_history(
    service: &AppService,
    workouts: &[WorkoutHistoryItem],
    show_sets: bool,
    header_color: Color,
    units: Units,
) {
    for (group, items) in service.group_history(workouts) {
        println!("\n{}", group_heading(group));
        let mut table = new_table(
            &["ID", "Routine", "Finished", "Duration", "Exercises", "Sets", "Volume"],
            header_color,
        );
        for w in &items {
            table.add_row(vec![
                Cell::new(w.id),
                Cell::new(&w.routine.name),
                Cell::new(w.ended_at.with_timezone(&Local).format("%a %b %e %H:%M").to_string()),
                Cell::new(history::format_duration_seconds(history::workout_duration_seconds(w))),
                Cell::new(history::count_unique_exercises(&w.sets)),
                Cell::new(w.sets.len()),
                Cell::new(history::format_volume(history::compute_volume(&w.sets))),
            ]);
        }
        println!("{table}");

        if show_sets {
            for w in &items {
                println!("#{} {}", w.id, w.routine.name);
                for group in history::group_sets_by_exercise(&w.sets) {
                    let sets = group
                        .sets
                        .iter()
                        .map(|s| format!("{}×{}", s.reps, format_weight(s.weight_kg, units)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("    {}: {sets}", group.exercise.name);
                }
            }
        }
    }
}

fn group_heading(group: DateGroup) -> String {
    let label = group.label();
    format!("{label}\n{}", "─".repeat(label.chars().count()))
}

fn print_heat_map(map: &HeatMap) {
    const SHADES: [char; 5] = ['·', '░', '▒', '▓', '█'];
    const DAY_LABELS: [&str; 7] = ["M", " ", "W", " ", "F", " ", "S"];

    let mut months = vec![' '; map.weeks.len() * 2];
    for (column, label) in &map.month_labels {
        for (i, ch) in label.chars().enumerate() {
            if let Some(slot) = months.get_mut(column * 2 + i) {
                *slot = ch;
            }
        }
    }
    println!("   {}", months.into_iter().collect::<String>());

    for (d, label) in DAY_LABELS.iter().enumerate() {
        let row: String = map
            .weeks
            .iter()
            .map(|week| {
                let day = &week[d];
                let ch = if day.is_future {
                    ' '
                } else {
                    SHADES[usize::from(day.intensity)]
                };
                format!("{ch} ")
            })
            .collect();
        println!("{label}  {row}");
    }
    println!("\n   Less {} More", SHADES.iter().collect::<String>());
}

fn print_abandoned_table(abandoned: &[AbandonedWorkout], header_color: Color) {
    let mut table = new_table(&["Workout ID", "Routine", "Started", "Sets Logged"], header_color);
    for a in abandoned {
        table.add_row(vec![
            Cell::new(a.session.id),
            Cell::new(a.routine_name.as_deref().unwrap_or("-")),
            Cell::new(
                a.session
                    .started_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string(),
            ),
            Cell::new(a.set_count),
        ]);
    }
    println!("{table}");
}

// --- CSV ---

fn print_exercise_csv(exercises: &[Exercise]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(["ID", "Name", "Muscle_Group", "Equipment"])?;
    for e in exercises {
        writer.write_record([
            e.id.to_string(),
            e.name.clone(),
            e.muscle_group.clone(),
            e.equipment.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn print_history_csv(workouts: &[WorkoutHistoryItem], units: Units) -> Result<()> {
    write_history_csv(io::stdout(), workouts, units)
}

/// One row per set so the export can be re-aggregated elsewhere. A workout
/// without sets still gets one row, with the set columns left empty.
fn write_history_csv<W: Write>(out: W, workouts: &[WorkoutHistoryItem], units: Units) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    let weight_header = format!("Weight_{}", units.weight_label());
    writer.write_record([
        "Workout_ID",
        "Routine",
        "Started_UTC",
        "Ended_UTC",
        "Duration_s",
        "Exercise",
        "Reps",
        weight_header.as_str(),
        "Set_Completed_UTC",
    ])?;
    for w in workouts {
        let workout_columns = [
            w.id.to_string(),
            w.routine.name.clone(),
            w.started_at.to_rfc3339(),
            w.ended_at.to_rfc3339(),
            history::workout_duration_seconds(w).to_string(),
        ];
        if w.sets.is_empty() {
            writer.write_record(workout_columns.iter().cloned().chain(vec![String::new(); 4]))?;
        }
        for s in &w.sets {
            let set_columns = [
                s.exercise.name.clone(),
                s.reps.to_string(),
                s.weight_kg
                    .map_or(String::new(), |v| format!("{:.2}", units.display_weight(v))),
                s.completed_at.to_rfc3339(),
            ];
            writer.write_record(workout_columns.iter().cloned().chain(set_columns))?;
        }
    }
    writer.flush()?;
    Ok(())
}
