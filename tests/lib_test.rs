use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use strongo_lib::{
    db, AppService, Config, DateGroup, Error, ExerciseTargets, ManualClock, RoutineDraft,
    WorkoutState,
};

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap()
}

// Helper function to create a test service with in-memory database
fn create_test_service() -> Result<(AppService, Arc<ManualClock>)> {
    let conn = rusqlite::Connection::open_in_memory()?;
    db::init_db(&conn)?;

    let config = Config {
        session_id: Some("test-session".to_string()),
        ..Default::default()
    };
    let clock = Arc::new(ManualClock::new(base_time()));

    Ok((
        AppService {
            config,
            conn,
            db_path: ":memory:".into(),
            config_path: "test_config.toml".into(),
            clock: clock.clone(),
        },
        clock,
    ))
}

fn targets(sets: u32, reps: u32, rest_seconds: u32) -> ExerciseTargets {
    ExerciseTargets {
        sets,
        reps,
        weight_kg: None,
        rest_seconds,
    }
}

fn exercise_id(service: &AppService, name: &str) -> Result<i64> {
    Ok(service.find_exercise(name)?.id)
}

fn routine_count(service: &AppService) -> Result<i64> {
    Ok(service
        .conn
        .query_row("SELECT COUNT(*) FROM routines", [], |r| r.get(0))?)
}

fn set_count(service: &AppService) -> Result<i64> {
    Ok(service
        .conn
        .query_row("SELECT COUNT(*) FROM session_sets", [], |r| r.get(0))?)
}

#[test]
fn test_exercise_catalog_is_seeded() -> Result<()> {
    let (service, _) = create_test_service()?;

    let all = service.list_exercises(None)?;
    assert!(all.len() >= 20);

    let legs = service.list_exercises(Some("legs"))?;
    assert!(!legs.is_empty());
    assert!(legs.iter().all(|e| e.muscle_group == "legs"));

    let squat = service.find_exercise("barbell SQUAT")?;
    assert_eq!(service.find_exercise(&squat.id.to_string())?, squat);
    assert!(matches!(
        service.find_exercise("Underwater Basket Weaving"),
        Err(Error::Validation(_))
    ));
    Ok(())
}

#[test]
fn test_create_routine_keeps_dense_order() -> Result<()> {
    let (mut service, _) = create_test_service()?;
    let bench = exercise_id(&service, "Barbell Bench Press")?;
    let ohp = exercise_id(&service, "Overhead Press")?;
    let dips = exercise_id(&service, "Tricep Dips")?;

    let mut draft = RoutineDraft::new("  Push Day  ");
    draft.add_exercise(bench, targets(4, 8, 120))?;
    draft.add_exercise(ohp, targets(3, 10, 90))?;
    draft.add_exercise(dips, targets(3, 12, 60))?;
    draft.move_exercise(2, 0)?;

    let created = service.create_routine(&draft)?;
    assert_eq!(created.routine.name, "Push Day");
    assert_eq!(created.routine.session_id, "test-session");
    assert_eq!(created.routine.created_at, base_time());

    let order: Vec<_> = created
        .exercises
        .iter()
        .map(|d| (d.exercise.id, d.entry.order_index))
        .collect();
    assert_eq!(order, vec![(dips, 0), (bench, 1), (ohp, 2)]);
    assert_eq!(created.exercises[1].entry.targets, targets(4, 8, 120));

    let listed = service.list_routines()?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, created.routine.id);
    Ok(())
}

#[test]
fn test_routines_listed_newest_first() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    let squat = exercise_id(&service, "Barbell Squat")?;

    let mut first = RoutineDraft::new("Old");
    first.add_exercise(squat, targets(3, 5, 0))?;
    service.create_routine(&first)?;

    clock.advance(Duration::hours(1));
    let mut second = RoutineDraft::new("New");
    second.add_exercise(squat, targets(3, 5, 0))?;
    service.create_routine(&second)?;

    let names: Vec<_> = service.list_routines()?.into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["New", "Old"]);
    Ok(())
}

#[test]
fn test_invalid_routines_write_nothing() -> Result<()> {
    let (mut service, _) = create_test_service()?;
    let squat = exercise_id(&service, "Barbell Squat")?;
    let row = exercise_id(&service, "Barbell Row")?;

    let duplicated = RoutineDraft::from_entries(
        "Legs",
        [(squat, targets(3, 5, 90)), (row, targets(3, 8, 90)), (squat, targets(2, 5, 90))],
    );
    assert!(matches!(
        service.create_routine(&duplicated),
        Err(Error::DuplicateExercise(id)) if id == squat
    ));

    let unnamed = RoutineDraft::from_entries(" ", [(squat, targets(3, 5, 90))]);
    assert!(matches!(service.create_routine(&unnamed), Err(Error::Validation(_))));

    let empty = RoutineDraft::new("Nothing");
    assert!(matches!(service.create_routine(&empty), Err(Error::Validation(_))));

    let too_many_reps = RoutineDraft::from_entries("Legs", [(squat, targets(3, 101, 90))]);
    assert!(matches!(service.create_routine(&too_many_reps), Err(Error::Validation(_))));

    let unknown = RoutineDraft::from_entries("Ghost", [(99_999, targets(3, 5, 90))]);
    assert!(matches!(service.create_routine(&unknown), Err(Error::Validation(_))));

    assert_eq!(routine_count(&service)?, 0);
    Ok(())
}

#[test]
fn test_update_routine_replaces_exercises() -> Result<()> {
    let (mut service, _) = create_test_service()?;
    let squat = exercise_id(&service, "Barbell Squat")?;
    let deadlift = exercise_id(&service, "Deadlift")?;
    let row = exercise_id(&service, "Barbell Row")?;

    let created = service.create_routine(&RoutineDraft::from_entries(
        "Pull",
        [(squat, targets(3, 5, 90)), (deadlift, targets(1, 5, 180))],
    ))?;

    let mut draft = RoutineDraft::from_routine(&created);
    draft.name = "Pull v2".to_string();
    draft.remove_exercise(0)?;
    draft.add_exercise(row, targets(4, 8, 60))?;
    draft.move_exercise(1, 0)?;
    draft.update_targets(1, targets(2, 3, 240))?;

    let updated = service.update_routine(created.routine.id, &draft)?;
    assert_eq!(updated.routine.name, "Pull v2");
    let order: Vec<_> = updated
        .exercises
        .iter()
        .map(|d| (d.exercise.id, d.entry.order_index, d.entry.targets.sets))
        .collect();
    assert_eq!(order, vec![(row, 0, 4), (deadlift, 1, 2)]);

    // A rejected update leaves the stored routine as it was.
    let bad = RoutineDraft::from_entries("Pull v3", [(row, targets(3, 5, 0)), (row, targets(3, 5, 0))]);
    assert!(service.update_routine(created.routine.id, &bad).is_err());
    assert_eq!(service.get_routine(created.routine.id)?, updated);

    assert!(matches!(
        service.update_routine(4242, &draft),
        Err(Error::RoutineNotFound(4242))
    ));
    Ok(())
}

#[test]
fn test_copy_template_to_routine() -> Result<()> {
    let (mut service, _) = create_test_service()?;

    let routine = service.copy_template_to_routine("STRONGLIFTS-5X5")?;
    assert!(routine.routine.name.starts_with("My "));
    assert!(!routine.exercises.is_empty());
    for (i, d) in routine.exercises.iter().enumerate() {
        assert_eq!(d.entry.order_index as usize, i);
    }

    assert!(matches!(
        service.copy_template_to_routine("no-such-template"),
        Err(Error::Validation(_))
    ));
    Ok(())
}

#[test]
fn test_start_workout_errors() -> Result<()> {
    let (mut service, _) = create_test_service()?;
    assert!(matches!(
        service.start_workout(777),
        Err(Error::RoutineNotFound(777))
    ));

    let squat = exercise_id(&service, "Barbell Squat")?;
    let routine = service.create_routine(&RoutineDraft::from_entries("Legs", [(squat, targets(3, 5, 90))]))?;

    // Losing the sessions table makes the session insert fail.
    service
        .conn
        .execute_batch("DROP TABLE session_sets; DROP TABLE workout_sessions;")?;
    assert!(matches!(
        service.start_workout(routine.routine.id),
        Err(Error::SessionCreate(_))
    ));
    Ok(())
}

#[test]
fn test_log_set_bounds_create_nothing() -> Result<()> {
    let (mut service, _) = create_test_service()?;
    let squat = exercise_id(&service, "Barbell Squat")?;
    let bench = exercise_id(&service, "Barbell Bench Press")?;
    let routine = service.create_routine(&RoutineDraft::from_entries("Legs", [(squat, targets(3, 5, 90))]))?;
    let mut workout = service.start_workout(routine.routine.id)?;

    for (reps, weight) in [(0, None), (-1, None), (1001, None), (5, Some(-1.0)), (5, Some(1000.5))] {
        assert!(matches!(
            service.log_set(&mut workout, squat, reps, weight),
            Err(Error::Validation(_))
        ));
    }
    // Not part of the routine.
    assert!(matches!(
        service.log_set(&mut workout, bench, 5, None),
        Err(Error::Validation(_))
    ));

    assert!(workout.sets().is_empty());
    assert!(workout.rest().is_none());
    assert_eq!(set_count(&service)?, 0);

    let ok = service.log_set(&mut workout, squat, 1000, Some(1000.0))?;
    assert_eq!(ok.set.reps, 1000);
    assert_eq!(set_count(&service)?, 1);
    Ok(())
}

#[test]
fn test_final_sets_never_start_rest() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    let a = exercise_id(&service, "Barbell Bench Press")?;
    let b = exercise_id(&service, "Dumbbell Flyes")?;
    let routine = service.create_routine(&RoutineDraft::from_entries(
        "Chest",
        [(a, targets(3, 10, 90)), (b, targets(2, 12, 60))],
    ))?;
    let mut workout = service.start_workout(routine.routine.id)?;
    assert_eq!(workout.current_index(), Some(0));

    let mut rests = Vec::new();
    for (exercise, reps) in [(a, 10), (a, 9), (a, 8), (b, 12), (b, 11)] {
        clock.advance(Duration::seconds(30));
        let outcome = service.log_set(&mut workout, exercise, reps, Some(40.0))?;
        rests.push(outcome.rest_started);
        if outcome.rest_started.is_some() {
            workout.skip_rest();
        }
    }
    assert_eq!(rests, vec![Some(90), Some(90), None, Some(60), None]);
    assert!(workout.is_all_complete());
    assert_eq!(workout.current_index(), None);
    assert_eq!(workout.progress().percent, 100);

    // Sets come back from the store in the order they were logged.
    let stored = db::list_session_sets(&service.conn, workout.workout_id())?;
    assert_eq!(stored.iter().map(|s| s.reps).collect::<Vec<_>>(), vec![10, 9, 8, 12, 11]);
    assert_eq!(stored, workout.sets());
    Ok(())
}

#[test]
fn test_zero_rest_never_rests() -> Result<()> {
    let (mut service, _) = create_test_service()?;
    let plank = exercise_id(&service, "Plank")?;
    let routine = service.create_routine(&RoutineDraft::from_entries("Core", [(plank, targets(3, 1, 0))]))?;
    let mut workout = service.start_workout(routine.routine.id)?;

    for _ in 0..3 {
        let outcome = service.log_set(&mut workout, plank, 1, None)?;
        assert_eq!(outcome.rest_started, None);
        assert!(workout.rest().is_none());
    }
    assert!(workout.is_all_complete());
    Ok(())
}

#[test]
fn test_push_day_end_to_end() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    let bench = exercise_id(&service, "Barbell Bench Press")?;
    let routine = service.create_routine(&RoutineDraft::from_entries(
        "Push Day",
        [(bench, ExerciseTargets { sets: 1, reps: 10, weight_kg: None, rest_seconds: 90 })],
    ))?;

    let mut workout = service.start_workout(routine.routine.id)?;
    assert_eq!(workout.state(), WorkoutState::Active);

    clock.advance(Duration::seconds(95));
    let outcome = service.log_set(&mut workout, bench, 10, None)?;
    assert!(outcome.exercise_complete);
    assert!(outcome.all_complete);
    assert_eq!(outcome.rest_started, None);
    assert!(workout.rest().is_none());

    clock.advance(Duration::seconds(30));
    let session = service.complete_workout(&mut workout)?;
    assert_eq!(workout.state(), WorkoutState::Completed);
    assert_eq!(session.ended_at, Some(base_time() + Duration::seconds(125)));
    assert_eq!(session.total_duration_seconds, Some(125));

    let stored = db::get_workout_session(&service.conn, session.id)?.expect("session row");
    assert_eq!(stored, session);

    let history = service.workout_history()?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].routine.name, "Push Day");
    assert_eq!(history[0].sets.len(), 1);
    assert_eq!(history[0].sets[0].exercise.id, bench);

    assert!(matches!(
        service.complete_workout(&mut workout),
        Err(Error::InvalidTransition { .. })
    ));
    assert!(matches!(
        service.log_set(&mut workout, bench, 10, None),
        Err(Error::InvalidTransition { .. })
    ));
    Ok(())
}

#[test]
fn test_set_log_failure_keeps_local_state() -> Result<()> {
    let (mut service, _) = create_test_service()?;
    let squat = exercise_id(&service, "Barbell Squat")?;
    let routine = service.create_routine(&RoutineDraft::from_entries("Legs", [(squat, targets(3, 5, 90))]))?;
    let mut workout = service.start_workout(routine.routine.id)?;

    // The session row disappears underneath the workout.
    service
        .conn
        .execute("DELETE FROM workout_sessions WHERE id = ?1", [workout.workout_id()])?;

    assert!(matches!(
        service.log_set(&mut workout, squat, 5, Some(100.0)),
        Err(Error::SetLog(_))
    ));
    assert!(workout.sets().is_empty());
    assert!(workout.rest().is_none());
    Ok(())
}

#[test]
fn test_abandoned_workouts_hidden_resumable_and_pruned() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    let squat = exercise_id(&service, "Barbell Squat")?;
    let routine = service.create_routine(&RoutineDraft::from_entries("Legs", [(squat, targets(3, 5, 90))]))?;

    let mut workout = service.start_workout(routine.routine.id)?;
    service.log_set(&mut workout, squat, 5, Some(100.0))?;
    service.abandon_workout(&mut workout)?;
    assert_eq!(workout.state(), WorkoutState::Abandoned);

    assert!(service.workout_history()?.is_empty());
    let abandoned = service.list_abandoned_workouts()?;
    assert_eq!(abandoned.len(), 1);
    assert_eq!(abandoned[0].set_count, 1);
    assert_eq!(abandoned[0].routine_name.as_deref(), Some("Legs"));

    // Picking it back up restores the logged set.
    let resumed = service.resume_workout(workout.workout_id())?;
    assert_eq!(resumed.state(), WorkoutState::Active);
    assert_eq!(resumed.sets().len(), 1);
    assert_eq!(resumed.exercise_progress()[0].completed_sets, 1);

    clock.advance(Duration::days(3));
    assert_eq!(service.prune_abandoned_workouts(Duration::days(7), None)?, 0);
    assert_eq!(service.apply_abandoned_retention()?, 0);

    service.config.abandoned_retention_days = Some(2);
    assert_eq!(service.apply_abandoned_retention()?, 1);
    assert!(service.list_abandoned_workouts()?.is_empty());
    assert_eq!(set_count(&service)?, 0);

    assert!(matches!(
        service.resume_workout(workout.workout_id()),
        Err(Error::WorkoutNotFound(_))
    ));
    Ok(())
}

#[test]
fn test_delete_routine_cascades_to_workouts() -> Result<()> {
    let (mut service, _) = create_test_service()?;
    let squat = exercise_id(&service, "Barbell Squat")?;
    let routine = service.create_routine(&RoutineDraft::from_entries("Legs", [(squat, targets(1, 5, 0))]))?;
    let mut workout = service.start_workout(routine.routine.id)?;
    service.log_set(&mut workout, squat, 5, None)?;
    service.complete_workout(&mut workout)?;
    assert_eq!(service.workout_history()?.len(), 1);

    service.delete_routine(routine.routine.id)?;
    assert!(service.workout_history()?.is_empty());
    assert_eq!(set_count(&service)?, 0);
    assert!(matches!(
        service.delete_routine(routine.routine.id),
        Err(Error::RoutineNotFound(_))
    ));
    Ok(())
}

#[test]
fn test_history_groups_and_stats() -> Result<()> {
    let (mut service, clock) = create_test_service()?;
    let squat = exercise_id(&service, "Barbell Squat")?;
    let routine = service.create_routine(&RoutineDraft::from_entries("Legs", [(squat, targets(1, 5, 0))]))?;

    for days_ago in [20, 7, 3, 1, 0] {
        let finished = base_time() - Duration::days(days_ago);
        clock.set(finished - Duration::minutes(30));
        let mut workout = service.start_workout(routine.routine.id)?;
        service.log_set(&mut workout, squat, 5, Some(100.0))?;
        clock.set(finished);
        service.complete_workout(&mut workout)?;
    }
    clock.set(base_time() + Duration::minutes(1));

    let history = service.workout_history()?;
    assert_eq!(history.len(), 5);
    assert!(history.windows(2).all(|w| w[0].ended_at >= w[1].ended_at));

    let groups: Vec<_> = service
        .group_history(&history)
        .into_iter()
        .map(|(g, items)| (g, items.len()))
        .collect();
    assert_eq!(
        groups,
        vec![
            (DateGroup::Today, 1),
            (DateGroup::Yesterday, 1),
            (DateGroup::ThisWeek, 1),
            (DateGroup::LastWeek, 1),
            (DateGroup::Earlier, 1),
        ]
    );

    let stats = service.history_stats()?;
    assert_eq!(stats.total_workouts, 5);
    assert_eq!(stats.active_days, 5);
    assert_eq!(stats.streak, 2);

    // Two weeks reach back to the Monday before last; the 20-day-old workout is outside.
    let map = service.heat_map(Some(2))?;
    assert_eq!(map.weeks.len(), 2);
    let marked: usize = map.weeks.iter().flatten().map(|d| d.workout_ids.len()).sum();
    assert_eq!(marked, 4);
    Ok(())
}
