// src/timer.rs
//! Once-a-second ticker tasks for the workout clock and the rest countdown.
//!
//! Tickers only emit events; [`SessionTimers::apply`] decides what a tick
//! means for the workout. Each ticker lives as long as its [`TickerHandle`].
//! Dropping the handle aborts the task, so every exit path (completion,
//! abandonment, an early return) stops the ticking.
//!
//! Aborting a ticker does not recall events it already queued. Rest events
//! carry the generation of the ticker that sent them, and events from an
//! older generation are dropped on arrival.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::session::{ActiveWorkout, RestTick};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Elapsed,
    Rest { generation: u64 },
}

/// What a tick changed, after stale events are filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickUpdate {
    Elapsed,
    Rest(RestTick),
}

/// Owns a running ticker task.
#[derive(Debug)]
pub struct TickerHandle {
    event: TimerEvent,
    task: JoinHandle<()>,
}

impl TickerHandle {
    /// Spawns a task that sends `event` every `period`, first after one period.
    /// Must be called from within a tokio runtime.
    pub fn spawn(event: TimerEvent, period: Duration, tx: mpsc::UnboundedSender<TimerEvent>) -> Self {
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            // A late tick is still one second of rest; never fire a burst.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tx.send(event).is_err() {
                    // Receiver gone: nobody is listening any more.
                    break;
                }
            }
        });
        debug!(?event, "Ticker started");
        Self { event, task }
    }

    pub fn event(&self) -> TimerEvent {
        self.event
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.task.abort();
        debug!(event = ?self.event, "Ticker stopped");
    }
}

/// The two tickers of one workout, feeding a single event channel.
#[derive(Debug)]
pub struct SessionTimers {
    tx: mpsc::UnboundedSender<TimerEvent>,
    period: Duration,
    elapsed: Option<TickerHandle>,
    rest: Option<TickerHandle>,
    rest_generation: u64,
}

impl SessionTimers {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        Self::with_period(TICK_PERIOD)
    }

    pub fn with_period(period: Duration) -> (Self, mpsc::UnboundedReceiver<TimerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                period,
                elapsed: None,
                rest: None,
                rest_generation: 0,
            },
            rx,
        )
    }

    pub fn start_elapsed(&mut self) {
        if self.elapsed.is_none() {
            self.elapsed = Some(TickerHandle::spawn(
                TimerEvent::Elapsed,
                self.period,
                self.tx.clone(),
            ));
        }
    }

    /// (Re)starts the rest ticker. A new rest always restarts the phase of
    /// the one-second grid and invalidates ticks queued by the previous one.
    pub fn start_rest(&mut self) {
        self.rest_generation = self.rest_generation.wrapping_add(1);
        self.rest = Some(TickerHandle::spawn(
            TimerEvent::Rest {
                generation: self.rest_generation,
            },
            self.period,
            self.tx.clone(),
        ));
    }

    pub fn stop_rest(&mut self) {
        self.rest = None;
    }

    pub fn is_resting(&self) -> bool {
        self.rest.is_some()
    }

    pub fn stop_all(&mut self) {
        self.rest = None;
        self.elapsed = None;
    }

    /// Feeds one received event into `workout`.
    ///
    /// Returns `None` for events from a ticker that has since been stopped or
    /// replaced. The rest ticker is stopped once the countdown is over.
    pub fn apply(&mut self, event: TimerEvent, workout: &mut ActiveWorkout) -> Option<TickUpdate> {
        match event {
            TimerEvent::Elapsed => self.elapsed.is_some().then_some(TickUpdate::Elapsed),
            TimerEvent::Rest { generation } => {
                if self.rest.is_none() || generation != self.rest_generation {
                    debug!(generation, current = self.rest_generation, "Dropping stale rest tick");
                    return None;
                }
                match workout.tick_rest() {
                    Some(tick @ RestTick::Finished { .. }) => {
                        self.stop_rest();
                        Some(TickUpdate::Rest(tick))
                    }
                    Some(tick) => Some(TickUpdate::Rest(tick)),
                    None => {
                        self.stop_rest();
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        Exercise, ExerciseTargets, Routine, RoutineExercise, RoutineExerciseDetail,
        RoutineWithExercises, SessionSet, WorkoutSession,
    };
    use chrono::{TimeZone, Utc};

    fn drain(rx: &mut mpsc::UnboundedReceiver<TimerEvent>) -> Vec<TimerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn apply_all(
        timers: &mut SessionTimers,
        rx: &mut mpsc::UnboundedReceiver<TimerEvent>,
        workout: &mut ActiveWorkout,
    ) -> Vec<TickUpdate> {
        drain(rx)
            .into_iter()
            .filter_map(|event| timers.apply(event, workout))
            .collect()
    }

    fn rest_updates(updates: &[TickUpdate]) -> Vec<RestTick> {
        updates
            .iter()
            .filter_map(|u| match u {
                TickUpdate::Rest(tick) => Some(*tick),
                TickUpdate::Elapsed => None,
            })
            .collect()
    }

    fn bench_workout(sets: u32, rest_seconds: u32) -> ActiveWorkout {
        let started_at = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        let routine = RoutineWithExercises {
            routine: Routine {
                id: 1,
                name: "Push Day".into(),
                session_id: "anon".into(),
                created_at: started_at,
            },
            exercises: vec![RoutineExerciseDetail {
                entry: RoutineExercise {
                    id: 100,
                    routine_id: 1,
                    exercise_id: 7,
                    order_index: 0,
                    targets: ExerciseTargets {
                        sets,
                        reps: 8,
                        weight_kg: Some(60.0),
                        rest_seconds,
                    },
                },
                exercise: Exercise {
                    id: 7,
                    name: "Barbell Bench Press".into(),
                    muscle_group: "chest".into(),
                    equipment: "barbell".into(),
                },
            }],
        };
        let session = WorkoutSession {
            id: 3,
            routine_id: 1,
            session_id: "anon".into(),
            started_at,
            ended_at: None,
            total_duration_seconds: None,
        };
        ActiveWorkout::new(routine, session)
    }

    fn log(workout: &mut ActiveWorkout, timers: &mut SessionTimers, id: i64) {
        let outcome = workout.record_set(SessionSet {
            id,
            workout_id: 3,
            exercise_id: 7,
            reps: 8,
            weight_kg: Some(60.0),
            completed_at: Utc.with_ymd_and_hms(2024, 5, 1, 18, 5, 0).unwrap(),
        });
        if outcome.rest_started.is_some() {
            timers.start_rest();
        } else {
            timers.stop_rest();
        }
    }

    fn remaining(workout: &ActiveWorkout) -> Option<u32> {
        workout.rest().map(|r| r.remaining_seconds)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = TickerHandle::spawn(TimerEvent::Elapsed, TICK_PERIOD, tx);

        tokio::time::sleep(Duration::from_millis(3_100)).await;
        let ticks = drain(&mut rx);
        assert_eq!(ticks, vec![TimerEvent::Elapsed; 3]);
        assert_eq!(handle.event(), TimerEvent::Elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_stops_ticks() {
        let (mut timers, mut rx) = SessionTimers::new();
        timers.start_elapsed();
        timers.start_rest();
        assert!(timers.is_resting());

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let first = drain(&mut rx);
        assert!(first.contains(&TimerEvent::Elapsed));
        assert!(first.contains(&TimerEvent::Rest { generation: 1 }));

        timers.stop_rest();
        tokio::time::sleep(Duration::from_secs(2)).await;
        let second = drain(&mut rx);
        assert_eq!(second, vec![TimerEvent::Elapsed; 2]);

        timers.stop_all();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn rest_finishes_after_exactly_its_length_in_ticks() {
        let mut workout = bench_workout(3, 3);
        let (mut timers, mut rx) = SessionTimers::new();
        log(&mut workout, &mut timers, 1);
        assert_eq!(remaining(&workout), Some(3));

        // Sample half-way between ticks.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        let ticks = rest_updates(&apply_all(&mut timers, &mut rx, &mut workout));
        assert_eq!(
            ticks,
            vec![RestTick::Running {
                exercise_id: 7,
                remaining_seconds: 2
            }]
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        apply_all(&mut timers, &mut rx, &mut workout);
        assert_eq!(remaining(&workout), Some(1));
        assert!(timers.is_resting());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let ticks = rest_updates(&apply_all(&mut timers, &mut rx, &mut workout));
        assert_eq!(ticks, vec![RestTick::Finished { exercise_id: 7 }]);
        assert_eq!(remaining(&workout), None);
        assert!(!timers.is_resting());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(apply_all(&mut timers, &mut rx, &mut workout).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_rest_ignores_ticks_queued_by_the_old_ticker() {
        let mut workout = bench_workout(3, 60);
        let (mut timers, mut rx) = SessionTimers::new();
        log(&mut workout, &mut timers, 1);

        // One tick from the first rest is left in the channel.
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        log(&mut workout, &mut timers, 2);
        assert!(apply_all(&mut timers, &mut rx, &mut workout).is_empty());
        assert_eq!(remaining(&workout), Some(60));

        // The new ticker's first tick lands one period after the restart.
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        let ticks = rest_updates(&apply_all(&mut timers, &mut rx, &mut workout));
        assert_eq!(
            ticks,
            vec![RestTick::Running {
                exercise_id: 7,
                remaining_seconds: 59
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_rest_does_not_finish_again() {
        let mut workout = bench_workout(3, 30);
        let (mut timers, mut rx) = SessionTimers::new();
        log(&mut workout, &mut timers, 1);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(workout.skip_rest().is_some());
        timers.stop_rest();

        assert!(apply_all(&mut timers, &mut rx, &mut workout).is_empty());
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(apply_all(&mut timers, &mut rx, &mut workout).is_empty());
        assert!(!timers.is_resting());
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_ticks_refresh_until_stopped() {
        let mut workout = bench_workout(1, 0);
        let (mut timers, mut rx) = SessionTimers::new();
        timers.start_elapsed();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(
            apply_all(&mut timers, &mut rx, &mut workout),
            vec![TickUpdate::Elapsed; 2]
        );

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        timers.stop_all();
        assert!(apply_all(&mut timers, &mut rx, &mut workout).is_empty());
    }
}
