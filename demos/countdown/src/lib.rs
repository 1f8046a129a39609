//! # Countdown Example
//!
//! A countdown demonstrating timer effects in the Composable Effects
//! architecture.
//!
//! This example showcases:
//! - A reducer returning a long-running timer effect
//! - Bounding an endless timer with `take`
//! - Stopping a running timer by cancelling its id
//! - Running the same reducer against a virtual or a wall-clock scheduler
//!
//! ## Example
//!
//! ```no_run
//! use countdown::{CountdownAction, CountdownEnvironment, CountdownReducer, CountdownState};
//! use composable_effects_runtime::{Store, TokioScheduler};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let env = CountdownEnvironment::new(TokioScheduler::new()?);
//! let store = Store::new(CountdownState::new(3), CountdownReducer::new(), env);
//!
//! store.send(CountdownAction::Start);
//! # Ok(())
//! # }
//! ```

use composable_effects_core::{Effect, Reducer, Scheduler, SmallVec, smallvec};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Cancellation id of one environment's countdown timer.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct CountdownTimer(u64);

impl CountdownTimer {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Countdown state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountdownState {
    /// Seconds left
    pub remaining: u64,
    /// Whether the timer is running
    pub running: bool,
    /// Whether the countdown reached zero
    pub finished: bool,
}

impl CountdownState {
    /// A stopped countdown starting at `seconds`.
    #[must_use]
    pub const fn new(seconds: u64) -> Self {
        Self {
            remaining: seconds,
            running: false,
            finished: false,
        }
    }
}

/// Countdown actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownAction {
    /// Start (or resume) counting down
    Start,
    /// One second elapsed
    Tick,
    /// Pause without losing the remaining time
    Stop,
    /// Stop and start over from the given number of seconds
    Reset(u64),
}

/// Countdown environment
///
/// Each environment owns its own timer id, so several countdowns can run
/// side by side without cancelling each other.
#[derive(Debug, Clone)]
pub struct CountdownEnvironment<S> {
    /// Scheduler the timer runs on
    pub scheduler: S,
    /// Timer tick interval
    pub interval: Duration,
    timer: CountdownTimer,
}

impl<S> CountdownEnvironment<S> {
    /// Create an environment ticking once per second.
    #[must_use]
    pub fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            interval: Duration::from_secs(1),
            timer: CountdownTimer::next(),
        }
    }

    /// Set the tick interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The id the running timer is registered under.
    #[must_use]
    pub const fn timer(&self) -> CountdownTimer {
        self.timer
    }
}

/// Countdown reducer
///
/// Generic over the scheduler so tests drive it with a virtual clock.
#[derive(Debug, Clone, Copy)]
pub struct CountdownReducer<S> {
    _phantom: std::marker::PhantomData<S>,
}

impl<S> CountdownReducer<S> {
    /// Create a new countdown reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<S> Default for CountdownReducer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Reducer for CountdownReducer<S>
where
    S: Scheduler + Clone + 'static,
{
    type State = CountdownState;
    type Action = CountdownAction;
    type Environment = CountdownEnvironment<S>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            CountdownAction::Start => {
                if state.running || state.remaining == 0 {
                    return smallvec![];
                }
                state.running = true;
                state.finished = false;

                let ticks = usize::try_from(state.remaining).unwrap_or(usize::MAX);
                smallvec![
                    Effect::timer(env.timer, env.interval, &env.scheduler)
                        .take(ticks)
                        .map(|_| CountdownAction::Tick)
                ]
            },
            CountdownAction::Tick => {
                if !state.running {
                    return smallvec![];
                }
                state.remaining = state.remaining.saturating_sub(1);
                if state.remaining == 0 {
                    tracing::info!("Countdown finished");
                    state.running = false;
                    state.finished = true;
                }
                smallvec![]
            },
            CountdownAction::Stop => {
                state.running = false;
                smallvec![Effect::cancel(env.timer)]
            },
            CountdownAction::Reset(seconds) => {
                *state = CountdownState::new(seconds);
                smallvec![Effect::cancel(env.timer)]
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composable_effects_testing::{ReducerTest, TestScheduler, assertions};

    fn env(scheduler: &TestScheduler) -> CountdownEnvironment<TestScheduler> {
        CountdownEnvironment::new(scheduler.clone())
    }

    #[test]
    fn test_start_returns_bounded_timer() {
        let scheduler = TestScheduler::new();

        ReducerTest::new(CountdownReducer::new())
            .with_env(env(&scheduler))
            .given_state(CountdownState::new(3))
            .when_action(CountdownAction::Start)
            .then_state(|state| {
                assert!(state.running);
                assert_eq!(state.remaining, 3);
            })
            .then_effects(move |effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_cancellable_effect(effects);
                let actions = assertions::collect_actions(effects, &scheduler, Duration::from_secs(10));
                assert_eq!(actions, vec![CountdownAction::Tick; 3]);
            })
            .run();
    }

    #[test]
    fn test_start_when_running_is_ignored() {
        let scheduler = TestScheduler::new();
        let running = CountdownState {
            remaining: 3,
            running: true,
            finished: false,
        };

        ReducerTest::new(CountdownReducer::new())
            .with_env(env(&scheduler))
            .given_state(running)
            .when_action(CountdownAction::Start)
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn test_last_tick_finishes() {
        let scheduler = TestScheduler::new();
        let running = CountdownState {
            remaining: 1,
            running: true,
            finished: false,
        };

        ReducerTest::new(CountdownReducer::new())
            .with_env(env(&scheduler))
            .given_state(running)
            .when_action(CountdownAction::Tick)
            .then_state(|state| {
                assert_eq!(state.remaining, 0);
                assert!(!state.running);
                assert!(state.finished);
            })
            .run();
    }

    #[test]
    fn test_reset_cancels_and_restores() {
        let scheduler = TestScheduler::new();

        ReducerTest::new(CountdownReducer::new())
            .with_env(env(&scheduler))
            .given_state(CountdownState::new(5))
            .when_action(CountdownAction::Start)
            .when_action(CountdownAction::Tick)
            .when_action(CountdownAction::Reset(10))
            .then_state(|state| {
                assert_eq!(*state, CountdownState::new(10));
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 2))
            .run();
    }
}
