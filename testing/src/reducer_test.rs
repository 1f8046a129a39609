//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use composable_effects_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use composable_effects_testing::{ReducerTest, TestScheduler, assertions};
///
/// let scheduler = TestScheduler::new();
///
/// ReducerTest::new(CountdownReducer)
///     .with_env(CountdownEnvironment::new(scheduler.clone()))
///     .given_state(CountdownState::new(3))
///     .when_action(CountdownAction::Start)
///     .then_state(|state| {
///         assert!(state.running);
///     })
///     .then_effects(move |effects| {
///         let actions = assertions::collect_actions(effects, &scheduler, Duration::from_secs(3));
///         assert_eq!(actions.len(), 3);
///     })
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to test (When)
    ///
    /// Actions are reduced in the order they were added. Effect assertions
    /// see the effects returned by every action, concatenated.
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the resulting effects (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        // Execute reducer
        let mut effects = Vec::new();
        for action in self.actions {
            effects.extend(self.reducer.reduce(&mut state, action, &env));
        }

        // Run state assertions
        for assertion in self.state_assertions {
            assertion(&state);
        }

        // Run effect assertions
        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
pub mod assertions {
    use crate::scheduler::TestScheduler;
    use composable_effects_core::effect::Effect;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A>(effects: &[Effect<A>]) {
        assert!(
            effects.is_empty(),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that at least one effect registers a cancellation id, directly
    /// or through an effect it wraps
    ///
    /// # Panics
    ///
    /// Panics if no effect registers a cancellation id.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_cancellable_effect<A>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().any(Effect::is_cancellable),
            "Expected at least one cancellable effect, but none found"
        );
    }

    /// Run `effects` on `scheduler` for `duration` and return the actions
    /// they emitted, in emission order.
    ///
    /// Subscriptions still live afterwards are disposed.
    pub fn collect_actions<A>(
        effects: &[Effect<A>],
        scheduler: &TestScheduler,
        duration: Duration,
    ) -> Vec<A>
    where
        A: Send + 'static,
    {
        let actions = Arc::new(Mutex::new(Vec::new()));
        let merged = Effect::merge(effects.iter().cloned());
        let sink = Arc::clone(&actions);
        let subscription = merged.subscribe_next(move |action| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(action);
        });

        scheduler.advance(duration);
        subscription.dispose();

        let mut guard = actions.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TestScheduler;
    use composable_effects_core::effect::Effect;
    use composable_effects_core::reducer::Reducer;
    use composable_effects_core::{SmallVec, smallvec};
    use std::time::Duration;

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Increment,
        Decrement,
        Schedule,
    }

    #[derive(Debug, Hash, PartialEq, Eq)]
    struct ScheduleId;

    struct TestReducer;

    struct TestEnv {
        scheduler: TestScheduler,
    }

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    smallvec![]
                },
                TestAction::Decrement => {
                    state.count -= 1;
                    smallvec![]
                },
                TestAction::Schedule => smallvec![
                    Effect::just(TestAction::Increment)
                        .deferred(Duration::from_secs(1), &env.scheduler)
                        .cancellable(ScheduleId)
                ],
            }
        }
    }

    fn env() -> TestEnv {
        TestEnv {
            scheduler: TestScheduler::new(),
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_multiple_actions() {
        ReducerTest::new(TestReducer)
            .with_env(env())
            .given_state(TestState { count: 5 })
            .when_action(TestAction::Decrement)
            .when_action(TestAction::Decrement)
            .then_state(|state| {
                assert_eq!(state.count, 3);
            })
            .run();
    }

    #[test]
    fn test_collect_actions_runs_scheduled_effects() {
        let scheduler = TestScheduler::new();

        ReducerTest::new(TestReducer)
            .with_env(TestEnv {
                scheduler: scheduler.clone(),
            })
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Schedule)
            .then_effects(move |effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_cancellable_effect(effects);

                let early = assertions::collect_actions(effects, &scheduler, Duration::from_millis(500));
                assert!(early.is_empty());

                let actions = assertions::collect_actions(effects, &scheduler, Duration::from_secs(1));
                assert_eq!(actions, vec![TestAction::Increment]);
            })
            .run();
    }

    #[test]
    fn test_assertions_effects_count() {
        assertions::assert_effects_count(&[Effect::<TestAction>::none()], 1);
        assertions::assert_effects_count::<TestAction>(&[], 0);
    }
}
