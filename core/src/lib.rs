//! # Composable Effects Core
//!
//! Effect values, cancellation, and scheduling for the Composable Effects
//! architecture.
//!
//! Reducers describe side effects as [`Effect`] values instead of performing
//! them. This crate defines what an effect is and how it runs:
//!
//! ## Core Concepts
//!
//! - **Effect**: inert description of work that emits values, then completes
//!   or fails. Nothing runs until it is subscribed.
//! - **Subscription**: the live, disposable instance of a subscribed effect
//! - **CancellationId**: value-compared tag grouping subscriptions for joint
//!   cancellation through the process-wide [`CancellationRegistry`]
//! - **Scheduler**: source of time. Production code uses a wall-clock
//!   scheduler, tests a manually advanced virtual clock.
//! - **Reducer**: pure function `(State, Action, Environment) → Effects`
//!
//! ## Example
//!
//! ```ignore
//! use composable_effects_core::{Effect, Never, Tick};
//! use std::time::Duration;
//!
//! #[derive(Debug, Hash, PartialEq, Eq)]
//! struct TimerId;
//!
//! let scheduler = TestScheduler::new();
//! let ticks = Effect::<Tick, Never>::merge([
//!     Effect::timer(TimerId, Duration::from_secs(2), &scheduler),
//!     Effect::timer(TimerId, Duration::from_secs(3), &scheduler),
//!     Effect::cancel(TimerId).deferred(Duration::from_secs(31), &scheduler),
//! ]);
//!
//! ticks.subscribe(|event| println!("{event:?}"));
//! scheduler.run(); // 15 ticks from the first timer, 10 from the second
//! ```

pub use smallvec::{smallvec, SmallVec};

/// Cancellation ids and the registry grouping running effects by id
pub mod cancellation;

/// Operators combining and transforming effects
pub mod combinators;

/// The `Effect` type, its subscribers, and events
pub mod effect;

/// Error types
pub mod error;

/// Scheduler trait and the ordered timer queue
pub mod scheduler;

/// Disposable subscriptions
pub mod subscription;

/// Periodic timer effects
pub mod timer;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They mutate state in place and return effect descriptions for a store to run.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for CountdownReducer {
    ///     type State = CountdownState;
    ///     type Action = CountdownAction;
    ///     type Environment = CountdownEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut CountdownState,
    ///         action: CountdownAction,
    ///         env: &CountdownEnvironment,
    ///     ) -> SmallVec<[Effect<CountdownAction>; 4]> {
    ///         match action {
    ///             CountdownAction::Start => smallvec![
    ///                 Effect::timer(TimerId, Duration::from_secs(1), &env.scheduler)
    ///                     .map(|_| CountdownAction::Tick)
    ///             ],
    ///             CountdownAction::Tick => {
    ///                 state.remaining -= 1;
    ///                 smallvec![]
    ///             }
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effects whose emitted actions are fed back into the reducer
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

pub use cancellation::{CancellationId, CancellationRegistry};
pub use effect::{Effect, EffectStream, Event, Never, Subscriber};
pub use error::SchedulerError;
pub use reducer::Reducer;
pub use scheduler::{Scheduler, SchedulerConfig, TimerQueue};
pub use subscription::{DisposeBag, Subscription};
pub use timer::Tick;
