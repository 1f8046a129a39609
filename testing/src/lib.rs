//! # Composable Effects Testing
//!
//! Testing utilities and helpers for the Composable Effects architecture.
//!
//! This crate provides:
//! - [`TestScheduler`]: a virtual clock that runs timers only when advanced
//! - [`EventRecorder`]: captures what an effect delivers
//! - [`ReducerTest`]: Given-When-Then assertions for reducers
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```
//! use composable_effects_core::{Effect, Tick};
//! use composable_effects_testing::{EventRecorder, TestScheduler};
//! use std::time::Duration;
//!
//! #[derive(Debug, Hash, PartialEq, Eq)]
//! struct TimerId;
//!
//! let scheduler = TestScheduler::new();
//! let recorder = EventRecorder::<Tick, String>::new();
//! let subscription = recorder.record(&Effect::timer(TimerId, Duration::from_secs(1), &scheduler));
//!
//! scheduler.advance(Duration::from_secs(3));
//! assert_eq!(recorder.values(), vec![1, 2, 3]);
//!
//! subscription.dispose();
//! assert_eq!(scheduler.pending(), 0);
//! ```

/// Virtual-time scheduler
pub mod scheduler;

/// Event capture
pub mod recorder;

/// Reducer testing utilities
pub mod reducer_test;

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use std::time::Duration;

    /// Timer periods between 1 and `max_secs` whole seconds.
    pub fn period_secs(max_secs: u64) -> impl Strategy<Value = Duration> {
        (1..=max_secs).prop_map(Duration::from_secs)
    }

    /// Elapsed virtual times between 0 and `max_secs` whole seconds.
    pub fn elapsed_secs(max_secs: u64) -> impl Strategy<Value = Duration> {
        (0..=max_secs).prop_map(Duration::from_secs)
    }

    /// Non-empty sets of timer periods, up to `max_len` of them.
    pub fn periods(max_secs: u64, max_len: usize) -> impl Strategy<Value = Vec<Duration>> {
        prop::collection::vec(period_secs(max_secs), 1..=max_len)
    }
}

/// Install a tracing subscriber that writes through the test harness.
///
/// Honours `RUST_LOG`; defaults to `warn`. Safe to call from every test.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use recorder::EventRecorder;
pub use reducer_test::{ReducerTest, assertions};
pub use scheduler::TestScheduler;
