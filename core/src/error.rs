//! Error types for scheduler operations.
//!
//! Producer failures are not represented here: they are caller-defined values
//! carried by [`Event::Failed`](crate::effect::Event::Failed). Cancelling an id
//! with nothing registered is defined behavior and not an error either.

use thiserror::Error;

/// Errors raised by schedulers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// A bounded run stopped with work still scheduled.
    ///
    /// This is the recoverable form of running an unbounded virtual clock
    /// while repeating work (an uncancelled timer, for instance) is active.
    #[error("Run stopped after {limit} callbacks with {pending} entries still scheduled")]
    RunLimitExceeded {
        /// Maximum number of callbacks the run was allowed to fire
        limit: usize,
        /// Entries still scheduled when the run stopped
        pending: usize,
    },

    /// A production scheduler was created outside of an async runtime.
    #[error("No async runtime available: {0}")]
    NoRuntime(String),
}
