//! # Composable Effects Runtime
//!
//! Runtime pieces for the Composable Effects architecture.
//!
//! ## Core Components
//!
//! - **TokioScheduler**: wall-clock [`Scheduler`](composable_effects_core::Scheduler)
//!   running callbacks on a dedicated tokio task
//! - **Store**: reference state container that runs a reducer and the
//!   effects it returns, with scoped child stores
//! - **if_let**: presence bridge turning optional state into
//!   present/absent transitions
//! - **retry**: exponential backoff for failing effects
//! - **metrics**: Prometheus exporter for the workspace's counters
//!
//! ## Example
//!
//! ```ignore
//! use composable_effects_runtime::{Store, TokioScheduler};
//!
//! let scheduler = TokioScheduler::new()?;
//! let store = Store::new(
//!     CountdownState::new(10),
//!     CountdownReducer,
//!     CountdownEnvironment::new(scheduler),
//! );
//!
//! let _changes = store.subscribe(|state| println!("{state:?}"));
//! store.send(CountdownAction::Start);
//! ```

/// Presence bridge for optional state
pub mod if_let;

/// Prometheus metrics for observability
pub mod metrics;

/// Retry logic with exponential backoff
pub mod retry;

/// Production scheduler
pub mod scheduler;

/// Reference store
pub mod store;

pub use if_let::{if_let, if_let_present};
pub use retry::{RetryPolicy, retry};
pub use scheduler::TokioScheduler;
pub use store::Store;
