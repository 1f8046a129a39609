//! Retry with exponential backoff for effects that fail transiently.
//!
//! The core never retries on its own: a failed producer terminates its
//! subscription. [`retry`] wraps an effect so that a failure resubscribes it
//! after a backoff delay measured on a [`Scheduler`], which keeps retries
//! deterministic under a virtual clock.
//!
//! # Example
//!
//! ```rust
//! use composable_effects_core::effect::Effect;
//! use composable_effects_runtime::retry::{RetryPolicy, retry};
//! use composable_effects_testing::TestScheduler;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .build();
//!
//! let scheduler = TestScheduler::new();
//! let fetch: Effect<u32, String> = Effect::just(42);
//! let _subscription = retry(fetch, policy, &scheduler).subscribe_next(|value| assert_eq!(value, 42));
//! ```

use crate::metrics::RetryMetrics;
use composable_effects_core::effect::{Effect, Event, Subscriber};
use composable_effects_core::scheduler::Scheduler;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 100ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: off
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Scale each delay by a random factor in `0.5..=1.0`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            jitter: false,
        }
    }

    /// Calculate delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: `initial_delay * multiplier^attempt`, capped
    /// at `max_delay`, then scaled by the jitter factor if enabled.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped_secs = base_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            use rand::Rng;
            capped_secs * rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            capped_secs
        };

        Duration::try_from_secs_f64(final_secs).unwrap_or(self.max_delay)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: bool,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Randomize delays to spread out retries from many subscribers.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(3),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(100)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter,
        }
    }
}

struct Attempts<T, E, S> {
    effect: Effect<T, E>,
    policy: RetryPolicy,
    scheduler: S,
}

/// Resubscribe `effect` after each failure, waiting
/// [`RetryPolicy::delay_for_attempt`] on `scheduler` in between.
///
/// Values from every attempt are forwarded. Once `max_retries` retries have
/// failed, the last failure is propagated. Disposing the returned effect's
/// subscription cancels both the running attempt and a pending retry.
///
/// # Arguments
///
/// * `effect` - Effect to retry
/// * `policy` - Retry policy configuration
/// * `scheduler` - Where backoff delays are measured
pub fn retry<T, E, S>(effect: Effect<T, E>, policy: RetryPolicy, scheduler: &S) -> Effect<T, E>
where
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
    S: Scheduler + Clone + 'static,
{
    let attempts = Arc::new(Attempts {
        effect,
        policy,
        scheduler: scheduler.clone(),
    });
    Effect::new(move |subscriber| subscribe_attempt(&attempts, subscriber, 0))
}

fn subscribe_attempt<T, E, S>(attempts: &Arc<Attempts<T, E, S>>, subscriber: Subscriber<T, E>, attempt: usize)
where
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
    S: Scheduler + Clone + 'static,
{
    if subscriber.is_closed() {
        return;
    }

    let shared = Arc::clone(attempts);
    let downstream = subscriber.clone();
    let child = attempts.effect.subscribe(move |event| match event {
        Event::Next(value) => downstream.emit(value),
        Event::Completed => {
            if attempt > 0 {
                tracing::info!(attempt, "Effect succeeded after retry");
            }
            downstream.complete();
        },
        Event::Failed(error) => {
            if attempt >= shared.policy.max_retries {
                tracing::error!(attempt, error = %error, "Effect failed after max retries");
                RetryMetrics::record_exhausted();
                downstream.fail(error);
                return;
            }

            let delay = shared.policy.delay_for_attempt(attempt);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "Effect failed, retrying..."
            );
            RetryMetrics::record_attempt();

            let next = Arc::clone(&shared);
            let resubscribed = downstream.clone();
            let task = shared.scheduler.schedule_once(
                delay,
                Box::new(move || subscribe_attempt(&next, resubscribed, attempt + 1)),
            );
            downstream.subscription().attach(task);
        },
    });
    subscriber.subscription().attach(child);
}
