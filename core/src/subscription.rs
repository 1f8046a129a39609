//! Disposable handles for running effects and scheduled work.
//!
//! A [`Subscription`] is the live side of an [`Effect`](crate::effect::Effect):
//! it exists from the moment the effect is subscribed until its first terminal
//! event or until someone disposes it. Scheduler tokens are subscriptions too,
//! so every piece of cancellable work in the crate is torn down the same way.
//!
//! # Example
//!
//! ```
//! use composable_effects_core::subscription::Subscription;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let torn_down = Arc::new(AtomicUsize::new(0));
//! let counter = Arc::clone(&torn_down);
//!
//! let subscription = Subscription::with_teardown(move || {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! });
//!
//! subscription.dispose();
//! subscription.dispose(); // idempotent
//! assert_eq!(torn_down.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Boxed teardown closure run when a subscription is disposed.
type Teardown = Box<dyn FnOnce() + Send>;

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Subscription`].
///
/// Clones of the same subscription share a key; the registry uses it to
/// tell apart subscriptions grouped under one cancellation id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionKey(u64);

impl SubscriptionKey {
    fn next() -> Self {
        Self(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value of the key.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Inner {
    key: SubscriptionKey,
    /// `None` once disposed.
    teardowns: Mutex<Option<Vec<Teardown>>>,
}

/// A cheaply cloneable, thread-safe disposable.
///
/// Disposing runs every registered teardown exactly once, in registration
/// order. Dropping a `Subscription` does **not** dispose it; use a
/// [`DisposeBag`] when the work should end with an owner's lifetime.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

impl Subscription {
    /// Create a live subscription with no teardown logic attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                key: SubscriptionKey::next(),
                teardowns: Mutex::new(Some(Vec::new())),
            }),
        }
    }

    /// Create a live subscription that runs `teardown` when disposed.
    #[must_use]
    pub fn with_teardown<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let subscription = Self::new();
        subscription.add_teardown(teardown);
        subscription
    }

    /// Create a subscription that is already disposed.
    #[must_use]
    pub fn disposed() -> Self {
        Self {
            inner: Arc::new(Inner {
                key: SubscriptionKey::next(),
                teardowns: Mutex::new(None),
            }),
        }
    }

    /// Identity shared by all clones of this subscription.
    #[must_use]
    pub fn key(&self) -> SubscriptionKey {
        self.inner.key
    }

    /// Whether [`dispose`](Self::dispose) has already run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner
            .teardowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Attach teardown logic.
    ///
    /// If the subscription is already disposed the teardown runs immediately
    /// on the calling thread, so late registrations are never lost.
    pub fn add_teardown<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut guard = self
            .inner
            .teardowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match guard.as_mut() {
            Some(teardowns) => teardowns.push(Box::new(teardown)),
            None => {
                drop(guard);
                teardown();
            },
        }
    }

    /// Dispose `child` together with this subscription.
    pub fn attach(&self, child: Subscription) {
        self.add_teardown(move || child.dispose());
    }

    /// Dispose the subscription, running all teardowns.
    ///
    /// Idempotent: only the first call has any effect. Teardowns run outside
    /// the internal lock, so they may freely touch other subscriptions,
    /// including this one.
    pub fn dispose(&self) {
        let teardowns = self
            .inner
            .teardowns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(teardowns) = teardowns {
            tracing::trace!(subscription = %self.inner.key, count = teardowns.len(), "Disposing subscription");
            for teardown in teardowns {
                teardown();
            }
        }
    }

    /// Hand the subscription to `bag`, which disposes it when dropped.
    pub fn disposed_by(self, bag: &mut DisposeBag) {
        bag.insert(self);
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.inner.key == other.inner.key
    }
}

impl Eq for Subscription {}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.inner.key)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Owns a set of subscriptions and disposes all of them on drop.
///
/// # Example
///
/// ```
/// use composable_effects_core::subscription::{DisposeBag, Subscription};
///
/// let subscription = Subscription::new();
/// {
///     let mut bag = DisposeBag::new();
///     subscription.clone().disposed_by(&mut bag);
///     assert!(!subscription.is_disposed());
/// }
/// assert!(subscription.is_disposed());
/// ```
#[derive(Debug, Default)]
pub struct DisposeBag {
    subscriptions: Vec<Subscription>,
}

impl DisposeBag {
    /// Create an empty bag.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Take ownership of a subscription.
    pub fn insert(&mut self, subscription: Subscription) {
        self.subscriptions.retain(|s| !s.is_disposed());
        self.subscriptions.push(subscription);
    }

    /// Number of subscriptions held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the bag holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Dispose everything now and empty the bag.
    pub fn dispose_all(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.dispose();
        }
    }
}

impl Drop for DisposeBag {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
