//! Cancellation identifiers and the process-wide cancellation registry.
//!
//! Effects tagged with a [`CancellationId`] register their live
//! [`Subscription`] in a [`CancellationRegistry`] for as long as they run.
//! Cancelling an id disposes every subscription currently grouped under an
//! equal id, no matter where the ids were constructed.
//!
//! Ids are compared **by value**. Any `Hash + Eq + Debug` type can serve as an
//! id, and ids of unrelated types share one registry without colliding:
//!
//! ```
//! use composable_effects_core::cancellation::CancellationId;
//!
//! #[derive(Debug, Hash, PartialEq, Eq)]
//! struct TimerId;
//!
//! assert_eq!(CancellationId::new(TimerId), CancellationId::new(TimerId));
//! assert_eq!(CancellationId::new(1_u32), CancellationId::new(1_u32));
//! // Same numeric value, different type: different group.
//! assert_ne!(CancellationId::new(1_u32), CancellationId::new(1_u64));
//! ```

use crate::subscription::{Subscription, SubscriptionKey};
use std::any::{Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

/// Object-safe view of a hashable, comparable key.
trait Key: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn key_eq(&self, other: &dyn Key) -> bool;
}

impl<K> Key for K
where
    K: Any + Eq + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn key_eq(&self, other: &dyn Key) -> bool {
        other
            .as_any()
            .downcast_ref::<K>()
            .is_some_and(|other| other == self)
    }
}

/// Type-erased, value-compared cancellation identifier.
///
/// Two ids are equal when they wrap values of the same type that compare
/// equal. The hash is computed once at construction.
#[derive(Clone)]
pub struct CancellationId {
    key: Arc<dyn Key>,
    type_id: TypeId,
    hash: u64,
}

impl CancellationId {
    /// Wrap `key` as a cancellation id.
    ///
    /// Passing an existing `CancellationId` returns it unchanged rather than
    /// nesting it, so APIs generic over the key type accept both.
    pub fn new<K>(key: K) -> Self
    where
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        if let Some(id) = (&key as &dyn Any).downcast_ref::<Self>() {
            return id.clone();
        }

        let type_id = TypeId::of::<K>();
        let mut hasher = DefaultHasher::new();
        type_id.hash(&mut hasher);
        key.hash(&mut hasher);

        Self {
            key: Arc::new(key),
            type_id,
            hash: hasher.finish(),
        }
    }

    /// Borrow the wrapped key if it is a `K`.
    #[must_use]
    pub fn downcast_ref<K: Any>(&self) -> Option<&K> {
        self.key.as_any().downcast_ref::<K>()
    }
}

impl PartialEq for CancellationId {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.type_id == other.type_id && self.key.key_eq(&*other.key)
    }
}

impl Eq for CancellationId {}

impl Hash for CancellationId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for CancellationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CancellationId").field(&self.key).finish()
    }
}

impl fmt::Display for CancellationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.key)
    }
}

type Group = BTreeMap<SubscriptionKey, Subscription>;

static GLOBAL: LazyLock<CancellationRegistry> = LazyLock::new(CancellationRegistry::new);

/// Map from cancellation id to the subscriptions currently running under it.
///
/// All operations take one internal lock, so `register`, `unregister` and
/// `cancel_all` are mutually exclusive. `cancel_all` removes the whole group
/// while holding the lock and disposes the removed subscriptions after
/// releasing it; a subscription registered after that point belongs to a new
/// group and is unaffected.
///
/// Effects use [`CancellationRegistry::global`]. Separate instances exist for
/// isolated tests and embedding.
#[derive(Default)]
pub struct CancellationRegistry {
    groups: Mutex<HashMap<CancellationId, Group>>,
}

impl CancellationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by effects.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Add `subscription` to the group for `id`.
    pub fn register(&self, id: CancellationId, subscription: &Subscription) {
        let mut groups = self.lock();
        let group = groups.entry(id).or_default();
        group.insert(subscription.key(), subscription.clone());
        tracing::trace!(subscription = %subscription.key(), active = group.len(), "Registered cancellable subscription");
    }

    /// Remove `subscription` from the group for `id`.
    ///
    /// Idempotent; returns whether anything was removed.
    pub fn unregister(&self, id: &CancellationId, subscription: &Subscription) -> bool {
        self.remove(id, subscription.key())
    }

    pub(crate) fn remove(&self, id: &CancellationId, key: SubscriptionKey) -> bool {
        let mut groups = self.lock();
        let Some(group) = groups.get_mut(id) else {
            return false;
        };

        let removed = group.remove(&key).is_some();
        if group.is_empty() {
            groups.remove(id);
        }
        if removed {
            tracing::trace!(subscription = %key, "Unregistered cancellable subscription");
        }
        removed
    }

    /// Dispose and unregister every subscription currently under `id`.
    ///
    /// Returns the number of subscriptions cancelled. An empty or unknown
    /// group is a no-op that returns `0`.
    pub fn cancel_all(&self, id: &CancellationId) -> usize {
        let group = self.lock().remove(id);

        let Some(group) = group else {
            tracing::trace!(id = %id, "Cancel requested for id with no active subscriptions");
            return 0;
        };

        let count = group.len();
        tracing::debug!(id = %id, count, "Cancelling subscriptions");
        metrics::counter!("cancellation_subscriptions_cancelled_total").increment(count as u64);
        for subscription in group.into_values() {
            subscription.dispose();
        }
        count
    }

    /// Number of subscriptions currently registered under `id`.
    #[must_use]
    pub fn active_count(&self, id: &CancellationId) -> usize {
        self.lock().get(id).map_or(0, BTreeMap::len)
    }

    /// Whether any subscription is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &CancellationId) -> bool {
        self.active_count(id) > 0
    }

    /// Number of ids with at least one active subscription.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CancellationId, Group>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CancellationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationRegistry")
            .field("groups", &self.group_count())
            .finish()
    }
}
