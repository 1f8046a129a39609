//! Event capture for assertions on effect output.

use composable_effects_core::effect::{Effect, Event};
use composable_effects_core::subscription::Subscription;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Records every event an effect delivers.
///
/// Cloning shares the underlying log, so a clone can be moved into a sink
/// while the original stays with the test.
///
/// # Example
///
/// ```
/// use composable_effects_core::effect::{Effect, Never};
/// use composable_effects_testing::EventRecorder;
///
/// let recorder = EventRecorder::<i32, Never>::new();
/// let _subscription = recorder.record(&Effect::just(7));
///
/// assert_eq!(recorder.values(), vec![7]);
/// assert!(recorder.is_completed());
/// ```
pub struct EventRecorder<T, E> {
    events: Arc<Mutex<Vec<Event<T, E>>>>,
}

impl<T, E> EventRecorder<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A sink appending to this recorder, for use with [`Effect::subscribe`].
    #[must_use]
    pub fn sink(&self) -> impl Fn(Event<T, E>) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event| {
            events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event);
        }
    }

    /// Subscribe to `effect`, recording everything it delivers.
    pub fn record(&self, effect: &Effect<T, E>) -> Subscription {
        effect.subscribe(self.sink())
    }

    /// Every event seen so far, in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<Event<T, E>> {
        self.lock().clone()
    }

    /// Values seen so far, in delivery order.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                Event::Next(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of values seen so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|event| matches!(event, Event::Next(_)))
            .count()
    }

    /// Whether a completion was recorded.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.lock()
            .iter()
            .any(|event| matches!(event, Event::Completed))
    }

    /// The recorded failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<E> {
        self.lock().iter().find_map(|event| match event {
            Event::Failed(error) => Some(error.clone()),
            _ => None,
        })
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event<T, E>>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, E> Clone for EventRecorder<T, E> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

impl<T, E> Default for EventRecorder<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for EventRecorder<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventRecorder")
            .field("events", &*events)
            .finish()
    }
}
