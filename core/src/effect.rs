//! Effects: inert, composable descriptions of asynchronous work.
//!
//! An [`Effect<T, E>`] describes a producer of zero or more `T` values that
//! ends with completion or a failure `E`. Nothing happens until
//! [`Effect::subscribe`] is called; each subscription runs the producer again
//! with a fresh [`Subscriber`] and returns the live [`Subscription`].
//!
//! ```
//! use composable_effects_core::effect::{Effect, Event, Never};
//! use std::sync::{Arc, Mutex};
//!
//! let effect: Effect<i32, Never> = Effect::new(|subscriber| {
//!     subscriber.emit(1);
//!     subscriber.emit(2);
//!     subscriber.complete();
//! });
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let subscription = effect.subscribe(move |event| sink.lock().unwrap().push(event));
//!
//! assert!(subscription.is_disposed());
//! assert_eq!(*seen.lock().unwrap(), vec![Event::Next(1), Event::Next(2), Event::Completed]);
//! ```

use crate::cancellation::{CancellationId, CancellationRegistry};
use crate::subscription::Subscription;
use futures::channel::mpsc;
use futures::Stream;
use std::fmt;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

/// Failure type of effects that cannot fail.
pub type Never = std::convert::Infallible;

/// One notification delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T, E> {
    /// A value
    Next(T),
    /// Normal termination
    Completed,
    /// Termination with a producer failure
    Failed(E),
}

impl<T, E> Event<T, E> {
    /// Whether this event ends the subscription.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }
}

type Sink<T, E> = Arc<dyn Fn(Event<T, E>) + Send + Sync>;
type Producer<T, E> = Arc<dyn Fn(Subscriber<T, E>) + Send + Sync>;

/// The producer-facing side of a subscription.
///
/// Cloneable and thread-safe. After the first terminal call every further
/// call is ignored, as are emissions after the subscription was disposed.
pub struct Subscriber<T, E> {
    sink: Sink<T, E>,
    subscription: Subscription,
    stopped: Arc<AtomicBool>,
}

impl<T, E> Clone for Subscriber<T, E> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            subscription: self.subscription.clone(),
            stopped: Arc::clone(&self.stopped),
        }
    }
}

impl<T, E> Subscriber<T, E> {
    pub(crate) fn new(sink: Sink<T, E>, subscription: Subscription) -> Self {
        Self {
            sink,
            subscription,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver a value.
    pub fn emit(&self, value: T) {
        if self.is_closed() {
            return;
        }
        (self.sink)(Event::Next(value));
    }

    /// Complete the subscription.
    pub fn complete(&self) {
        self.terminate(Event::Completed);
    }

    /// Fail the subscription with `error`.
    pub fn fail(&self, error: E) {
        self.terminate(Event::Failed(error));
    }

    /// Forward an event to the matching callback.
    pub fn send(&self, event: Event<T, E>) {
        match event {
            Event::Next(value) => self.emit(value),
            Event::Completed => self.complete(),
            Event::Failed(error) => self.fail(error),
        }
    }

    /// Register teardown logic that runs when the subscription ends, whether
    /// by completion, failure, or disposal.
    pub fn on_dispose<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.subscription.add_teardown(teardown);
    }

    /// Whether further events will be ignored.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.subscription.is_disposed()
    }

    /// The subscription this subscriber feeds.
    #[must_use]
    pub const fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    fn terminate(&self, event: Event<T, E>) {
        if self.stopped.swap(true, Ordering::SeqCst) || self.subscription.is_disposed() {
            return;
        }
        (self.sink)(event);
        self.subscription.dispose();
    }
}

impl<T, E> fmt::Debug for Subscriber<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("subscription", &self.subscription)
            .field("stopped", &self.stopped.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// A composable, cancellable description of asynchronous work.
///
/// Cloning an effect clones the description, not a running instance.
pub struct Effect<T, E = Never> {
    pub(crate) id: Option<CancellationId>,
    pub(crate) cancel_in_flight: bool,
    /// Ids registered by the effects this one wraps.
    upstream_ids: Arc<[CancellationId]>,
    producer: Producer<T, E>,
}

impl<T, E> Clone for Effect<T, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            cancel_in_flight: self.cancel_in_flight,
            upstream_ids: Arc::clone(&self.upstream_ids),
            producer: Arc::clone(&self.producer),
        }
    }
}

impl<T, E> fmt::Debug for Effect<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("cancel_in_flight", &self.cancel_in_flight)
            .field("upstream_ids", &self.upstream_ids)
            .finish_non_exhaustive()
    }
}

impl<T, E> Effect<T, E> {
    /// The cancellation id this effect itself registers under, if any.
    ///
    /// Operators such as [`map`](Self::map) or [`take`](Self::take) return a
    /// new, untagged effect; use [`cancellation_ids`](Self::cancellation_ids)
    /// to see the ids of the effects they wrap.
    #[must_use]
    pub const fn cancellation_id(&self) -> Option<&CancellationId> {
        self.id.as_ref()
    }

    /// Every cancellation id a subscription to this effect registers under,
    /// its own first, then those of wrapped effects.
    pub fn cancellation_ids(&self) -> impl Iterator<Item = &CancellationId> {
        self.id.iter().chain(self.upstream_ids.iter())
    }

    /// Whether subscribing registers anything in the cancellation registry.
    #[must_use]
    pub fn is_cancellable(&self) -> bool {
        self.cancellation_ids().next().is_some()
    }

    /// Record the ids of `wrapped` as upstream ids of this effect.
    pub(crate) fn wrapping<'a, U: 'a, F2: 'a, I>(mut self, wrapped: I) -> Self
    where
        I: IntoIterator<Item = &'a Effect<U, F2>>,
    {
        let mut ids: Vec<CancellationId> = self.upstream_ids.to_vec();
        for effect in wrapped {
            for id in effect.cancellation_ids() {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }
        self.upstream_ids = ids.into();
        self
    }
}

impl<T, E> Effect<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Build an effect from a producer.
    ///
    /// The producer runs once per subscription. It may emit synchronously,
    /// or hand the [`Subscriber`] to a scheduler and return right away.
    /// Resources it acquires should be released in
    /// [`Subscriber::on_dispose`].
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(Subscriber<T, E>) + Send + Sync + 'static,
    {
        Self {
            id: None,
            cancel_in_flight: false,
            upstream_ids: Arc::from([]),
            producer: Arc::new(producer),
        }
    }

    /// Build an effect, optionally tagged with a cancellation id.
    pub fn create<K, F>(id: Option<K>, producer: F) -> Self
    where
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
        F: Fn(Subscriber<T, E>) + Send + Sync + 'static,
    {
        let effect = Self::new(producer);
        match id {
            Some(id) => effect.cancellable(id),
            None => effect,
        }
    }

    /// An effect that completes immediately without emitting.
    #[must_use]
    pub fn none() -> Self {
        Self::new(|subscriber| subscriber.complete())
    }

    /// An effect that emits `value` and completes.
    pub fn just(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::new(move |subscriber| {
            subscriber.emit(value.clone());
            subscriber.complete();
        })
    }

    /// An effect that fails immediately with `error`.
    pub fn fail(error: E) -> Self
    where
        E: Clone + Sync,
    {
        Self::new(move |subscriber| subscriber.fail(error.clone()))
    }

    /// Tag the effect with a cancellation id.
    ///
    /// Every subscription is registered under `id` before the producer runs
    /// and unregistered on its first terminal event or disposal.
    #[must_use]
    pub fn cancellable<K>(mut self, id: K) -> Self
    where
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        self = self.wrapped_if_tagged();
        self.id = Some(CancellationId::new(id));
        self.cancel_in_flight = false;
        self
    }

    /// Like [`cancellable`](Self::cancellable), but subscribing first cancels
    /// whatever is already running under `id`.
    #[must_use]
    pub fn cancellable_in_flight<K>(self, id: K) -> Self
    where
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        let mut effect = self.cancellable(id);
        effect.cancel_in_flight = true;
        effect
    }

    /// Start the work, delivering every event to `sink`.
    ///
    /// Returns immediately. The returned subscription is disposed
    /// automatically after a terminal event; disposing it earlier stops the
    /// work without delivering anything further.
    pub fn subscribe<F>(&self, sink: F) -> Subscription
    where
        F: Fn(Event<T, E>) + Send + Sync + 'static,
    {
        let subscription = Subscription::new();

        if let Some(id) = &self.id {
            let registry = CancellationRegistry::global();
            if self.cancel_in_flight {
                registry.cancel_all(id);
            }
            registry.register(id.clone(), &subscription);

            let id = id.clone();
            let key = subscription.key();
            subscription.add_teardown(move || {
                CancellationRegistry::global().remove(&id, key);
            });
        }

        let subscriber = Subscriber::new(Arc::new(sink), subscription.clone());
        (self.producer)(subscriber);
        subscription
    }

    /// Subscribe, forwarding only values.
    pub fn subscribe_next<F>(&self, on_next: F) -> Subscription
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let Event::Next(value) = event {
                on_next(value);
            }
        })
    }

    /// Adapt the effect into a [`Stream`] of results.
    ///
    /// The stream ends after completion or after yielding the failure.
    /// Dropping the stream disposes the subscription.
    #[must_use]
    pub fn into_stream(self) -> EffectStream<T, E> {
        let (sender, receiver) = mpsc::unbounded();
        let sender = Mutex::new(Some(sender));

        let subscription = self.subscribe(move |event| {
            let mut guard = sender.lock().unwrap_or_else(PoisonError::into_inner);
            match event {
                Event::Next(value) => {
                    if let Some(sender) = guard.as_ref() {
                        let _ = sender.unbounded_send(Ok(value));
                    }
                },
                Event::Completed => {
                    guard.take();
                },
                Event::Failed(error) => {
                    if let Some(sender) = guard.take() {
                        let _ = sender.unbounded_send(Err(error));
                    }
                },
            }
        });

        EffectStream {
            receiver,
            subscription,
        }
    }

    /// Nest an already tagged effect so a second tag registers separately.
    fn wrapped_if_tagged(self) -> Self {
        if self.id.is_none() {
            return self;
        }
        self.lift(|event, downstream| downstream.send(event))
    }

    /// Subscribe to `self` for every downstream subscription, handing each
    /// upstream event to `transform`. Disposing downstream disposes upstream.
    pub(crate) fn lift<U, F2, F>(self, transform: F) -> Effect<U, F2>
    where
        U: Send + 'static,
        F2: Send + 'static,
        F: Fn(Event<T, E>, &Subscriber<U, F2>) + Send + Sync + 'static,
    {
        let transform = Arc::new(transform);
        let wrapped = self.clone();
        Effect::new(move |subscriber: Subscriber<U, F2>| {
            let transform = Arc::clone(&transform);
            let downstream = subscriber.clone();
            let upstream = self.subscribe(move |event| transform(event, &downstream));
            subscriber.on_dispose(move || upstream.dispose());
        })
        .wrapping([&wrapped])
    }
}

/// A [`Stream`] view of a running effect.
///
/// Created by [`Effect::into_stream`].
pub struct EffectStream<T, E> {
    receiver: mpsc::UnboundedReceiver<Result<T, E>>,
    subscription: Subscription,
}

impl<T, E> EffectStream<T, E> {
    /// The subscription backing this stream.
    #[must_use]
    pub const fn subscription(&self) -> &Subscription {
        &self.subscription
    }
}

impl<T, E> Stream for EffectStream<T, E> {
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

impl<T, E> Drop for EffectStream<T, E> {
    fn drop(&mut self) {
        self.subscription.dispose();
    }
}

impl<T, E> fmt::Debug for EffectStream<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectStream")
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}
