//! Operators that build new effects out of existing ones.
//!
//! - [`Effect::merge`]: run children concurrently
//! - [`Effect::concat`]: run children one after another
//! - [`Effect::cancel`]: tear down everything running under an id
//! - [`Effect::take`]: finite prefix of a possibly infinite effect
//! - [`Effect::map`], [`Effect::map_err`], [`Effect::inspect`]: per-event transforms
//! - [`Effect::deferred`]: start the effect later on a scheduler

use crate::cancellation::{CancellationId, CancellationRegistry};
use crate::effect::{Effect, Event, Subscriber};
use crate::scheduler::Scheduler;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

impl<T, E> Effect<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Run all `effects` concurrently.
    ///
    /// Every child is subscribed when the merged effect is subscribed, and
    /// every value from every child is forwarded. The merge completes once all
    /// children have completed. The first child failure fails the merge and
    /// disposes the remaining children before this call returns.
    pub fn merge<I>(effects: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let effects: Arc<[Self]> = effects.into_iter().collect();
        let wrapped = Arc::clone(&effects);

        Self::new(move |subscriber| {
            if effects.is_empty() {
                subscriber.complete();
                return;
            }

            let remaining = Arc::new(AtomicUsize::new(effects.len()));
            for effect in effects.iter() {
                if subscriber.is_closed() {
                    break;
                }

                let downstream = subscriber.clone();
                let remaining = Arc::clone(&remaining);
                let child = effect.subscribe(move |event| match event {
                    Event::Next(value) => downstream.emit(value),
                    Event::Completed => {
                        if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                            downstream.complete();
                        }
                    },
                    Event::Failed(error) => downstream.fail(error),
                });
                subscriber.subscription().attach(child);
            }
        })
        .wrapping(wrapped.iter())
    }

    /// Run `effects` one after another.
    ///
    /// Each child is subscribed after the previous one completes; a failure
    /// stops the sequence and is forwarded.
    pub fn concat<I>(effects: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let effects: Arc<[Self]> = effects.into_iter().collect();
        let wrapped = Arc::clone(&effects);
        Self::new(move |subscriber| subscribe_from(Arc::clone(&effects), 0, subscriber))
            .wrapping(wrapped.iter())
    }

    /// An effect that cancels every subscription running under `id`, then
    /// completes without emitting.
    ///
    /// Cancelling an id with nothing registered just completes.
    pub fn cancel<K>(id: K) -> Self
    where
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        let id = CancellationId::new(id);
        Self::new(move |subscriber| {
            CancellationRegistry::global().cancel_all(&id);
            subscriber.complete();
        })
    }

    /// Forward the first `count` values, then complete and dispose upstream.
    #[must_use]
    pub fn take(self, count: usize) -> Self {
        let wrapped = self.clone();
        Self::new(move |subscriber| {
            if count == 0 {
                subscriber.complete();
                return;
            }

            let taken = Arc::new(AtomicUsize::new(0));
            let downstream = subscriber.clone();
            let upstream = self.subscribe(move |event| match event {
                Event::Next(value) => {
                    let seen = taken.fetch_add(1, Ordering::SeqCst) + 1;
                    if seen <= count {
                        downstream.emit(value);
                    }
                    if seen == count {
                        downstream.complete();
                    }
                },
                Event::Completed => downstream.complete(),
                Event::Failed(error) => downstream.fail(error),
            });
            subscriber.subscription().attach(upstream);
        })
        .wrapping([&wrapped])
    }

    /// Transform every value.
    #[must_use]
    pub fn map<U, F>(self, transform: F) -> Effect<U, E>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.lift(move |event, downstream: &Subscriber<U, E>| match event {
            Event::Next(value) => downstream.emit(transform(value)),
            Event::Completed => downstream.complete(),
            Event::Failed(error) => downstream.fail(error),
        })
    }

    /// Transform the failure.
    #[must_use]
    pub fn map_err<F2, F>(self, transform: F) -> Effect<T, F2>
    where
        F2: Send + 'static,
        F: Fn(E) -> F2 + Send + Sync + 'static,
    {
        self.lift(move |event, downstream: &Subscriber<T, F2>| match event {
            Event::Next(value) => downstream.emit(value),
            Event::Completed => downstream.complete(),
            Event::Failed(error) => downstream.fail(transform(error)),
        })
    }

    /// Observe every value without changing it.
    #[must_use]
    pub fn inspect<F>(self, observe: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.lift(move |event, downstream: &Subscriber<T, E>| {
            if let Event::Next(value) = &event {
                observe(value);
            }
            downstream.send(event);
        })
    }

    /// Subscribe to this effect only after `delay` has elapsed on `scheduler`.
    ///
    /// Disposing before the delay elapses means the effect never starts.
    #[must_use]
    pub fn deferred<S>(self, delay: Duration, scheduler: &S) -> Self
    where
        S: Scheduler + Clone + 'static,
    {
        let scheduler = scheduler.clone();
        let wrapped = self.clone();
        Self::new(move |subscriber| {
            let upstream = self.clone();
            let downstream = subscriber.clone();
            let task = scheduler.schedule_once(
                delay,
                Box::new(move || {
                    if downstream.is_closed() {
                        return;
                    }
                    let forward = downstream.clone();
                    let inner = upstream.subscribe(move |event| forward.send(event));
                    downstream.subscription().attach(inner);
                }),
            );
            subscriber.subscription().attach(task);
        })
        .wrapping([&wrapped])
    }
}

fn subscribe_from<T, E>(effects: Arc<[Effect<T, E>]>, index: usize, subscriber: Subscriber<T, E>)
where
    T: Send + 'static,
    E: Send + 'static,
{
    let Some(effect) = effects.get(index) else {
        subscriber.complete();
        return;
    };
    if subscriber.is_closed() {
        return;
    }

    let downstream = subscriber.clone();
    let rest = Arc::clone(&effects);
    let current = effect.subscribe(move |event| match event {
        Event::Next(value) => downstream.emit(value),
        Event::Completed => subscribe_from(Arc::clone(&rest), index + 1, downstream.clone()),
        Event::Failed(error) => downstream.fail(error),
    });
    subscriber.subscription().attach(current);
}
