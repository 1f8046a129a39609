//! The Store - runtime coordinator for a reducer
//!
//! A [`Store`] owns state, runs the reducer for every action it is sent, and
//! subscribes the effects the reducer returns, feeding their actions back in.
//! [`Store::scope`] derives child stores that view a part of the parent state
//! and translate their actions into parent actions.

use crate::metrics::StoreMetrics;
use composable_effects_core::effect::Effect;
use composable_effects_core::reducer::Reducer;
use composable_effects_core::subscription::{DisposeBag, Subscription, SubscriptionKey};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Callback<S> = Arc<dyn Fn(&S) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Object-safe surface shared by root and scoped stores.
pub(crate) trait StoreCore<S, A>: Send + Sync {
    fn state(&self) -> S;
    fn send(&self, action: A);
    fn subscribe(&self, on_change: Callback<S>) -> Subscription;
}

/// Change listeners of one store.
struct Observers<S> {
    callbacks: Arc<Mutex<Vec<(SubscriptionKey, Callback<S>)>>>,
}

impl<S> Observers<S> {
    fn new() -> Self {
        Self {
            callbacks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Deliver `current` to `on_change`, then keep it registered until the
    /// returned subscription is disposed.
    fn add(&self, current: &S, on_change: Callback<S>) -> Subscription
    where
        S: 'static,
    {
        on_change(current);

        let subscription = Subscription::new();
        let key = subscription.key();
        lock(&self.callbacks).push((key, on_change));

        let callbacks = Arc::downgrade(&self.callbacks);
        subscription.add_teardown(move || {
            if let Some(callbacks) = callbacks.upgrade() {
                lock(&callbacks).retain(|(candidate, _)| *candidate != key);
            }
        });
        subscription
    }

    fn notify(&self, state: &S) {
        let callbacks: Vec<Callback<S>> = lock(&self.callbacks)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(state);
        }
    }
}

/// An observable state container driven by a reducer.
///
/// Cheap to clone; clones share the same state. Dropping the last handle to a
/// root store disposes every effect it still has in flight. Dropping a scoped
/// store detaches it from its parent.
///
/// # Example
///
/// ```ignore
/// let store = Store::new(CountdownState::new(10), CountdownReducer, environment);
///
/// let _changes = store.subscribe(|state| println!("remaining: {}", state.remaining));
/// store.send(CountdownAction::Start);
/// ```
pub struct Store<S, A> {
    core: Arc<dyn StoreCore<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    /// Create a root store from initial state, reducer, and environment
    ///
    /// # Arguments
    ///
    /// - `initial_state`: The starting state for the store
    /// - `reducer`: The reducer implementation (business logic)
    /// - `environment`: Injected dependencies
    #[must_use]
    pub fn new<R>(initial_state: S, reducer: R, environment: R::Environment) -> Self
    where
        R: Reducer<State = S, Action = A> + Send + Sync + 'static,
        R::Environment: Send + Sync + 'static,
    {
        let root = Arc::new_cyclic(|this| Root {
            reducer,
            environment,
            state: Mutex::new(initial_state),
            queue: Mutex::new(VecDeque::new()),
            sending: AtomicBool::new(false),
            observers: Observers::new(),
            effects: Mutex::new(DisposeBag::new()),
            this: this.clone(),
        });
        Self { core: root }
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> S {
        self.core.state()
    }

    /// Send an action.
    ///
    /// Actions sent while another action is being reduced, including actions
    /// emitted synchronously by effects, are queued and reduced in order
    /// before the outermost `send` returns.
    pub fn send(&self, action: A) {
        self.core.send(action);
    }

    /// Observe state changes.
    ///
    /// `on_change` receives the current state immediately, then the new state
    /// after every reduction, until the returned subscription is disposed.
    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.core.subscribe(Arc::new(on_change))
    }

    /// Derive a child store viewing part of this store's state.
    ///
    /// # Arguments
    ///
    /// - `to_local`: Extracts the child state from parent state
    /// - `from_local`: Lifts a child action into a parent action
    #[must_use]
    pub fn scope<LS, LA, F, G>(&self, to_local: F, from_local: G) -> Store<LS, LA>
    where
        LS: Clone + Send + Sync + 'static,
        LA: Send + 'static,
        F: Fn(&S) -> LS + Send + Sync + 'static,
        G: Fn(LA) -> A + Send + Sync + 'static,
    {
        let initial = to_local(&self.state());
        self.scope_filtered(initial, move |state| Some(to_local(state)), from_local)
    }

    /// Like [`scope`](Self::scope), but parent states for which `extract`
    /// returns `None` leave the child untouched.
    pub(crate) fn scope_filtered<LS, LA, F, G>(
        &self,
        initial: LS,
        extract: F,
        from_local: G,
    ) -> Store<LS, LA>
    where
        LS: Clone + Send + Sync + 'static,
        LA: Send + 'static,
        F: Fn(&S) -> Option<LS> + Send + Sync + 'static,
        G: Fn(LA) -> A + Send + Sync + 'static,
    {
        let parent = self.clone();
        let scoped = Arc::new_cyclic(|this: &Weak<Scoped<S, A, LS, LA>>| {
            let child = this.clone();
            let link = parent.subscribe(move |state| {
                let Some(child) = child.upgrade() else {
                    return;
                };
                if let Some(local) = extract(state) {
                    child.update(local);
                }
            });

            Scoped {
                parent,
                state: Mutex::new(initial),
                from_local: Box::new(from_local),
                observers: Observers::new(),
                link,
            }
        });
        Store { core: scoped }
    }

    pub(crate) fn downgrade(&self) -> WeakStore<S, A> {
        WeakStore {
            core: Arc::downgrade(&self.core),
        }
    }
}

impl<S, A> fmt::Debug for Store<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

/// Non-owning handle to a store.
pub(crate) struct WeakStore<S, A> {
    core: Weak<dyn StoreCore<S, A>>,
}

impl<S, A> WeakStore<S, A> {
    pub(crate) fn upgrade(&self) -> Option<Store<S, A>> {
        self.core.upgrade().map(|core| Store { core })
    }
}

/// Root store: owns state, reducer, environment, and in-flight effects.
struct Root<R: Reducer> {
    reducer: R,
    environment: R::Environment,
    state: Mutex<R::State>,
    queue: Mutex<VecDeque<R::Action>>,
    sending: AtomicBool,
    observers: Observers<R::State>,
    effects: Mutex<DisposeBag>,
    this: Weak<Self>,
}

impl<R> Root<R>
where
    R: Reducer + Send + Sync + 'static,
    R::State: Clone + Send + Sync + 'static,
    R::Action: Send + 'static,
    R::Environment: Send + Sync + 'static,
{
    fn process(&self, action: R::Action) {
        let (effects, snapshot) = {
            let mut state = lock(&self.state);
            let effects = self.reducer.reduce(&mut state, action, &self.environment);
            (effects, state.clone())
        };

        StoreMetrics::record_action();
        tracing::trace!(effects = effects.len(), "Reducer completed");

        self.observers.notify(&snapshot);

        for effect in effects {
            self.start(&effect);
        }
    }

    fn start(&self, effect: &Effect<R::Action>) {
        StoreMetrics::record_effect_started();

        let this = self.this.clone();
        let subscription = effect.subscribe_next(move |action| {
            if let Some(root) = this.upgrade() {
                root.send(action);
            }
        });

        if !subscription.is_disposed() {
            lock(&self.effects).insert(subscription);
        }
    }
}

impl<R> StoreCore<R::State, R::Action> for Root<R>
where
    R: Reducer + Send + Sync + 'static,
    R::State: Clone + Send + Sync + 'static,
    R::Action: Send + 'static,
    R::Environment: Send + Sync + 'static,
{
    fn state(&self) -> R::State {
        lock(&self.state).clone()
    }

    fn send(&self, action: R::Action) {
        {
            let mut queue = lock(&self.queue);
            queue.push_back(action);
            if self.sending.swap(true, Ordering::AcqRel) {
                tracing::trace!(queued = queue.len(), "Action queued behind running reduction");
                return;
            }
        }

        loop {
            let next = {
                let mut queue = lock(&self.queue);
                let Some(action) = queue.pop_front() else {
                    self.sending.store(false, Ordering::Release);
                    return;
                };
                action
            };
            self.process(next);
        }
    }

    fn subscribe(&self, on_change: Callback<R::State>) -> Subscription {
        let current = self.state();
        self.observers.add(&current, on_change)
    }
}

impl<R: Reducer> Drop for Root<R> {
    fn drop(&mut self) {
        let mut effects = lock(&self.effects);
        if !effects.is_empty() {
            tracing::debug!(in_flight = effects.len(), "Store dropped, disposing effects");
        }
        effects.dispose_all();
    }
}

/// Child store viewing a projection of its parent.
struct Scoped<S, A, LS, LA> {
    parent: Store<S, A>,
    state: Mutex<LS>,
    from_local: Box<dyn Fn(LA) -> A + Send + Sync>,
    observers: Observers<LS>,
    link: Subscription,
}

impl<S, A, LS, LA> Scoped<S, A, LS, LA>
where
    LS: Clone + 'static,
{
    fn update(&self, local: LS) {
        *lock(&self.state) = local.clone();
        self.observers.notify(&local);
    }
}

impl<S, A, LS, LA> StoreCore<LS, LA> for Scoped<S, A, LS, LA>
where
    S: Clone + Send + Sync + 'static,
    A: Send + 'static,
    LS: Clone + Send + Sync + 'static,
    LA: Send + 'static,
{
    fn state(&self) -> LS {
        lock(&self.state).clone()
    }

    fn send(&self, action: LA) {
        self.parent.send((self.from_local)(action));
    }

    fn subscribe(&self, on_change: Callback<LS>) -> Subscription {
        let current = self.state();
        self.observers.add(&current, on_change)
    }
}

impl<S, A, LS, LA> Drop for Scoped<S, A, LS, LA> {
    fn drop(&mut self) {
        self.link.dispose();
    }
}
