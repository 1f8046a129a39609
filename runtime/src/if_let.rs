//! Presence bridge for optional state.
//!
//! UI layers typically show a screen while some optional piece of state is
//! present and tear it down once the state goes away. [`if_let`] turns the
//! stream of optional states into exactly those two transitions.

use crate::store::Store;
use composable_effects_core::subscription::Subscription;
use std::sync::{Arc, Mutex, PoisonError};

/// Call `on_present` whenever the store's state goes from absent to present,
/// and `on_absent` whenever it goes from present to absent.
///
/// `on_present` receives a child store scoped to the unwrapped value. The
/// child tracks the parent while the value is present and keeps its last
/// value once it goes away. Changes that keep the value present, or keep it
/// absent, trigger neither callback. A store that starts out absent does not
/// trigger `on_absent`.
///
/// The returned subscription keeps the store alive, so a temporary scoped
/// store can be bridged directly. Dispose it to stop observing and release
/// the store.
///
/// # Example
///
/// ```ignore
/// let _bridge = if_let(
///     &store.scope(|app| app.detail.clone(), AppAction::Detail),
///     |detail_store| navigator.push(DetailScreen::new(detail_store)),
///     || navigator.pop(),
/// );
/// ```
pub fn if_let<W, A, P, N>(store: &Store<Option<W>, A>, on_present: P, on_absent: N) -> Subscription
where
    W: Clone + Send + Sync + 'static,
    A: Send + 'static,
    P: Fn(Store<W, A>) + Send + Sync + 'static,
    N: Fn() + Send + Sync + 'static,
{
    let weak = store.downgrade();
    let presence: Mutex<Option<bool>> = Mutex::new(None);
    let on_present = Arc::new(on_present);

    let subscription = store.subscribe(move |state: &Option<W>| {
        let present = state.is_some();
        let previous = presence
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(present);

        match (previous, state) {
            (Some(true), Some(_)) | (Some(false) | None, None) => {},
            (Some(false) | None, Some(value)) => {
                let Some(store) = weak.upgrade() else {
                    return;
                };
                tracing::debug!("Optional state became present");
                let child = store.scope_filtered(value.clone(), |state: &Option<W>| state.clone(), |action| action);
                on_present(child);
            },
            (Some(true), None) => {
                tracing::debug!("Optional state became absent");
                on_absent();
            },
        }
    });

    // Observers only hold the store weakly; the bridge owns it.
    let owned = store.clone();
    subscription.add_teardown(move || drop(owned));
    subscription
}

/// Like [`if_let`], for callers that only react to the value appearing.
pub fn if_let_present<W, A, P>(store: &Store<Option<W>, A>, on_present: P) -> Subscription
where
    W: Clone + Send + Sync + 'static,
    A: Send + 'static,
    P: Fn(Store<W, A>) + Send + Sync + 'static,
{
    if_let(store, on_present, || {})
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code uses unwrap on locks
mod tests {
    use super::*;
    use composable_effects_core::effect::Effect;
    use composable_effects_core::reducer::Reducer;
    use composable_effects_core::{SmallVec, smallvec};

    #[derive(Clone, Debug, PartialEq)]
    struct Detail {
        title: String,
        views: u32,
    }

    #[derive(Clone, Debug)]
    enum DetailAction {
        Open(String),
        View,
        Close,
    }

    struct DetailReducer;

    impl Reducer for DetailReducer {
        type State = Option<Detail>;
        type Action = DetailAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Option<Detail>,
            action: DetailAction,
            _env: &(),
        ) -> SmallVec<[Effect<DetailAction>; 4]> {
            match action {
                DetailAction::Open(title) => *state = Some(Detail { title, views: 0 }),
                DetailAction::View => {
                    if let Some(detail) = state {
                        detail.views += 1;
                    }
                },
                DetailAction::Close => *state = None,
            }
            smallvec![]
        }
    }

    #[derive(Default)]
    struct Navigation {
        events: Mutex<Vec<String>>,
        children: Mutex<Vec<Store<Detail, DetailAction>>>,
    }

    fn bridge(store: &Store<Option<Detail>, DetailAction>, navigation: &Arc<Navigation>) -> Subscription {
        let pushed = Arc::clone(navigation);
        let popped = Arc::clone(navigation);
        if_let(
            store,
            move |child| {
                pushed.events.lock().unwrap().push(format!("push {}", child.state().title));
                pushed.children.lock().unwrap().push(child);
            },
            move || popped.events.lock().unwrap().push("pop".to_string()),
        )
    }

    #[test]
    fn test_transitions_fire_once_each() {
        let store = Store::new(None, DetailReducer, ());
        let navigation = Arc::new(Navigation::default());
        let _bridge = bridge(&store, &navigation);

        store.send(DetailAction::Open("a".to_string()));
        store.send(DetailAction::View);
        store.send(DetailAction::View);
        store.send(DetailAction::Close);
        store.send(DetailAction::Close);
        store.send(DetailAction::Open("b".to_string()));

        assert_eq!(
            *navigation.events.lock().unwrap(),
            vec!["push a", "pop", "push b"]
        );
    }

    #[test]
    fn test_initially_absent_does_not_pop() {
        let store = Store::new(None, DetailReducer, ());
        let navigation = Arc::new(Navigation::default());
        let _bridge = bridge(&store, &navigation);

        assert!(navigation.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_initially_present_pushes_immediately() {
        let initial = Some(Detail {
            title: "start".to_string(),
            views: 0,
        });
        let store = Store::new(initial, DetailReducer, ());
        let navigation = Arc::new(Navigation::default());
        let _bridge = bridge(&store, &navigation);

        assert_eq!(*navigation.events.lock().unwrap(), vec!["push start"]);
    }

    #[test]
    fn test_child_store_tracks_and_keeps_last_value() {
        let store = Store::new(None, DetailReducer, ());
        let navigation = Arc::new(Navigation::default());
        let _bridge = bridge(&store, &navigation);

        store.send(DetailAction::Open("a".to_string()));
        let child = navigation.children.lock().unwrap()[0].clone();

        child.send(DetailAction::View);
        assert_eq!(child.state().views, 1);

        store.send(DetailAction::Close);
        assert_eq!(child.state().views, 1);
        assert_eq!(child.state().title, "a");
    }

    #[test]
    fn test_disposed_bridge_stops_observing() {
        let store = Store::new(None, DetailReducer, ());
        let navigation = Arc::new(Navigation::default());
        let bridge = bridge(&store, &navigation);

        bridge.dispose();
        store.send(DetailAction::Open("a".to_string()));

        assert!(navigation.events.lock().unwrap().is_empty());
    }

    #[test]
    fn test_bridge_keeps_temporary_scope_alive() {
        let store = Store::new(None, DetailReducer, ());
        let navigation = Arc::new(Navigation::default());
        let bridge = bridge(&store.scope(|state: &Option<Detail>| state.clone(), |action| action), &navigation);

        store.send(DetailAction::Open("a".to_string()));
        store.send(DetailAction::Close);
        assert_eq!(*navigation.events.lock().unwrap(), vec!["push a", "pop"]);

        bridge.dispose();
        store.send(DetailAction::Open("b".to_string()));
        assert_eq!(navigation.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_present_only_bridge_ignores_removal() {
        let store = Store::new(None, DetailReducer, ());
        let titles = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&titles);
        let _bridge = if_let_present(&store, move |child: Store<Detail, DetailAction>| {
            sink.lock().unwrap().push(child.state().title);
        });

        store.send(DetailAction::Open("a".to_string()));
        store.send(DetailAction::Close);
        store.send(DetailAction::Open("b".to_string()));

        assert_eq!(*titles.lock().unwrap(), vec!["a", "b"]);
    }
}
