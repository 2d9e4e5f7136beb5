//! State Store
//!
//! Holds the domain state and is the only place it changes. A dispatch runs
//! in three phases:
//!
//! 1. **Validate** - the action's own [`Action::validate`] check
//! 2. **Middleware** - the chain in registration order; each middleware may
//!    transform the action, call [`Next::run`], or short-circuit with a state
//!    of its own
//! 3. **Reduce** - every active reducer, in registration order, each
//!    receiving the previous reducer's output
//!
//! The result replaces the state, subscribers are called in subscription
//! order with `(new, previous)`, and a `state:change` event is emitted.
//!
//! # Single writer
//!
//! Dispatches never overlap. A dispatch issued while another is in progress
//! (from a subscriber, a middleware, or another thread) is queued and
//! applied after the current one in FIFO order; the queued call returns
//! `Ok(())` immediately and any failure is reported on the event bus.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::contrib::{ContributionMap, Contributor};
use crate::error::DispatchError;
use crate::events::{ErrorEvent, ErrorSource, EventBus, FrameworkEvent, SubscriptionId};

/// Domain state held by the store
pub trait State: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> State for T {}

/// Domain action accepted by `dispatch`
///
/// Implement this on a closed enum; `validate` checks payload shape before
/// any middleware sees the action.
pub trait Action: Clone + fmt::Debug + Send + Sync + 'static {
    /// Variant name, used in logs and errors
    fn kind(&self) -> &str;

    /// Reject malformed payloads
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Pure state transition
pub type Reducer<S, A> = Arc<dyn Fn(&S, &A) -> anyhow::Result<S> + Send + Sync>;

/// Called after every state change with `(new, previous)`
pub type Subscriber<S> = Arc<dyn Fn(&S, &S) + Send + Sync>;

/// Wrap an infallible function as a [`Reducer`]
pub fn reducer<S, A, F>(f: F) -> Reducer<S, A>
where
    F: Fn(&S, &A) -> S + Send + Sync + 'static,
{
    Arc::new(move |state, action| Ok(f(state, action)))
}

/// Wrap a fallible function as a [`Reducer`]
pub fn try_reducer<S, A, F>(f: F) -> Reducer<S, A>
where
    F: Fn(&S, &A) -> anyhow::Result<S> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A step in the dispatch pipeline
pub trait Middleware<S: State, A: Action>: Send + Sync {
    /// Name used in errors and logs
    fn name(&self) -> &str;

    /// Handle an action
    ///
    /// Call `next.run(action, state)` to continue the chain, possibly with a
    /// different action; return a state directly to short-circuit it.
    fn handle(&self, action: &A, state: &S, next: Next<'_, S, A>) -> Result<S, DispatchError>;
}

/// The remainder of the pipeline after the current middleware
pub struct Next<'a, S: State, A: Action> {
    chain: &'a [Arc<dyn Middleware<S, A>>],
    reducers: &'a [(String, Reducer<S, A>)],
}

impl<'a, S: State, A: Action> Next<'a, S, A> {
    /// Run the rest of the chain, then the reducers
    pub fn run(self, action: &A, state: &S) -> Result<S, DispatchError> {
        match self.chain.split_first() {
            Some((middleware, rest)) => middleware.handle(
                action,
                state,
                Next {
                    chain: rest,
                    reducers: self.reducers,
                },
            ),
            None => reduce(self.reducers, action, state),
        }
    }
}

fn reduce<S: State, A>(
    reducers: &[(String, Reducer<S, A>)],
    action: &A,
    state: &S,
) -> Result<S, DispatchError> {
    let mut current = state.clone();
    for (name, reducer) in reducers {
        current = reducer(&current, action).map_err(|e| DispatchError::Reducer {
            name: name.clone(),
            message: e.to_string(),
        })?;
    }
    Ok(current)
}

type MiddlewareFn<S, A> =
    dyn for<'a> Fn(&A, &S, Next<'a, S, A>) -> Result<S, DispatchError> + Send + Sync;

/// Middleware built from a closure
pub struct FnMiddleware<S: State, A: Action> {
    name: String,
    f: Box<MiddlewareFn<S, A>>,
}

impl<S: State, A: Action> Middleware<S, A> for FnMiddleware<S, A> {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, action: &A, state: &S, next: Next<'_, S, A>) -> Result<S, DispatchError> {
        (self.f)(action, state, next)
    }
}

/// Wrap a closure as named middleware
pub fn middleware_fn<S, A, F>(name: impl Into<String>, f: F) -> Arc<dyn Middleware<S, A>>
where
    S: State,
    A: Action,
    F: for<'a> Fn(&A, &S, Next<'a, S, A>) -> Result<S, DispatchError> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware {
        name: name.into(),
        f: Box::new(f),
    })
}

#[derive(Default)]
struct DispatchQueue<A> {
    pending: VecDeque<A>,
    draining: bool,
}

/// Clears the draining flag if a reducer or subscriber panics mid-drain
struct DrainGuard<'a, A> {
    queue: &'a Mutex<DispatchQueue<A>>,
    armed: bool,
}

impl<A> Drop for DrainGuard<'_, A> {
    fn drop(&mut self) {
        if self.armed {
            let mut queue = self.queue.lock();
            queue.draining = false;
            queue.pending.clear();
        }
    }
}

/// Centralized state with middleware, reducers and subscribers
pub struct StateStore<S: State, A: Action> {
    state: RwLock<S>,
    reducers: RwLock<ContributionMap<Reducer<S, A>>>,
    middleware: RwLock<Vec<(Contributor, Arc<dyn Middleware<S, A>>)>>,
    subscribers: RwLock<Vec<(SubscriptionId, Subscriber<S>)>>,
    queue: Mutex<DispatchQueue<A>>,
    bus: Arc<EventBus<S>>,
    next_subscription: AtomicU64,
    applied: AtomicU64,
}

impl<S: State, A: Action> StateStore<S, A> {
    /// Create a store holding `initial`
    pub fn new(initial: S, bus: Arc<EventBus<S>>) -> Self {
        Self {
            state: RwLock::new(initial),
            reducers: RwLock::new(ContributionMap::default()),
            middleware: RwLock::new(Vec::new()),
            subscribers: RwLock::new(Vec::new()),
            queue: Mutex::new(DispatchQueue {
                pending: VecDeque::new(),
                draining: false,
            }),
            bus,
            next_subscription: AtomicU64::new(1),
            applied: AtomicU64::new(0),
        }
    }

    /// Clone of the current state
    #[must_use]
    pub fn state(&self) -> S {
        self.state.read().clone()
    }

    /// Read the current state without cloning it
    pub fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.read())
    }

    /// Number of actions applied successfully so far
    #[must_use]
    pub fn applied_count(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Pipeline registration
    // ========================================================================

    /// Register a reducer; a later reducer with the same name shadows this one
    pub fn add_reducer(&self, name: impl Into<String>, reducer: Reducer<S, A>, owner: Contributor) {
        let name = name.into();
        tracing::debug!(reducer = %name, owner = %owner, "Reducer registered");
        self.reducers.write().insert(name, reducer, owner);
    }

    /// Append middleware to the chain
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware<S, A>>, owner: Contributor) {
        tracing::debug!(middleware = middleware.name(), owner = %owner, "Middleware registered");
        self.middleware.write().push((owner, middleware));
    }

    /// Remove every reducer and middleware contributed by `owner`
    ///
    /// Returns the affected reducer names and the number of middleware
    /// removed. Shadowed reducers become active again.
    pub fn remove_owned_by(&self, owner: &Contributor) -> (Vec<String>, usize) {
        let reducers = self.reducers.write().remove_owned_by(owner);
        let mut chain = self.middleware.write();
        let before = chain.len();
        chain.retain(|(o, _)| o != owner);
        (reducers, before - chain.len())
    }

    /// Names of registered reducers, in application order
    #[must_use]
    pub fn reducer_names(&self) -> Vec<String> {
        self.reducers.read().names()
    }

    /// Names of registered middleware, in chain order
    #[must_use]
    pub fn middleware_names(&self) -> Vec<String> {
        self.middleware
            .read()
            .iter()
            .map(|(_, m)| m.name().to_string())
            .collect()
    }

    // ========================================================================
    // Subscribers
    // ========================================================================

    /// Register a subscriber, called with `(new, previous)` after every change
    pub fn subscribe<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&S, &S) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.subscribers.write().push((id, Arc::new(f)));
        id
    }

    /// Remove a subscriber; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write();
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        before != subs.len()
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Run an action through the pipeline and commit the result
    ///
    /// # Errors
    ///
    /// Returns the [`DispatchError`] of this action; the state is left as it
    /// was. Errors are also reported as `error` events. A call made while
    /// another dispatch is in progress is queued and returns `Ok(())`.
    pub fn dispatch(&self, action: A) -> Result<(), DispatchError> {
        {
            let mut queue = self.queue.lock();
            queue.pending.push_back(action);
            if queue.draining {
                tracing::trace!(queued = queue.pending.len(), "Dispatch queued behind running dispatch");
                return Ok(());
            }
            queue.draining = true;
        }

        let mut guard = DrainGuard {
            queue: &self.queue,
            armed: true,
        };
        let mut outcome = None;

        loop {
            let next = {
                let mut queue = self.queue.lock();
                match queue.pending.pop_front() {
                    Some(action) => action,
                    None => {
                        queue.draining = false;
                        break;
                    }
                }
            };

            let result = self.apply(next);
            // The first action drained is always the caller's own
            if outcome.is_none() {
                outcome = Some(result);
            }
        }
        guard.armed = false;

        outcome.unwrap_or(Ok(()))
    }

    fn apply(&self, action: A) -> Result<(), DispatchError> {
        if let Err(reason) = action.validate() {
            let err = DispatchError::InvalidAction {
                kind: action.kind().to_string(),
                reason,
            };
            self.report(&err);
            return Err(err);
        }

        let previous = self.state();
        let chain: Vec<Arc<dyn Middleware<S, A>>> = self
            .middleware
            .read()
            .iter()
            .map(|(_, m)| m.clone())
            .collect();
        let reducers = self.reducers.read().active();

        let next = Next {
            chain: &chain,
            reducers: &reducers,
        };

        match next.run(&action, &previous) {
            Ok(current) => {
                *self.state.write() = current.clone();
                self.applied.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(action = action.kind(), "Action applied");
                if self.bus.is_debug() {
                    self.bus.debug(
                        format!("dispatched {}", action.kind()),
                        Some(serde_json::json!({ "action": format!("{action:?}") })),
                    );
                }
                self.notify(&current, &previous);
                Ok(())
            }
            Err(err) => {
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Replace the state wholesale, bypassing the pipeline
    ///
    /// Used to restore history snapshots. Subscribers and `state:change`
    /// listeners are notified as for a dispatch. Returns the replaced state.
    pub fn replace_state(&self, next: S) -> S {
        let previous = std::mem::replace(&mut *self.state.write(), next.clone());
        tracing::debug!("State replaced");
        self.notify(&next, &previous);
        previous
    }

    fn notify(&self, current: &S, previous: &S) {
        let subscribers: Vec<(SubscriptionId, Subscriber<S>)> = self.subscribers.read().clone();
        for (_, subscriber) in subscribers {
            subscriber(current, previous);
        }
        self.bus.emit(FrameworkEvent::StateChange {
            previous: previous.clone(),
            current: current.clone(),
        });
    }

    fn report(&self, err: &DispatchError) {
        tracing::warn!(error = %err, "Dispatch failed");
        self.bus.error(ErrorEvent::new(ErrorSource::Dispatch, err));
    }
}

impl<S: State, A: Action> fmt::Debug for StateStore<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("state", &*self.state.read())
            .field("reducers", &self.reducer_names())
            .field("middleware", &self.middleware_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Counter action shared by unit tests

    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Counter {
        Add(u32),
        Fail,
        Invalid,
    }

    impl Action for Counter {
        fn kind(&self) -> &str {
            match self {
                Self::Add(_) => "ADD",
                Self::Fail => "FAIL",
                Self::Invalid => "INVALID",
            }
        }

        fn validate(&self) -> Result<(), String> {
            match self {
                Self::Invalid => Err("payload missing".to_string()),
                _ => Ok(()),
            }
        }
    }

    pub fn counter_store() -> StateStore<u32, Counter> {
        let store = StateStore::new(0, Arc::new(EventBus::new(false)));
        store.add_reducer(
            "count",
            try_reducer(|state: &u32, action: &Counter| match action {
                Counter::Add(n) => Ok(state + n),
                Counter::Fail => anyhow::bail!("cannot apply"),
                Counter::Invalid => Ok(*state),
            }),
            Contributor::Builder,
        );
        store
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::testing::{counter_store, Counter};
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_dispatch_folds_actions() {
        let store = counter_store();
        for n in 1..=4 {
            store.dispatch(Counter::Add(n)).unwrap();
        }
        assert_eq!(store.state(), 10);
        assert_eq!(store.applied_count(), 4);
    }

    #[test]
    fn test_reducer_error_leaves_state() {
        let store = counter_store();
        let errors = Arc::new(Mutex::new(0));
        let e = errors.clone();
        store.bus.on(EventKind::Error, move |_| *e.lock() += 1);

        store.dispatch(Counter::Add(3)).unwrap();
        let err = store.dispatch(Counter::Fail).unwrap_err();
        assert!(matches!(err, DispatchError::Reducer { ref name, .. } if name == "count"));
        assert_eq!(store.state(), 3);
        assert_eq!(*errors.lock(), 1);
    }

    #[test]
    fn test_invalid_action_rejected_before_middleware() {
        let store = counter_store();
        let seen = Arc::new(Mutex::new(0));
        let s = seen.clone();
        store.add_middleware(
            middleware_fn("count-calls", move |action, state, next: Next<'_, u32, Counter>| {
                *s.lock() += 1;
                next.run(action, state)
            }),
            Contributor::Builder,
        );

        let err = store.dispatch(Counter::Invalid).unwrap_err();
        assert_eq!(
            err,
            DispatchError::InvalidAction {
                kind: "INVALID".into(),
                reason: "payload missing".into()
            }
        );
        assert_eq!(*seen.lock(), 0);
    }

    #[test]
    fn test_middleware_order_and_transform() {
        let store = counter_store();
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = log.clone();
        store.add_middleware(
            middleware_fn("first", move |action, state, next: Next<'_, u32, Counter>| {
                l.lock().push("first");
                next.run(action, state)
            }),
            Contributor::Builder,
        );
        let l = log.clone();
        store.add_middleware(
            middleware_fn("double", move |action: &Counter, state, next: Next<'_, u32, Counter>| {
                l.lock().push("double");
                match action {
                    Counter::Add(n) => next.run(&Counter::Add(n * 2), state),
                    other => next.run(other, state),
                }
            }),
            Contributor::Builder,
        );

        store.dispatch(Counter::Add(5)).unwrap();
        assert_eq!(store.state(), 10);
        assert_eq!(*log.lock(), vec!["first", "double"]);
        assert_eq!(store.middleware_names(), vec!["first", "double"]);
    }

    #[test]
    fn test_middleware_short_circuit() {
        let store = counter_store();
        store.add_middleware(
            middleware_fn("freeze", |_action, state: &u32, _next: Next<'_, u32, Counter>| {
                Ok(*state)
            }),
            Contributor::Builder,
        );
        store.dispatch(Counter::Add(5)).unwrap();
        assert_eq!(store.state(), 0);
    }

    #[test]
    fn test_reducers_thread_state_in_order() {
        let store: StateStore<Vec<&'static str>, Counter> =
            StateStore::new(Vec::new(), Arc::new(EventBus::new(false)));
        store.add_reducer(
            "a",
            reducer(|s: &Vec<&'static str>, _: &Counter| {
                let mut s = s.clone();
                s.push("a");
                s
            }),
            Contributor::Builder,
        );
        store.add_reducer(
            "b",
            reducer(|s: &Vec<&'static str>, _: &Counter| {
                let mut s = s.clone();
                s.push("b");
                s
            }),
            Contributor::Builder,
        );
        store.dispatch(Counter::Add(0)).unwrap();
        assert_eq!(store.state(), vec!["a", "b"]);
    }

    #[test]
    fn test_reducer_override_and_restore() {
        let store = counter_store();
        store.add_reducer(
            "count",
            reducer(|s: &u32, _: &Counter| s + 100),
            Contributor::plugin("boost"),
        );
        store.dispatch(Counter::Add(1)).unwrap();
        assert_eq!(store.state(), 100);

        let (removed, middleware) = store.remove_owned_by(&Contributor::plugin("boost"));
        assert_eq!(removed, vec!["count"]);
        assert_eq!(middleware, 0);
        store.dispatch(Counter::Add(1)).unwrap();
        assert_eq!(store.state(), 101);
    }

    #[test]
    fn test_subscribers_called_in_order_with_new_and_previous() {
        let store = counter_store();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c = calls.clone();
        store.subscribe(move |new, prev| c.lock().push(("first", *new, *prev)));
        let c = calls.clone();
        let second = store.subscribe(move |new, prev| c.lock().push(("second", *new, *prev)));

        store.dispatch(Counter::Add(2)).unwrap();
        assert!(store.unsubscribe(second));
        store.dispatch(Counter::Add(3)).unwrap();

        assert_eq!(
            *calls.lock(),
            vec![("first", 2, 0), ("second", 2, 0), ("first", 5, 2)]
        );
    }

    #[test]
    fn test_reentrant_dispatch_is_queued() {
        let store = Arc::new(counter_store());
        let order = Arc::new(Mutex::new(Vec::new()));

        let weak = Arc::downgrade(&store);
        let o = order.clone();
        store.subscribe(move |new, _| {
            o.lock().push(*new);
            if *new == 1 {
                if let Some(store) = weak.upgrade() {
                    // Applied after this notification round completes
                    assert_eq!(store.dispatch(Counter::Add(10)), Ok(()));
                    assert_eq!(store.state(), 1);
                }
            }
        });

        store.dispatch(Counter::Add(1)).unwrap();
        assert_eq!(store.state(), 11);
        assert_eq!(*order.lock(), vec![1, 11]);
    }

    #[test]
    fn test_replace_state_notifies() {
        let store = counter_store();
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        store.subscribe(move |new, prev| *s.lock() = Some((*new, *prev)));

        store.dispatch(Counter::Add(4)).unwrap();
        assert_eq!(store.replace_state(1), 4);
        assert_eq!(*seen.lock(), Some((1, 4)));
    }
}
