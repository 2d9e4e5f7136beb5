//! Framework Events
//!
//! Typed publish/subscribe channel for framework lifecycle events.
//!
//! Two ways to listen:
//!
//! - [`EventBus::on`] / [`EventBus::on_any`] register synchronous handlers,
//!   called in registration order on the emitting thread.
//! - [`EventBus::channel`] returns a `tokio::sync::broadcast` receiver for
//!   async observers that should not block the emitter.
//!
//! | Event | Wire name | Payload |
//! |-------|-----------|---------|
//! | [`FrameworkEvent::StateChange`] | `state:change` | previous and current state |
//! | [`FrameworkEvent::PageEnter`] | `page:enter` | page id |
//! | [`FrameworkEvent::PageExit`] | `page:exit` | page id |
//! | [`FrameworkEvent::PageRender`] | `page:render` | page id |
//! | [`FrameworkEvent::NavigationChange`] | `navigation:change` | from / to |
//! | [`FrameworkEvent::Error`] | `error` | [`ErrorEvent`] |
//! | [`FrameworkEvent::Debug`] | `debug` | message and optional data |

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::page::PageId;

/// Capacity of the broadcast channel returned by [`EventBus::channel`]
const CHANNEL_CAPACITY: usize = 256;

/// Where an error reported on the bus came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    /// Middleware or reducer failure
    Dispatch,
    /// Navigation request failure
    Navigation,
    /// Page `validate` rejected the state
    Validation,
    /// Page render failure
    Render,
    /// Plugin install or uninstall failure
    Plugin,
}

/// Payload of [`FrameworkEvent::Error`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorEvent {
    /// Subsystem that failed
    pub source: ErrorSource,
    /// Rendered error message
    pub message: String,
    /// Page that was active, if any
    pub page_id: Option<PageId>,
}

impl ErrorEvent {
    /// Build an error payload from anything displayable
    pub fn new(source: ErrorSource, error: &impl std::fmt::Display) -> Self {
        Self {
            source,
            message: error.to_string(),
            page_id: None,
        }
    }

    /// Attach the active page
    #[must_use]
    pub fn on_page(mut self, page_id: Option<PageId>) -> Self {
        self.page_id = page_id;
        self
    }
}

/// Discriminant of [`FrameworkEvent`], used to filter subscriptions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `state:change`
    StateChange,
    /// `page:enter`
    PageEnter,
    /// `page:exit`
    PageExit,
    /// `page:render`
    PageRender,
    /// `navigation:change`
    NavigationChange,
    /// `error`
    Error,
    /// `debug`
    Debug,
}

impl EventKind {
    /// Wire name of the event
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChange => "state:change",
            Self::PageEnter => "page:enter",
            Self::PageExit => "page:exit",
            Self::PageRender => "page:render",
            Self::NavigationChange => "navigation:change",
            Self::Error => "error",
            Self::Debug => "debug",
        }
    }
}

/// A framework lifecycle event
#[derive(Clone, Debug)]
pub enum FrameworkEvent<S> {
    /// A dispatch (or history restore) replaced the state
    StateChange {
        /// State before the change
        previous: S,
        /// State after the change
        current: S,
    },
    /// A page became active
    PageEnter {
        /// Entered page
        page_id: PageId,
    },
    /// A page stopped being active
    PageExit {
        /// Left page
        page_id: PageId,
    },
    /// A page is about to render
    PageRender {
        /// Rendered page
        page_id: PageId,
    },
    /// The current page changed
    NavigationChange {
        /// Previous page; `None` on the first navigation
        from: Option<PageId>,
        /// New current page
        to: PageId,
    },
    /// A recoverable error was reported
    Error(ErrorEvent),
    /// Verbose diagnostics, only emitted with the `debug` option
    Debug {
        /// Human-readable message
        message: String,
        /// Structured context
        data: Option<serde_json::Value>,
    },
}

impl<S> FrameworkEvent<S> {
    /// Discriminant of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateChange { .. } => EventKind::StateChange,
            Self::PageEnter { .. } => EventKind::PageEnter,
            Self::PageExit { .. } => EventKind::PageExit,
            Self::PageRender { .. } => EventKind::PageRender,
            Self::NavigationChange { .. } => EventKind::NavigationChange,
            Self::Error(_) => EventKind::Error,
            Self::Debug { .. } => EventKind::Debug,
        }
    }
}

/// Identifies a subscription on the bus or the store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type EventHandler<S> = Arc<dyn Fn(&FrameworkEvent<S>) + Send + Sync>;

struct Subscription<S> {
    id: SubscriptionId,
    filter: Option<EventKind>,
    once: bool,
    handler: EventHandler<S>,
}

impl<S> Clone for Subscription<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            filter: self.filter,
            once: self.once,
            handler: self.handler.clone(),
        }
    }
}

/// Publish/subscribe hub for [`FrameworkEvent`]s
pub struct EventBus<S> {
    subscriptions: RwLock<Vec<Subscription<S>>>,
    tx: broadcast::Sender<FrameworkEvent<S>>,
    debug: AtomicBool,
    next_id: AtomicU64,
}

impl<S: Clone + Send + 'static> Default for EventBus<S> {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<S: Clone + Send + 'static> EventBus<S> {
    /// Create a bus; `debug` enables [`FrameworkEvent::Debug`] emission
    #[must_use]
    pub fn new(debug: bool) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            subscriptions: RwLock::new(Vec::new()),
            tx,
            debug: AtomicBool::new(debug),
            next_id: AtomicU64::new(1),
        }
    }

    fn subscribe_inner(
        &self,
        filter: Option<EventKind>,
        once: bool,
        handler: EventHandler<S>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscriptions.write().push(Subscription {
            id,
            filter,
            once,
            handler,
        });
        id
    }

    /// Subscribe to one kind of event
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&FrameworkEvent<S>) + Send + Sync + 'static,
    {
        self.subscribe_inner(Some(kind), false, Arc::new(handler))
    }

    /// Subscribe to the next event of one kind only
    pub fn once<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&FrameworkEvent<S>) + Send + Sync + 'static,
    {
        self.subscribe_inner(Some(kind), true, Arc::new(handler))
    }

    /// Subscribe to every event
    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&FrameworkEvent<S>) + Send + Sync + 'static,
    {
        self.subscribe_inner(None, false, Arc::new(handler))
    }

    /// Remove a subscription; returns false if it did not exist
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscriptions.write();
        let before = subs.len();
        subs.retain(|s| s.id != id);
        before != subs.len()
    }

    /// Number of synchronous subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Receiver for async observers
    ///
    /// Slow receivers lag rather than blocking the emitter.
    #[must_use]
    pub fn channel(&self) -> broadcast::Receiver<FrameworkEvent<S>> {
        self.tx.subscribe()
    }

    /// Whether debug events are emitted
    #[must_use]
    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Toggle debug event emission
    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    /// Deliver an event to matching handlers, then to channel receivers
    pub fn emit(&self, event: FrameworkEvent<S>) {
        let kind = event.kind();
        let matching: Vec<Subscription<S>> = {
            let mut subs = self.subscriptions.write();
            let matching: Vec<Subscription<S>> = subs
                .iter()
                .filter(|s| s.filter.map_or(true, |k| k == kind))
                .cloned()
                .collect();
            subs.retain(|s| !(s.once && s.filter.map_or(true, |k| k == kind)));
            matching
        };

        for sub in matching {
            if catch_unwind(AssertUnwindSafe(|| (sub.handler)(&event))).is_err() {
                tracing::error!(subscription = %sub.id, event = kind.name(), "Event handler panicked");
            }
        }

        // No receivers is the common case; not an error
        let _ = self.tx.send(event);
    }

    /// Emit a debug event when debug mode is on
    pub fn debug(&self, message: impl Into<String>, data: Option<serde_json::Value>) {
        if self.is_debug() {
            let message = message.into();
            tracing::debug!(message = %message, "Framework debug event");
            self.emit(FrameworkEvent::Debug { message, data });
        }
    }

    /// Emit an error event
    pub fn error(&self, error: ErrorEvent) {
        self.emit(FrameworkEvent::Error(error));
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    fn enter(id: &str) -> FrameworkEvent<u32> {
        FrameworkEvent::PageEnter {
            page_id: PageId::new(id),
        }
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(EventKind::StateChange.name(), "state:change");
        assert_eq!(EventKind::NavigationChange.name(), "navigation:change");
        assert_eq!(enter("a").kind(), EventKind::PageEnter);
    }

    #[test]
    fn test_handlers_filtered_and_ordered() {
        let bus = EventBus::<u32>::new(false);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        bus.on(EventKind::PageEnter, move |_| s.lock().push("enter"));
        let s = seen.clone();
        bus.on(EventKind::PageExit, move |_| s.lock().push("exit"));
        let s = seen.clone();
        bus.on_any(move |e| s.lock().push(e.kind().name()));

        bus.emit(enter("a"));
        assert_eq!(*seen.lock(), vec!["enter", "page:enter"]);
    }

    #[test]
    fn test_once_and_off() {
        let bus = EventBus::<u32>::new(false);
        let count = Arc::new(Mutex::new(0));

        let c = count.clone();
        bus.once(EventKind::PageEnter, move |_| *c.lock() += 1);
        let c = count.clone();
        let id = bus.on(EventKind::PageEnter, move |_| *c.lock() += 10);

        bus.emit(enter("a"));
        bus.emit(enter("b"));
        assert_eq!(*count.lock(), 21);

        assert!(bus.off(id));
        bus.emit(enter("c"));
        assert_eq!(*count.lock(), 21);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_debug_events_gated() {
        let bus = EventBus::<u32>::new(false);
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        bus.on(EventKind::Debug, move |_| *c.lock() += 1);

        bus.debug("hidden", None);
        assert_eq!(*count.lock(), 0);

        bus.set_debug(true);
        bus.debug("shown", Some(serde_json::json!({"n": 1})));
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_delivery() {
        let bus = EventBus::<u32>::new(false);
        let hit = Arc::new(Mutex::new(false));
        bus.on_any(|_| panic!("bad handler"));
        let h = hit.clone();
        bus.on_any(move |_| *h.lock() = true);

        bus.emit(enter("a"));
        assert!(*hit.lock());
    }

    #[tokio::test]
    async fn test_channel_receives_events() {
        let bus = EventBus::<u32>::new(false);
        let mut rx = bus.channel();
        bus.emit(FrameworkEvent::StateChange {
            previous: 1,
            current: 2,
        });

        match rx.recv().await.unwrap() {
            FrameworkEvent::StateChange { previous, current } => {
                assert_eq!((previous, current), (1, 2));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
