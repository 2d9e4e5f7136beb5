//! Navigation Engine
//!
//! State machine over the [`PageRegistry`]: tracks the current page, runs
//! the enter/exit hooks, records history and announces every transition on
//! the event bus.
//!
//! # Transition order
//!
//! ```text
//! navigate_to(target)
//!   ├─ target registered?             no → PageNotFound
//!   ├─ current.can_navigate_to(target) no → Denied
//!   ├─ current.on_exit(state)          err → Hook
//!   ├─ target.on_enter(state)          err → Hook
//!   ├─ history.record(target, state)
//!   ├─ current = target
//!   └─ emit page:exit, navigation:change, page:enter
//! ```
//!
//! Any error leaves the current page and the history exactly as they were.

use std::fmt;
use std::sync::Arc;

use crate::error::NavigationError;
use crate::events::{EventBus, FrameworkEvent};
use crate::history::{History, HistoryEntry};
use crate::page::{Page, PageId};
use crate::registry::PageRegistry;
use crate::store::{Action, State};

/// Which way a history move goes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Back,
    Forward,
}

/// Current page, history and transition hooks
pub struct NavigationEngine<S: State, A: Action> {
    registry: PageRegistry<S, A>,
    history: History<S>,
    current: Option<PageId>,
    bus: Arc<EventBus<S>>,
}

impl<S: State, A: Action> NavigationEngine<S, A> {
    /// Create an engine over a registry; no page is current until [`start`](Self::start)
    pub fn new(registry: PageRegistry<S, A>, history: History<S>, bus: Arc<EventBus<S>>) -> Self {
        Self {
            registry,
            history,
            current: None,
            bus,
        }
    }

    /// The page registry
    #[must_use]
    pub fn registry(&self) -> &PageRegistry<S, A> {
        &self.registry
    }

    /// Mutable access for plugin installation
    pub fn registry_mut(&mut self) -> &mut PageRegistry<S, A> {
        &mut self.registry
    }

    /// The navigation history
    #[must_use]
    pub fn history(&self) -> &History<S> {
        &self.history
    }

    /// Id of the current page
    #[must_use]
    pub fn current(&self) -> Option<&PageId> {
        self.current.as_ref()
    }

    /// The current page
    #[must_use]
    pub fn current_page(&self) -> Option<Arc<dyn Page<S, A>>> {
        self.current.as_ref().and_then(|id| self.registry.get(id))
    }

    /// Enter the first page
    ///
    /// Skips `can_navigate_to` since there is no page to leave.
    ///
    /// # Errors
    ///
    /// `PageNotFound` or an `on_enter` hook failure.
    pub async fn start(&mut self, initial: &PageId, state: &S) -> Result<(), NavigationError> {
        if !self.registry.contains(initial) {
            return Err(NavigationError::PageNotFound(initial.clone()));
        }
        self.transition(initial, state, state, true).await
    }

    /// Move to `target`
    ///
    /// # Errors
    ///
    /// See the module docs; on error nothing changes.
    pub async fn navigate_to(&mut self, target: &PageId, state: &S) -> Result<(), NavigationError> {
        if !self.registry.contains(target) {
            tracing::warn!(page_id = %target, "Navigation to unknown page");
            return Err(NavigationError::PageNotFound(target.clone()));
        }

        if let Some(from) = &self.current {
            if let Some(page) = self.registry.get(from) {
                if !page.can_navigate_to(target, state) {
                    tracing::info!(from = %from, to = %target, "Navigation denied");
                    return Err(NavigationError::Denied {
                        from: from.clone(),
                        to: target.clone(),
                    });
                }
            }
        }

        self.transition(target, state, state, true).await
    }

    /// The next non-skippable page after the current one, in registry order
    ///
    /// `Ok(None)` means the current page is the last reachable one.
    pub fn next_page(&self, state: &S) -> Result<Option<PageId>, NavigationError> {
        let current = self.current.as_ref().ok_or(NavigationError::NotStarted)?;
        Ok(self.registry.next_after(current, state))
    }

    /// The previous non-skippable page before the current one
    ///
    /// # Errors
    ///
    /// `NoPreviousPage` on the first reachable page.
    pub fn prev_page(&self, state: &S) -> Result<PageId, NavigationError> {
        let current = self.current.as_ref().ok_or(NavigationError::NotStarted)?;
        self.registry
            .prev_before(current, state)
            .ok_or_else(|| NavigationError::NoPreviousPage(current.clone()))
    }

    /// Whether `go_back` would succeed
    #[must_use]
    pub fn can_go_back(&self) -> bool {
        self.history.can_go_back()
    }

    /// Whether `go_forward` would succeed
    #[must_use]
    pub fn can_go_forward(&self) -> bool {
        self.history.can_go_forward()
    }

    /// Return to the previous history entry
    ///
    /// `can_navigate_to` is not consulted; the hooks run as usual. Returns
    /// the entry's state snapshot for the caller to restore.
    ///
    /// # Errors
    ///
    /// `HistoryStart` at the oldest entry.
    pub async fn go_back(&mut self, state: &S) -> Result<S, NavigationError> {
        self.travel(Direction::Back, state).await
    }

    /// Redo a `go_back`
    ///
    /// # Errors
    ///
    /// `HistoryEnd` at the newest entry.
    pub async fn go_forward(&mut self, state: &S) -> Result<S, NavigationError> {
        self.travel(Direction::Forward, state).await
    }

    async fn travel(&mut self, direction: Direction, state: &S) -> Result<S, NavigationError> {
        let entry: HistoryEntry<S> = match direction {
            Direction::Back => self
                .history
                .peek_back()
                .cloned()
                .ok_or(NavigationError::HistoryStart)?,
            Direction::Forward => self
                .history
                .peek_forward()
                .cloned()
                .ok_or(NavigationError::HistoryEnd)?,
        };

        if !self.registry.contains(&entry.page_id) {
            return Err(NavigationError::PageNotFound(entry.page_id));
        }

        self.transition(&entry.page_id, state, &entry.state_snapshot, false)
            .await?;
        match direction {
            Direction::Back => self.history.back(),
            Direction::Forward => self.history.forward(),
        };
        tracing::debug!(page_id = %entry.page_id, ?direction, "History move");
        Ok(entry.state_snapshot)
    }

    async fn transition(
        &mut self,
        target: &PageId,
        exit_state: &S,
        enter_state: &S,
        record: bool,
    ) -> Result<(), NavigationError> {
        let incoming = self
            .registry
            .get(target)
            .ok_or_else(|| NavigationError::PageNotFound(target.clone()))?;

        if let Some(outgoing) = self.current_page() {
            let from = outgoing.id();
            outgoing
                .on_exit(exit_state)
                .await
                .map_err(|e| NavigationError::Hook {
                    page: from,
                    hook: "on_exit",
                    message: e.to_string(),
                })?;
        }

        incoming
            .on_enter(enter_state)
            .await
            .map_err(|e| NavigationError::Hook {
                page: target.clone(),
                hook: "on_enter",
                message: e.to_string(),
            })?;

        if record {
            if let Some(evicted) = self
                .history
                .record(target.clone(), enter_state.clone(), None)
            {
                tracing::trace!(page_id = %evicted.page_id, "History entry evicted");
            }
        }

        let from = self.current.replace(target.clone());
        tracing::info!(
            from = from.as_ref().map(PageId::as_str).unwrap_or("-"),
            to = %target,
            "Navigated"
        );

        if let Some(from) = &from {
            self.bus.emit(FrameworkEvent::PageExit {
                page_id: from.clone(),
            });
        }
        self.bus.emit(FrameworkEvent::NavigationChange {
            from: from.clone(),
            to: target.clone(),
        });
        self.bus.emit(FrameworkEvent::PageEnter {
            page_id: target.clone(),
        });
        self.bus.debug(
            format!("navigated to {target}"),
            Some(serde_json::json!({
                "from": from.as_ref().map(PageId::as_str),
                "to": target.as_str(),
                "history": self.history.len(),
            })),
        );
        Ok(())
    }
}

impl<S: State, A: Action> fmt::Debug for NavigationEngine<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationEngine")
            .field("current", &self.current)
            .field("pages", &self.registry.ids())
            .field("history", &self.history.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cli::InteractiveCli;
    use crate::contrib::Contributor;
    use crate::events::EventKind;
    use crate::page::testing::page;
    use crate::page::PageAction;
    use crate::store::testing::Counter;

    type Log = Arc<Mutex<Vec<String>>>;

    struct HookPage {
        id: &'static str,
        log: Log,
        deny: Option<&'static str>,
        fail_enter: bool,
    }

    #[async_trait]
    impl Page<u32, Counter> for HookPage {
        fn id(&self) -> PageId {
            PageId::new(self.id)
        }

        fn title(&self) -> &str {
            "Hooked"
        }

        async fn render(&self, _cli: &InteractiveCli, _state: &u32) -> anyhow::Result<()> {
            Ok(())
        }

        fn next_action(&self, _state: &u32) -> PageAction<Counter> {
            PageAction::ReRender
        }

        fn can_navigate_to(&self, target: &PageId, _state: &u32) -> bool {
            self.deny != Some(target.as_str())
        }

        async fn on_enter(&self, state: &u32) -> anyhow::Result<()> {
            if self.fail_enter {
                anyhow::bail!("refusing entry");
            }
            self.log.lock().push(format!("enter {} @{state}", self.id));
            Ok(())
        }

        async fn on_exit(&self, state: &u32) -> anyhow::Result<()> {
            self.log.lock().push(format!("exit {} @{state}", self.id));
            Ok(())
        }
    }

    fn hook_page(id: &'static str, log: &Log) -> HookPage {
        HookPage {
            id,
            log: log.clone(),
            deny: None,
            fail_enter: false,
        }
    }

    fn engine(pages: Vec<HookPage>, history: History<u32>) -> NavigationEngine<u32, Counter> {
        let mut registry = PageRegistry::new();
        for p in pages {
            registry.register(Arc::new(p), Contributor::Builder).unwrap();
        }
        NavigationEngine::new(registry, history, Arc::new(EventBus::new(false)))
    }

    #[tokio::test]
    async fn test_hooks_run_in_order() {
        let log = Log::default();
        let mut nav = engine(vec![hook_page("a", &log), hook_page("b", &log)], History::new(10));

        nav.start(&"a".into(), &0).await.unwrap();
        nav.navigate_to(&"b".into(), &1).await.unwrap();

        assert_eq!(nav.current(), Some(&PageId::new("b")));
        assert_eq!(*log.lock(), vec!["enter a @0", "exit a @1", "enter b @1"]);
        assert_eq!(nav.history().len(), 2);
    }

    #[tokio::test]
    async fn test_events_emitted_in_order() {
        let log = Log::default();
        let mut nav = engine(vec![hook_page("a", &log), hook_page("b", &log)], History::new(10));
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        nav.bus.on_any(move |ev| e.lock().push(ev.kind()));

        nav.start(&"a".into(), &0).await.unwrap();
        events.lock().clear();
        nav.navigate_to(&"b".into(), &0).await.unwrap();

        assert_eq!(
            *events.lock(),
            vec![EventKind::PageExit, EventKind::NavigationChange, EventKind::PageEnter]
        );
    }

    #[tokio::test]
    async fn test_unknown_target_changes_nothing() {
        let log = Log::default();
        let mut nav = engine(vec![hook_page("a", &log)], History::new(10));
        nav.start(&"a".into(), &0).await.unwrap();

        let err = nav.navigate_to(&"missing".into(), &0).await.unwrap_err();
        assert_eq!(err, NavigationError::PageNotFound("missing".into()));
        assert_eq!(nav.current(), Some(&PageId::new("a")));
        assert_eq!(nav.history().len(), 1);
        assert_eq!(*log.lock(), vec!["enter a @0"]);
    }

    #[tokio::test]
    async fn test_denied_navigation_changes_nothing() {
        let log = Log::default();
        let mut a = hook_page("a", &log);
        a.deny = Some("b");
        let mut nav = engine(vec![a, hook_page("b", &log)], History::new(10));
        nav.start(&"a".into(), &0).await.unwrap();

        let err = nav.navigate_to(&"b".into(), &0).await.unwrap_err();
        assert!(matches!(err, NavigationError::Denied { .. }));
        assert_eq!(nav.current(), Some(&PageId::new("a")));
        assert_eq!(nav.history().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_enter_hook_records_nothing() {
        let log = Log::default();
        let mut b = hook_page("b", &log);
        b.fail_enter = true;
        let mut nav = engine(vec![hook_page("a", &log), b], History::new(10));
        nav.start(&"a".into(), &0).await.unwrap();

        let err = nav.navigate_to(&"b".into(), &0).await.unwrap_err();
        assert!(matches!(err, NavigationError::Hook { hook: "on_enter", .. }));
        assert_eq!(nav.current(), Some(&PageId::new("a")));
        assert_eq!(nav.history().len(), 1);
    }

    #[tokio::test]
    async fn test_go_back_returns_snapshot() {
        let log = Log::default();
        let mut nav = engine(vec![hook_page("a", &log), hook_page("b", &log)], History::new(10));
        nav.start(&"a".into(), &7).await.unwrap();
        nav.navigate_to(&"b".into(), &9).await.unwrap();

        let snapshot = nav.go_back(&9).await.unwrap();
        assert_eq!(snapshot, 7);
        assert_eq!(nav.current(), Some(&PageId::new("a")));
        assert!(nav.can_go_forward());
        assert_eq!(nav.go_back(&7).await.unwrap_err(), NavigationError::HistoryStart);

        let snapshot = nav.go_forward(&7).await.unwrap();
        assert_eq!(snapshot, 9);
        assert_eq!(nav.current(), Some(&PageId::new("b")));
        assert_eq!(nav.go_forward(&9).await.unwrap_err(), NavigationError::HistoryEnd);
        assert_eq!(nav.history().len(), 2);
    }

    #[tokio::test]
    async fn test_history_bound() {
        let log = Log::default();
        let mut nav = engine(vec![hook_page("a", &log), hook_page("b", &log)], History::new(3));
        nav.start(&"a".into(), &0).await.unwrap();
        for i in 1..=5u32 {
            let target = if i % 2 == 0 { "a" } else { "b" };
            nav.navigate_to(&target.into(), &i).await.unwrap();
        }
        let snapshots: Vec<u32> = nav.history().entries().map(|e| e.state_snapshot).collect();
        assert_eq!(snapshots, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_next_and_prev_page() {
        let mut registry = PageRegistry::<u32, Counter>::new();
        for id in ["a", "b", "c"] {
            registry.register(page(id), Contributor::Builder).unwrap();
        }
        let mut nav = NavigationEngine::new(registry, History::new(5), Arc::new(EventBus::new(false)));
        assert_eq!(nav.next_page(&0).unwrap_err(), NavigationError::NotStarted);

        nav.start(&"a".into(), &0).await.unwrap();
        assert_eq!(nav.next_page(&0).unwrap(), Some(PageId::new("b")));
        assert_eq!(
            nav.prev_page(&0).unwrap_err(),
            NavigationError::NoPreviousPage("a".into())
        );
    }
}
