//! Framework Builder
//!
//! Fluent, consuming configuration for a [`Framework`]. `build()` checks
//! everything before touching the terminal:
//!
//! 1. an initial state was given
//! 2. at least one page exists (builder or plugin contributed)
//! 3. the options validate
//! 4. page ids are unique and well formed
//! 5. plugins install cleanly
//! 6. the initial page, if configured, is registered
//!
//! Builders are `Clone`; cloning and then extending a builder never affects
//! the original.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::cli::InteractiveCli;
use crate::config::FrameworkOptions;
use crate::contrib::{ContributionMap, Contributor};
use crate::error::ConfigurationError;
use crate::events::EventBus;
use crate::framework::{Framework, FrameworkInner};
use crate::history::History;
use crate::navigation::NavigationEngine;
use crate::page::{Page, PageId};
use crate::plugin::{Plugin, PluginManager};
use crate::registry::PageRegistry;
use crate::render::{RenderMode, Renderer};
use crate::store::{Action, Middleware, Reducer, State, StateStore, Subscriber};
use crate::terminal::{MemoryTerminal, TerminalBackend};

/// Collects pages, state handling and options for a [`Framework`]
pub struct FrameworkBuilder<S: State, A: Action> {
    initial_state: Option<S>,
    pages: Vec<Arc<dyn Page<S, A>>>,
    reducers: Vec<(String, Reducer<S, A>)>,
    middleware: Vec<Arc<dyn Middleware<S, A>>>,
    renderers: Vec<(String, Arc<dyn Renderer<S>>)>,
    plugins: Vec<Arc<dyn Plugin<S, A>>>,
    subscribers: Vec<Subscriber<S>>,
    options: FrameworkOptions,
    terminal: Option<Arc<dyn TerminalBackend>>,
}

impl<S: State, A: Action> Default for FrameworkBuilder<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State, A: Action> Clone for FrameworkBuilder<S, A> {
    fn clone(&self) -> Self {
        Self {
            initial_state: self.initial_state.clone(),
            pages: self.pages.clone(),
            reducers: self.reducers.clone(),
            middleware: self.middleware.clone(),
            renderers: self.renderers.clone(),
            plugins: self.plugins.clone(),
            subscribers: self.subscribers.clone(),
            options: self.options.clone(),
            terminal: self.terminal.clone(),
        }
    }
}

impl<S: State, A: Action> std::fmt::Debug for FrameworkBuilder<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameworkBuilder")
            .field("has_initial_state", &self.initial_state.is_some())
            .field(
                "pages",
                &self.pages.iter().map(|p| p.id()).collect::<Vec<_>>(),
            )
            .field(
                "reducers",
                &self.reducers.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("middleware", &self.middleware.len())
            .field("plugins", &self.plugins.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S: State, A: Action> FrameworkBuilder<S, A> {
    /// An empty builder with default options
    #[must_use]
    pub fn new() -> Self {
        Self {
            initial_state: None,
            pages: Vec::new(),
            reducers: Vec::new(),
            middleware: Vec::new(),
            renderers: Vec::new(),
            plugins: Vec::new(),
            subscribers: Vec::new(),
            options: FrameworkOptions::default(),
            terminal: None,
        }
    }

    /// Set the initial state (required)
    #[must_use]
    pub fn initial_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add a page; registration order is navigation order
    #[must_use]
    pub fn page(mut self, page: impl Page<S, A> + 'static) -> Self {
        self.pages.push(Arc::new(page));
        self
    }

    /// Add already shared pages
    #[must_use]
    pub fn pages(mut self, pages: impl IntoIterator<Item = Arc<dyn Page<S, A>>>) -> Self {
        self.pages.extend(pages);
        self
    }

    /// Add a named reducer; a later reducer with the same name replaces it
    #[must_use]
    pub fn reducer(mut self, name: impl Into<String>, reducer: Reducer<S, A>) -> Self {
        self.reducers.push((name.into(), reducer));
        self
    }

    /// Append middleware; the first added runs outermost
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware<S, A>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Add a named renderer
    #[must_use]
    pub fn renderer(mut self, name: impl Into<String>, renderer: Arc<dyn Renderer<S>>) -> Self {
        self.renderers.push((name.into(), renderer));
        self
    }

    /// Install a plugin during `build`
    #[must_use]
    pub fn plugin(mut self, plugin: impl Plugin<S, A> + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Subscribe to state changes from the start
    #[must_use]
    pub fn subscribe<F>(mut self, f: F) -> Self
    where
        F: Fn(&S, &S) + Send + Sync + 'static,
    {
        self.subscribers.push(Arc::new(f));
        self
    }

    /// Replace the options wholesale
    #[must_use]
    pub fn options(mut self, options: FrameworkOptions) -> Self {
        self.options = options;
        self
    }

    /// Adjust the options in place
    #[must_use]
    pub fn configure(mut self, f: impl FnOnce(&mut FrameworkOptions)) -> Self {
        f(&mut self.options);
        self
    }

    /// Toggle debug events
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.options.debug = enabled;
        self
    }

    /// Configure navigation history
    #[must_use]
    pub fn history(mut self, enabled: bool, max_size: usize) -> Self {
        self.options.enable_history = enabled;
        self.options.max_history_size = max_size;
        self
    }

    /// Set the render mode
    #[must_use]
    pub fn render_mode(mut self, mode: RenderMode) -> Self {
        self.options.render_mode = mode;
        self
    }

    /// Start on this page instead of the first registered one
    #[must_use]
    pub fn initial_page(mut self, id: impl Into<PageId>) -> Self {
        self.options.initial_page = Some(id.into());
        self
    }

    /// Use this terminal instead of the headless default
    #[must_use]
    pub fn terminal(mut self, terminal: Arc<dyn TerminalBackend>) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Validate the configuration and assemble the framework
    ///
    /// # Errors
    ///
    /// See [`ConfigurationError`]. No terminal I/O has happened when this
    /// fails.
    pub async fn build(self) -> Result<Framework<S, A>, ConfigurationError> {
        let initial = self
            .initial_state
            .ok_or(ConfigurationError::MissingInitialState)?;

        let plugin_pages = self.plugins.iter().any(|p| !p.pages().is_empty());
        if self.pages.is_empty() && !plugin_pages {
            return Err(ConfigurationError::NoPages);
        }

        self.options
            .validate()
            .map_err(|e| ConfigurationError::InvalidOptions(e.to_string()))?;

        let mut registry = PageRegistry::new();
        for page in self.pages {
            registry.register(page, Contributor::Builder)?;
        }

        let bus = Arc::new(EventBus::new(self.options.debug));
        let store = StateStore::new(initial, bus.clone());
        for (name, reducer) in self.reducers {
            store.add_reducer(name, reducer, Contributor::Builder);
        }
        for middleware in self.middleware {
            store.add_middleware(middleware, Contributor::Builder);
        }
        for subscriber in self.subscribers {
            store.subscribe(move |next, prev| subscriber(next, prev));
        }

        let mut renderers = ContributionMap::default();
        for (name, renderer) in self.renderers {
            renderers.insert(name, renderer, Contributor::Builder);
        }

        let history = if self.options.enable_history {
            History::new(self.options.max_history_size)
        } else {
            History::disabled()
        };
        let terminal = self
            .terminal
            .unwrap_or_else(|| Arc::new(MemoryTerminal::new()));
        let (render_tx, _) = watch::channel(0u64);
        let (stop_tx, _) = watch::channel(false);

        tracing::debug!(
            pages = registry.len(),
            plugins = self.plugins.len(),
            history = self.options.enable_history,
            "Building framework"
        );

        let framework = Framework::from_inner(FrameworkInner {
            cli: InteractiveCli::new(terminal),
            navigation: tokio::sync::Mutex::new(NavigationEngine::new(
                registry,
                history,
                bus.clone(),
            )),
            store,
            bus,
            plugins: Mutex::new(PluginManager::new()),
            renderers: RwLock::new(renderers),
            render_tx: Arc::new(render_tx),
            stop_tx,
            running: AtomicBool::new(false),
            notices: Mutex::new(Vec::new()),
            options: self.options,
        });

        for plugin in self.plugins {
            framework.use_plugin(plugin).await?;
        }

        if let Some(initial_page) = &framework.options().initial_page {
            if !framework.page_ids().await.contains(initial_page) {
                return Err(ConfigurationError::UnknownInitialPage(initial_page.clone()));
            }
        }

        Ok(framework)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::testing::{page, StaticPage};
    use crate::page::PageAction;
    use crate::store::reducer;
    use crate::store::testing::Counter;

    fn base() -> FrameworkBuilder<u32, Counter> {
        FrameworkBuilder::new()
            .initial_state(0)
            .reducer(
                "count",
                reducer(|s: &u32, a: &Counter| match a {
                    Counter::Add(n) => s + n,
                    _ => *s,
                }),
            )
            .page(StaticPage::new("a", PageAction::NextPage))
    }

    #[tokio::test]
    async fn test_missing_initial_state() {
        let result = FrameworkBuilder::<u32, Counter>::new()
            .page(StaticPage::new("a", PageAction::Exit))
            .build()
            .await;
        assert!(matches!(result, Err(ConfigurationError::MissingInitialState)));
    }

    #[tokio::test]
    async fn test_no_pages() {
        let result = FrameworkBuilder::<u32, Counter>::new()
            .initial_state(0)
            .build()
            .await;
        assert!(matches!(result, Err(ConfigurationError::NoPages)));
    }

    #[tokio::test]
    async fn test_duplicate_page_rejected() {
        let result = base()
            .pages([page::<u32, Counter>("b"), page::<u32, Counter>("a")])
            .build()
            .await;
        match result {
            Err(ConfigurationError::DuplicatePage(id)) => assert_eq!(id.as_str(), "a"),
            other => panic!("expected DuplicatePage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let result = base().history(true, 0).build().await;
        assert!(matches!(result, Err(ConfigurationError::InvalidOptions(_))));
    }

    #[tokio::test]
    async fn test_unknown_initial_page() {
        let result = base().initial_page("nowhere").build().await;
        assert!(matches!(
            result,
            Err(ConfigurationError::UnknownInitialPage(_))
        ));
    }

    #[tokio::test]
    async fn test_clone_is_independent() {
        let original = base();
        let extended = original.clone().page(StaticPage::new("b", PageAction::Exit));

        let small = original.build().await.unwrap();
        let large = extended.build().await.unwrap();
        assert_eq!(small.page_ids().await.len(), 1);
        assert_eq!(large.page_ids().await.len(), 2);
    }

    #[tokio::test]
    async fn test_build_does_no_terminal_io() {
        let terminal = Arc::new(MemoryTerminal::new());
        let framework = base().terminal(terminal.clone()).build().await.unwrap();
        assert!(terminal.ops().is_empty());
        assert_eq!(framework.state(), 0);
        framework.dispatch(Counter::Add(2)).unwrap();
        assert_eq!(framework.state(), 2);
    }
}
