//! Framework
//!
//! [`Framework`] ties the pieces together and drives the page loop:
//!
//! ```text
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │ run()                                                        │
//!  │   raw mode on, key router installed                          │
//!  │   ┌──────────┐   ┌─────────┐  RE_RENDER  ┌──────────────┐    │
//!  │   │  render  │──▶│  next   │────────────▶│ wait key,    │    │
//!  │   │  page    │   │ action  │             │ handle_key + │    │
//!  │   └──────────┘   └────┬────┘◀────────────│ dispatch     │    │
//!  │        ▲              │                  └──────────────┘    │
//!  │        └── NEXT / PREV / CHANGE                              │
//!  │                       EXIT ──▶ resolve(state)                │
//!  │   raw mode off, key router removed                           │
//!  └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! A page's `next_action` is asked as soon as it has rendered, so a page
//! that collects its input while rendering moves on without a key press.
//! Only `RE_RENDER` hands control to the key loop. When an action cannot
//! be carried out (failed validation, refused navigation) or is `CUSTOM`,
//! the page is redrawn and the loop waits for a key before asking again.
//!
//! The handle is cheap to clone; clones share one instance. `stop()` ends a
//! running loop from anywhere (a signal handler, another task, an exit
//! hotkey), and `cleanup()` additionally releases the terminal session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};

use crate::builder::FrameworkBuilder;
use crate::cli::{CleanupReport, InteractiveCli};
use crate::config::FrameworkOptions;
use crate::contrib::ContributionMap;
use crate::error::{FrameworkError, NavigationError, PluginError};
use crate::events::{ErrorEvent, ErrorSource, EventBus, FrameworkEvent};
use crate::history::HistoryEntry;
use crate::key::Key;
use crate::navigation::NavigationEngine;
use crate::page::{Page, PageAction, PageId, PageInfo};
use crate::plugin::{Plugin, PluginInfo, PluginManager, PluginTargets};
use crate::render::{render_help, DefaultHeader, RenderScheduler, Renderer, HEADER_RENDERER};
use crate::store::{Action, State, StateStore};

/// What the loop does after a key was handled
enum Flow {
    /// Redraw and ask the page again
    Render,
    /// Redraw, then wait for a key before asking again
    Wait,
    Help,
    Exit,
}

pub(crate) struct FrameworkInner<S: State, A: Action> {
    pub(crate) options: FrameworkOptions,
    pub(crate) cli: InteractiveCli,
    pub(crate) store: StateStore<S, A>,
    pub(crate) bus: Arc<EventBus<S>>,
    pub(crate) navigation: tokio::sync::Mutex<NavigationEngine<S, A>>,
    pub(crate) plugins: Mutex<PluginManager<S, A>>,
    pub(crate) renderers: RwLock<ContributionMap<Arc<dyn Renderer<S>>>>,
    pub(crate) render_tx: Arc<watch::Sender<u64>>,
    pub(crate) stop_tx: watch::Sender<bool>,
    pub(crate) running: AtomicBool,
    pub(crate) notices: Mutex<Vec<String>>,
}

/// A configured framework instance
pub struct Framework<S: State, A: Action> {
    inner: Arc<FrameworkInner<S, A>>,
}

impl<S: State, A: Action> Clone for Framework<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: State, A: Action> std::fmt::Debug for Framework<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Framework")
            .field("running", &self.is_running())
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

/// Clears the running flag and releases the terminal however `run` ends
struct SessionGuard<'a, S: State, A: Action> {
    inner: &'a FrameworkInner<S, A>,
}

impl<S: State, A: Action> Drop for SessionGuard<'_, S, A> {
    fn drop(&mut self) {
        self.inner.cli.disable_raw_mode();
        if let Err(e) = self.inner.cli.show_cursor() {
            tracing::warn!(error = %e, "Failed to restore cursor");
        }
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

impl<S: State, A: Action> Framework<S, A> {
    /// Start configuring a framework
    #[must_use]
    pub fn builder() -> FrameworkBuilder<S, A> {
        FrameworkBuilder::new()
    }

    pub(crate) fn from_inner(inner: FrameworkInner<S, A>) -> Self {
        let framework = Self {
            inner: Arc::new(inner),
        };
        let render_tx = framework.inner.render_tx.clone();
        framework
            .inner
            .store
            .subscribe(move |_, _| render_tx.send_modify(|v| *v += 1));
        framework
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The terminal session
    #[must_use]
    pub fn cli(&self) -> &InteractiveCli {
        &self.inner.cli
    }

    /// The state store
    #[must_use]
    pub fn store(&self) -> &StateStore<S, A> {
        &self.inner.store
    }

    /// The event bus
    #[must_use]
    pub fn events(&self) -> &EventBus<S> {
        &self.inner.bus
    }

    /// Options the framework was built with
    #[must_use]
    pub fn options(&self) -> &FrameworkOptions {
        &self.inner.options
    }

    /// Clone of the current state
    #[must_use]
    pub fn state(&self) -> S {
        self.inner.store.state()
    }

    /// Whether `run` is in progress
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Id of the current page
    pub async fn current_page(&self) -> Option<PageId> {
        self.inner.navigation.lock().await.current().cloned()
    }

    /// Registered page ids in order
    pub async fn page_ids(&self) -> Vec<PageId> {
        self.inner.navigation.lock().await.registry().ids()
    }

    /// History entries, oldest first
    pub async fn history(&self) -> Vec<HistoryEntry<S>> {
        self.inner
            .navigation
            .lock()
            .await
            .history()
            .entries()
            .cloned()
            .collect()
    }

    /// A renderer by name
    #[must_use]
    pub fn renderer(&self, name: &str) -> Option<Arc<dyn Renderer<S>>> {
        self.inner.renderers.read().get(name).cloned()
    }

    /// Installed plugins in installation order
    #[must_use]
    pub fn plugins(&self) -> Vec<PluginInfo> {
        self.inner.plugins.lock().installed()
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Dispatch an action into the store
    ///
    /// # Errors
    ///
    /// See [`StateStore::dispatch`].
    pub fn dispatch(&self, action: A) -> Result<(), crate::error::DispatchError> {
        self.inner.store.dispatch(action)
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Navigate to a page
    ///
    /// # Errors
    ///
    /// On error the current page and history are unchanged.
    pub async fn navigate_to(&self, target: &PageId) -> Result<(), NavigationError> {
        let state = self.inner.store.state();
        self.inner
            .navigation
            .lock()
            .await
            .navigate_to(target, &state)
            .await?;
        self.request_render();
        Ok(())
    }

    /// Whether there is an older history entry
    pub async fn can_go_back(&self) -> bool {
        self.inner.navigation.lock().await.can_go_back()
    }

    /// Whether there is a newer history entry
    pub async fn can_go_forward(&self) -> bool {
        self.inner.navigation.lock().await.can_go_forward()
    }

    /// Return to the previous history entry and restore its state snapshot
    ///
    /// # Errors
    ///
    /// [`NavigationError::HistoryStart`] at the oldest entry.
    pub async fn go_back(&self) -> Result<(), NavigationError> {
        let state = self.inner.store.state();
        let snapshot = self.inner.navigation.lock().await.go_back(&state).await?;
        self.inner.store.replace_state(snapshot);
        Ok(())
    }

    /// Redo a `go_back` and restore that entry's state snapshot
    ///
    /// # Errors
    ///
    /// [`NavigationError::HistoryEnd`] at the newest entry.
    pub async fn go_forward(&self) -> Result<(), NavigationError> {
        let state = self.inner.store.state();
        let snapshot = self
            .inner
            .navigation
            .lock()
            .await
            .go_forward(&state)
            .await?;
        self.inner.store.replace_state(snapshot);
        Ok(())
    }

    fn request_render(&self) {
        self.inner.render_tx.send_modify(|v| *v += 1);
    }

    // ========================================================================
    // Plugins
    // ========================================================================

    /// Install a plugin
    ///
    /// # Errors
    ///
    /// Conflicts and failed capability checks leave everything untouched;
    /// an `on_install` failure is rolled back and reported as
    /// [`PluginError::InstallHook`].
    pub async fn use_plugin(&self, plugin: Arc<dyn Plugin<S, A>>) -> Result<PluginInfo, PluginError> {
        let name = plugin.name().to_string();
        {
            let mut nav = self.inner.navigation.lock().await;
            let mut renderers = self.inner.renderers.write();
            self.inner
                .plugins
                .lock()
                .install(
                    plugin.clone(),
                    PluginTargets {
                        registry: nav.registry_mut(),
                        store: &self.inner.store,
                        renderers: &mut renderers,
                    },
                )
                .inspect_err(|e| self.report(ErrorSource::Plugin, e, None))?;
        }

        if let Err(source) = plugin.on_install(self).await {
            let mut nav = self.inner.navigation.lock().await;
            let mut renderers = self.inner.renderers.write();
            self.inner.plugins.lock().rollback(
                &name,
                PluginTargets {
                    registry: nav.registry_mut(),
                    store: &self.inner.store,
                    renderers: &mut renderers,
                },
            );
            let err = PluginError::InstallHook {
                plugin: name,
                source,
            };
            self.report(ErrorSource::Plugin, &err, None);
            return Err(err);
        }

        let info = self
            .inner
            .plugins
            .lock()
            .installed()
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| PluginError::NotInstalled(name.clone()))?;
        self.inner.bus.debug(
            format!("plugin {name} installed"),
            serde_json::to_value(&info).ok(),
        );
        Ok(info)
    }

    /// Uninstall a plugin and remove its contributions
    ///
    /// # Errors
    ///
    /// [`PluginError::NotInstalled`], or [`PluginError::PageInUse`] while one
    /// of its pages is current.
    pub async fn unuse_plugin(&self, name: &str) -> Result<(), PluginError> {
        let plugin = {
            let mut nav = self.inner.navigation.lock().await;
            let current = nav.current().cloned();
            let mut renderers = self.inner.renderers.write();
            self.inner.plugins.lock().uninstall(
                name,
                PluginTargets {
                    registry: nav.registry_mut(),
                    store: &self.inner.store,
                    renderers: &mut renderers,
                },
                current.as_ref(),
            )?
        };

        if let Err(e) = plugin.on_uninstall(self).await {
            tracing::warn!(plugin = %name, error = %e, "Plugin uninstall hook failed");
            self.report(ErrorSource::Plugin, &e, None);
        }
        self.inner.bus.debug(format!("plugin {name} uninstalled"), None);
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Ask a running loop to finish; `run` resolves with the current state
    pub fn stop(&self) {
        if self.inner.stop_tx.send_replace(true) {
            return;
        }
        tracing::info!("Stop requested");
    }

    /// Stop the loop and release every terminal resource
    ///
    /// Idempotent. Pending controlled futures are rejected with
    /// `CliError::Cancelled`.
    pub fn cleanup(&self) -> CleanupReport {
        self.stop();
        self.inner.cli.cleanup()
    }

    /// Write the help overlay for the current page
    ///
    /// # Errors
    ///
    /// Terminal write failures.
    pub async fn show_help(&self) -> Result<(), FrameworkError> {
        let (pages, current) = {
            let nav = self.inner.navigation.lock().await;
            (nav.registry().infos(), nav.current().cloned())
        };
        let options = &self.inner.options;
        render_help(
            &self.inner.cli,
            &pages,
            current.as_ref().map(PageId::as_str),
            &options.exit_keys,
            options.help_key.as_ref(),
        )?;
        Ok(())
    }

    /// Drive the page loop until `EXIT`, an exit hotkey or `stop()`
    ///
    /// Raw mode is held for the duration of the call and released on every
    /// exit path. Resolves with the final state.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::AlreadyRunning`], raw mode held by another session,
    /// render failures, a failing first page, and dispatch errors when
    /// `strict_dispatch` is set.
    pub async fn run(&self) -> Result<S, FrameworkError> {
        let inner = &*self.inner;
        if inner.running.swap(true, Ordering::SeqCst) {
            return Err(FrameworkError::AlreadyRunning);
        }
        let _session = SessionGuard { inner };
        inner.stop_tx.send_replace(false);

        tracing::info!("Framework starting");
        let result = self.run_loop().await;
        match &result {
            Ok(_) => tracing::info!("Framework stopped"),
            Err(e) => tracing::error!(error = %e, "Framework stopped with error"),
        }
        result
    }

    async fn run_loop(&self) -> Result<S, FrameworkError> {
        let inner = &*self.inner;
        inner.cli.enable_raw_mode()?;
        inner.cli.hide_cursor()?;

        let (key_tx, mut key_rx) = mpsc::unbounded_channel::<Key>();
        let accepting = Arc::new(AtomicBool::new(false));
        let _router = {
            let weak: Weak<FrameworkInner<S, A>> = Arc::downgrade(&self.inner);
            let accepting = accepting.clone();
            inner.cli.scoped_listener(move |key| {
                let Some(inner) = weak.upgrade() else {
                    return Ok(());
                };
                if inner.options.is_exit_key(key) {
                    tracing::info!(key = %key, "Exit hotkey pressed");
                    inner.stop_tx.send_replace(true);
                } else if accepting.load(Ordering::SeqCst) {
                    key_tx
                        .send(*key)
                        .map_err(|_| anyhow::anyhow!("page loop is not receiving keys"))?;
                }
                Ok(())
            })
        };

        let mut stop_rx = inner.stop_tx.subscribe();
        let mut render_rx = inner.render_tx.subscribe();
        let mut scheduler =
            RenderScheduler::new(inner.options.render_mode, inner.options.render_delay);

        self.enter_initial_page().await?;

        let mut shown: Option<PageId> = None;
        let mut evaluate = true;
        'run: loop {
            if *stop_rx.borrow_and_update() {
                break 'run;
            }

            // ---- render ----
            accepting.store(false, Ordering::SeqCst);
            scheduler.wait(&mut render_rx).await;
            render_rx.borrow_and_update();
            let page = self.current_page_handle().await?;
            if shown.as_ref() != Some(&page.id()) {
                // keys pressed during the transition belong to the old page
                while key_rx.try_recv().is_ok() {}
                shown = Some(page.id());
            }
            tokio::select! {
                biased;
                _ = stop_rx.changed() => break 'run,
                rendered = self.render_page(page.as_ref()) => rendered?,
            }
            scheduler.mark_rendered();
            accepting.store(true, Ordering::SeqCst);
            inner.bus.emit(FrameworkEvent::PageRender { page_id: page.id() });

            // ---- next action ----
            if std::mem::replace(&mut evaluate, true) {
                let state = inner.store.state();
                let next = page.next_action(&state);
                if !matches!(next, PageAction::ReRender) {
                    tracing::debug!(page_id = %page.id(), action = next.name(), "Page action");
                    match self.apply_page_action(page.as_ref(), next, &state).await? {
                        Flow::Exit => break 'run,
                        Flow::Wait => evaluate = false,
                        Flow::Render | Flow::Help => {}
                    }
                    continue 'run;
                }
            }

            // ---- input ----
            let mut help_open = false;
            loop {
                let key = tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break 'run,
                    key = key_rx.recv() => key,
                    Ok(()) = render_rx.changed() => continue 'run,
                };
                let Some(key) = key else {
                    break 'run;
                };

                if help_open {
                    continue 'run;
                }

                match self.handle_key(page.as_ref(), &key).await? {
                    Flow::Render => continue 'run,
                    Flow::Wait => {
                        evaluate = false;
                        continue 'run;
                    }
                    Flow::Exit => break 'run,
                    Flow::Help => {
                        self.show_help().await?;
                        help_open = true;
                    }
                }
            }
        }

        Ok(inner.store.state())
    }

    async fn enter_initial_page(&self) -> Result<(), FrameworkError> {
        let state = self.inner.store.state();
        let mut nav = self.inner.navigation.lock().await;
        if nav.current().is_some() {
            return Ok(());
        }
        let initial = self
            .inner
            .options
            .initial_page
            .clone()
            .or_else(|| nav.registry().first())
            .ok_or(NavigationError::NotStarted)?;
        nav.start(&initial, &state).await?;
        Ok(())
    }

    async fn current_page_handle(&self) -> Result<Arc<dyn Page<S, A>>, FrameworkError> {
        Ok(self
            .inner
            .navigation
            .lock()
            .await
            .current_page()
            .ok_or(NavigationError::NotStarted)?)
    }

    async fn render_page(&self, page: &dyn Page<S, A>) -> Result<(), FrameworkError> {
        let cli = &self.inner.cli;
        let state = self.inner.store.state();
        let info = PageInfo::of(page);

        cli.clear_screen()?;
        cli.move_to(0, 0)?;

        let header = self.renderer(HEADER_RENDERER);
        let drawn = match header {
            Some(renderer) => renderer.render(cli, &info, &state),
            None => DefaultHeader.render(cli, &info, &state),
        };
        drawn.map_err(|source| FrameworkError::Render {
            page: info.id.clone(),
            source,
        })?;

        page.render(cli, &state)
            .await
            .map_err(|source| FrameworkError::Render {
                page: info.id.clone(),
                source,
            })?;

        let notices = std::mem::take(&mut *self.inner.notices.lock());
        if !notices.is_empty() {
            cli.write_line("")?;
            for notice in notices {
                cli.write_line(&format!("! {notice}"))?;
            }
        }
        tracing::trace!(page_id = %info.id, "Page rendered");
        Ok(())
    }

    async fn handle_key(&self, page: &dyn Page<S, A>, key: &Key) -> Result<Flow, FrameworkError> {
        if self.inner.options.is_help_key(key) {
            return Ok(Flow::Help);
        }

        let state = self.inner.store.state();
        if let Some(action) = page.handle_key(key, &state) {
            self.dispatch_in_loop(action)?;
        }

        let state = self.inner.store.state();
        let next = page.next_action(&state);
        tracing::debug!(page_id = %page.id(), action = next.name(), "Page action");
        self.apply_page_action(page, next, &state).await
    }

    async fn apply_page_action(
        &self,
        page: &dyn Page<S, A>,
        action: PageAction<A>,
        state: &S,
    ) -> Result<Flow, FrameworkError> {
        match action {
            PageAction::NextPage => {
                let verdict = page.validate(state);
                if !verdict.is_valid {
                    let message = verdict
                        .into_result()
                        .err()
                        .unwrap_or_else(|| "validation failed".to_string());
                    self.report(ErrorSource::Validation, &message, Some(page.id()));
                    self.inner.notices.lock().push(message);
                    return Ok(Flow::Wait);
                }

                let next = self.inner.navigation.lock().await.next_page(state)?;
                match next {
                    Some(target) => self.navigate_in_loop(&target).await,
                    None => Ok(Flow::Exit),
                }
            }
            PageAction::PrevPage => {
                let prev = self.inner.navigation.lock().await.prev_page(state);
                match prev {
                    Ok(target) => self.navigate_in_loop(&target).await,
                    Err(e) => {
                        self.report(ErrorSource::Navigation, &e, Some(page.id()));
                        Ok(Flow::Wait)
                    }
                }
            }
            PageAction::ChangePage(target) => self.navigate_in_loop(&target).await,
            PageAction::ReRender => Ok(Flow::Render),
            PageAction::Exit => Ok(Flow::Exit),
            PageAction::Custom(action) => {
                self.dispatch_in_loop(action)?;
                Ok(Flow::Wait)
            }
        }
    }

    async fn navigate_in_loop(&self, target: &PageId) -> Result<Flow, FrameworkError> {
        if let Err(e) = self.navigate_to(target).await {
            let current = self.current_page().await;
            self.report(ErrorSource::Navigation, &e, current);
            self.inner.notices.lock().push(e.to_string());
            return Ok(Flow::Wait);
        }
        Ok(Flow::Render)
    }

    fn dispatch_in_loop(&self, action: A) -> Result<(), FrameworkError> {
        match self.inner.store.dispatch(action) {
            Ok(()) => Ok(()),
            Err(e) if self.inner.options.strict_dispatch => Err(e.into()),
            // already reported on the bus by the store
            Err(_) => Ok(()),
        }
    }

    fn report(&self, source: ErrorSource, error: &impl std::fmt::Display, page: Option<PageId>) {
        self.inner
            .bus
            .error(ErrorEvent::new(source, error).on_page(page));
    }
}
