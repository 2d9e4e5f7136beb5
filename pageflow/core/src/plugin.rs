//! Plugins
//!
//! A plugin bundles pages, reducers, middleware and renderers under a
//! unique name. Installation is all-or-nothing:
//!
//! 1. Capability checks - non-empty name and version, valid pages
//! 2. Conflict checks - plugin name and page ids must be unused
//! 3. Merge - pages appended, reducers shadow same-named ones, middleware
//!    appended to the chain, renderers shadow same-named ones
//! 4. `on_install` - on failure every contribution is rolled back
//!
//! Uninstalling removes exactly the plugin's own contributions, so anything
//! it shadowed becomes active again.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::contrib::{ContributionMap, Contributor};
use crate::error::{PluginError, RegistryError};
use crate::framework::Framework;
use crate::page::{Page, PageId};
use crate::registry::PageRegistry;
use crate::render::Renderer;
use crate::store::{Action, Middleware, Reducer, State, StateStore};

/// Extension bundle installed into a framework
#[async_trait]
pub trait Plugin<S: State, A: Action>: Send + Sync {
    /// Unique name
    fn name(&self) -> &str;

    /// Version string, reported by `PluginManager::installed`
    fn version(&self) -> &str;

    /// Pages to append to the registry
    fn pages(&self) -> Vec<Arc<dyn Page<S, A>>> {
        Vec::new()
    }

    /// Named reducers; a name already in use is shadowed until uninstall
    fn reducers(&self) -> Vec<(String, Reducer<S, A>)> {
        Vec::new()
    }

    /// Middleware appended to the chain in order
    fn middleware(&self) -> Vec<Arc<dyn Middleware<S, A>>> {
        Vec::new()
    }

    /// Named renderers
    fn renderers(&self) -> Vec<(String, Arc<dyn Renderer<S>>)> {
        Vec::new()
    }

    /// Called after the contributions are merged
    async fn on_install(&self, _framework: &Framework<S, A>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the contributions are removed
    async fn on_uninstall(&self, _framework: &Framework<S, A>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// What an installed plugin contributed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    /// Plugin name
    pub name: String,
    /// Plugin version
    pub version: String,
    /// Pages it added
    pub pages: Vec<PageId>,
    /// Reducer names it registered
    pub reducers: Vec<String>,
    /// Number of middleware it appended
    pub middleware: usize,
    /// Renderer names it registered
    pub renderers: Vec<String>,
}

struct Installed<S: State, A: Action> {
    plugin: Arc<dyn Plugin<S, A>>,
    info: PluginInfo,
}

/// The parts of a framework a plugin contributes to
pub(crate) struct PluginTargets<'a, S: State, A: Action> {
    pub registry: &'a mut PageRegistry<S, A>,
    pub store: &'a StateStore<S, A>,
    pub renderers: &'a mut ContributionMap<Arc<dyn Renderer<S>>>,
}

/// Tracks installed plugins and merges their contributions
pub struct PluginManager<S: State, A: Action> {
    installed: Vec<Installed<S, A>>,
}

impl<S: State, A: Action> Default for PluginManager<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State, A: Action> PluginManager<S, A> {
    /// No plugins installed
    #[must_use]
    pub fn new() -> Self {
        Self {
            installed: Vec::new(),
        }
    }

    /// Whether a plugin with `name` is installed
    #[must_use]
    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.iter().any(|p| p.info.name == name)
    }

    /// Installed plugins in installation order
    #[must_use]
    pub fn installed(&self) -> Vec<PluginInfo> {
        self.installed.iter().map(|p| p.info.clone()).collect()
    }

    /// Look up an installed plugin
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin<S, A>>> {
        self.installed
            .iter()
            .find(|p| p.info.name == name)
            .map(|p| p.plugin.clone())
    }

    /// Validate and merge a plugin's contributions
    ///
    /// Nothing is changed unless every check passes. The caller runs
    /// `on_install` afterwards and calls [`rollback`](Self::rollback) if it
    /// fails.
    pub(crate) fn install(
        &mut self,
        plugin: Arc<dyn Plugin<S, A>>,
        targets: PluginTargets<'_, S, A>,
    ) -> Result<PluginInfo, PluginError> {
        let name = plugin.name().to_string();
        if name.trim().is_empty() {
            return Err(PluginError::Invalid("plugin name must not be empty".into()));
        }
        if plugin.version().trim().is_empty() {
            return Err(PluginError::Invalid(format!(
                "plugin '{name}' has an empty version"
            )));
        }
        if self.is_installed(&name) {
            tracing::warn!(plugin = %name, "Plugin already installed");
            return Err(PluginError::AlreadyInstalled(name));
        }

        let pages = plugin.pages();
        let mut seen: Vec<PageId> = Vec::new();
        for page in &pages {
            let id = page.id();
            let conflict = match targets.registry.check(page.as_ref()) {
                Err(RegistryError::Invalid(reason)) => {
                    return Err(PluginError::Invalid(format!("plugin '{name}': {reason}")));
                }
                Err(RegistryError::Duplicate(_)) => true,
                Ok(()) => seen.contains(&id),
            };
            if conflict {
                return Err(PluginError::DuplicatePage { plugin: name, page: id });
            }
            seen.push(id);
        }

        let owner = Contributor::plugin(&name);
        for page in pages {
            targets
                .registry
                .register(page, owner.clone())
                .map_err(|e| PluginError::Invalid(e.to_string()))?;
        }

        let mut reducer_names = Vec::new();
        for (reducer_name, reducer) in plugin.reducers() {
            reducer_names.push(reducer_name.clone());
            targets.store.add_reducer(reducer_name, reducer, owner.clone());
        }

        let middleware = plugin.middleware();
        let middleware_count = middleware.len();
        for m in middleware {
            targets.store.add_middleware(m, owner.clone());
        }

        let mut renderer_names = Vec::new();
        for (renderer_name, renderer) in plugin.renderers() {
            renderer_names.push(renderer_name.clone());
            targets
                .renderers
                .insert(renderer_name, renderer, owner.clone());
        }

        let info = PluginInfo {
            name: name.clone(),
            version: plugin.version().to_string(),
            pages: seen,
            reducers: reducer_names,
            middleware: middleware_count,
            renderers: renderer_names,
        };
        tracing::info!(
            plugin = %name,
            version = %info.version,
            pages = info.pages.len(),
            reducers = info.reducers.len(),
            middleware = info.middleware,
            "Plugin installed"
        );
        self.installed.push(Installed {
            plugin,
            info: info.clone(),
        });
        Ok(info)
    }

    /// Remove a plugin's record and contributions
    ///
    /// Refuses while one of its pages is `current`.
    pub(crate) fn uninstall(
        &mut self,
        name: &str,
        targets: PluginTargets<'_, S, A>,
        current: Option<&PageId>,
    ) -> Result<Arc<dyn Plugin<S, A>>, PluginError> {
        let index = self
            .installed
            .iter()
            .position(|p| p.info.name == name)
            .ok_or_else(|| PluginError::NotInstalled(name.to_string()))?;

        if let Some(current) = current {
            if self.installed[index].info.pages.contains(current) {
                return Err(PluginError::PageInUse {
                    plugin: name.to_string(),
                    page: current.clone(),
                });
            }
        }

        let removed = self.installed.remove(index);
        Self::remove_contributions(name, targets);
        tracing::info!(plugin = %name, "Plugin uninstalled");
        Ok(removed.plugin)
    }

    /// Undo an installation whose `on_install` hook failed
    pub(crate) fn rollback(&mut self, name: &str, targets: PluginTargets<'_, S, A>) {
        self.installed.retain(|p| p.info.name != name);
        Self::remove_contributions(name, targets);
        tracing::warn!(plugin = %name, "Plugin installation rolled back");
    }

    fn remove_contributions(name: &str, targets: PluginTargets<'_, S, A>) {
        let owner = Contributor::plugin(name);
        let pages = targets.registry.remove_owned_by(&owner);
        let (reducers, middleware) = targets.store.remove_owned_by(&owner);
        let renderers = targets.renderers.remove_owned_by(&owner);
        tracing::debug!(
            plugin = %name,
            pages = pages.len(),
            reducers = reducers.len(),
            middleware,
            renderers = renderers.len(),
            "Plugin contributions removed"
        );
    }
}

impl<S: State, A: Action> fmt::Debug for PluginManager<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.installed.iter().map(|p| &p.info))
            .finish()
    }
}
