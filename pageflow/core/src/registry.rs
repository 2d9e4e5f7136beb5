//! Page Registry
//!
//! Ordered set of pages keyed by [`PageId`]. Registration order defines the
//! `NEXT_PAGE`/`PREV_PAGE` sequence, and every page remembers its
//! [`Contributor`] so a plugin's pages can be removed together.
//!
//! ```text
//!   index   0        1        2          3
//!         ┌──────┐ ┌──────┐ ┌────────┐ ┌──────┐
//!         │branch│→│ bump │→│ (skip) │→│ done │
//!         └──────┘ └──────┘ └────────┘ └──────┘
//!          builder  builder  plugin:x   builder
//! ```

use std::fmt;
use std::sync::Arc;

use crate::contrib::Contributor;
use crate::error::RegistryError;
use crate::page::{check_page, Page, PageId, PageInfo};
use crate::store::{Action, State};

struct Entry<S: State, A: Action> {
    id: PageId,
    page: Arc<dyn Page<S, A>>,
    owner: Contributor,
}

impl<S: State, A: Action> Clone for Entry<S, A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            page: self.page.clone(),
            owner: self.owner.clone(),
        }
    }
}

/// Ordered collection of uniquely identified pages
pub struct PageRegistry<S: State, A: Action> {
    entries: Vec<Entry<S, A>>,
}

impl<S: State, A: Action> Default for PageRegistry<S, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: State, A: Action> Clone for PageRegistry<S, A> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<S: State, A: Action> PageRegistry<S, A> {
    /// An empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Check that `page` could be registered, without registering it
    ///
    /// # Errors
    ///
    /// [`RegistryError::Invalid`] when the page fails its capability checks,
    /// [`RegistryError::Duplicate`] when the id is taken.
    pub fn check(&self, page: &dyn Page<S, A>) -> Result<(), RegistryError> {
        check_page(page).map_err(RegistryError::Invalid)?;
        let id = page.id();
        if self.contains(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        Ok(())
    }

    /// Append a page
    ///
    /// # Errors
    ///
    /// See [`PageRegistry::check`]; the registry is unchanged on error.
    pub fn register(
        &mut self,
        page: Arc<dyn Page<S, A>>,
        owner: Contributor,
    ) -> Result<(), RegistryError> {
        self.check(page.as_ref())?;
        let id = page.id();
        tracing::debug!(page_id = %id, owner = %owner, "Page registered");
        self.entries.push(Entry { id, page, owner });
        Ok(())
    }

    /// Remove every page contributed by `owner`; returns their ids
    pub fn remove_owned_by(&mut self, owner: &Contributor) -> Vec<PageId> {
        let removed: Vec<PageId> = self
            .entries
            .iter()
            .filter(|e| &e.owner == owner)
            .map(|e| e.id.clone())
            .collect();
        self.entries.retain(|e| &e.owner != owner);
        removed
    }

    /// Look up a page
    #[must_use]
    pub fn get(&self, id: &PageId) -> Option<Arc<dyn Page<S, A>>> {
        self.entries
            .iter()
            .find(|e| &e.id == id)
            .map(|e| e.page.clone())
    }

    /// Whether a page with `id` is registered
    #[must_use]
    pub fn contains(&self, id: &PageId) -> bool {
        self.entries.iter().any(|e| &e.id == id)
    }

    /// Who contributed the page
    #[must_use]
    pub fn owner_of(&self, id: &PageId) -> Option<&Contributor> {
        self.entries.iter().find(|e| &e.id == id).map(|e| &e.owner)
    }

    /// Position of the page in registration order
    #[must_use]
    pub fn index_of(&self, id: &PageId) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }

    /// The first registered page
    #[must_use]
    pub fn first(&self) -> Option<PageId> {
        self.entries.first().map(|e| e.id.clone())
    }

    /// Page ids in registration order
    #[must_use]
    pub fn ids(&self) -> Vec<PageId> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Descriptive info for every page, in registration order
    #[must_use]
    pub fn infos(&self) -> Vec<PageInfo> {
        self.entries
            .iter()
            .map(|e| PageInfo::of(e.page.as_ref()))
            .collect()
    }

    /// The first page after `from` that is not skippable in `state`
    #[must_use]
    pub fn next_after(&self, from: &PageId, state: &S) -> Option<PageId> {
        let start = self.index_of(from)?;
        self.entries[start + 1..]
            .iter()
            .find(|e| !e.page.can_skip(state))
            .map(|e| e.id.clone())
    }

    /// The closest page before `from` that is not skippable in `state`
    #[must_use]
    pub fn prev_before(&self, from: &PageId, state: &S) -> Option<PageId> {
        let end = self.index_of(from)?;
        self.entries[..end]
            .iter()
            .rev()
            .find(|e| !e.page.can_skip(state))
            .map(|e| e.id.clone())
    }

    /// Number of registered pages
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no pages are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: State, A: Action> fmt::Debug for PageRegistry<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.id, &e.owner)))
            .finish()
    }
}
