//! Contribution Tracking
//!
//! Everything installed into a framework (pages, reducers, middleware,
//! renderers) remembers who contributed it, so uninstalling a plugin removes
//! exactly its own contributions and restores whatever it overrode.

use std::fmt;

/// Who registered a contribution
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Contributor {
    /// Registered directly on the `FrameworkBuilder`
    Builder,
    /// Registered by the named plugin
    Plugin(String),
}

impl Contributor {
    /// Contributor for a plugin name
    pub fn plugin(name: impl Into<String>) -> Self {
        Self::Plugin(name.into())
    }
}

impl fmt::Display for Contributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builder => write!(f, "builder"),
            Self::Plugin(name) => write!(f, "plugin:{name}"),
        }
    }
}

/// Name-keyed map where later registrations shadow earlier ones
///
/// Slots keep the position of the first registration under a name, so
/// iteration order is stable across overrides. Removing the shadowing
/// contribution re-exposes the one beneath it.
#[derive(Clone, Debug)]
pub(crate) struct ContributionMap<T> {
    slots: Vec<(String, Vec<(Contributor, T)>)>,
}

impl<T> Default for ContributionMap<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T: Clone> ContributionMap<T> {
    /// Register `value` under `name`, shadowing any existing entry
    pub fn insert(&mut self, name: impl Into<String>, value: T, owner: Contributor) {
        let name = name.into();
        if let Some((_, stack)) = self.slots.iter_mut().find(|(n, _)| *n == name) {
            stack.push((owner, value));
        } else {
            self.slots.push((name, vec![(owner, value)]));
        }
    }

    /// Remove every entry contributed by `owner`; returns the affected names
    pub fn remove_owned_by(&mut self, owner: &Contributor) -> Vec<String> {
        let mut affected = Vec::new();
        for (name, stack) in &mut self.slots {
            let before = stack.len();
            stack.retain(|(o, _)| o != owner);
            if stack.len() != before {
                affected.push(name.clone());
            }
        }
        self.slots.retain(|(_, stack)| !stack.is_empty());
        affected
    }

    /// The visible entry for `name`
    pub fn get(&self, name: &str) -> Option<&T> {
        self.slots
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, stack)| stack.last())
            .map(|(_, value)| value)
    }

    /// Visible entries in slot order
    pub fn active(&self) -> Vec<(String, T)> {
        self.slots
            .iter()
            .filter_map(|(name, stack)| stack.last().map(|(_, v)| (name.clone(), v.clone())))
            .collect()
    }

    /// Registered names in slot order
    pub fn names(&self) -> Vec<String> {
        self.slots.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
