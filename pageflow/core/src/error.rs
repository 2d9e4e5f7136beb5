//! Error Types
//!
//! One error enum per concern, plus [`FrameworkError`] which wraps them all
//! for callers that only care that something went wrong.
//!
//! | Error | Raised by | Recoverable |
//! |-------|-----------|-------------|
//! | [`ConfigurationError`] | `FrameworkBuilder::build` | No, fails before any terminal I/O |
//! | [`RegistryError`] | `PageRegistry::register` | Yes, the registry is untouched |
//! | [`NavigationError`] | `navigate_to`, `go_back`, `go_forward` | Yes, current page is untouched |
//! | [`PluginError`] | `use_plugin`, `unuse_plugin` | Yes, registries are untouched |
//! | [`DispatchError`] | `StateStore::dispatch` | Yes, state is untouched |
//! | [`CliError`] | terminal writes, controlled futures | `Cancelled` ends the waiting operation |

use thiserror::Error;

use crate::config::ConfigError;
use crate::page::PageId;

/// Builder preconditions that were not met
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// `initial_state` was never called
    #[error("initial state was not set")]
    MissingInitialState,

    /// No pages were registered
    #[error("at least one page must be registered")]
    NoPages,

    /// Two pages share an id
    #[error("duplicate page id '{0}'")]
    DuplicatePage(PageId),

    /// A page failed its registration checks
    #[error("invalid page: {0}")]
    InvalidPage(String),

    /// The configured initial page is not registered
    #[error("initial page '{0}' is not registered")]
    UnknownInitialPage(PageId),

    /// The framework options failed validation
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// A plugin passed to the builder could not be installed
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

impl From<RegistryError> for ConfigurationError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Duplicate(id) => Self::DuplicatePage(id),
            RegistryError::Invalid(reason) => Self::InvalidPage(reason),
        }
    }
}

/// A page that could not be added to the registry
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Another page already uses the id
    #[error("duplicate page id '{0}'")]
    Duplicate(PageId),

    /// The page failed its capability checks
    #[error("invalid page: {0}")]
    Invalid(String),
}

/// A navigation request that could not be carried out
///
/// The engine never changes the current page or history when it returns one
/// of these.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NavigationError {
    /// The target page is not registered
    #[error("page '{0}' is not registered")]
    PageNotFound(PageId),

    /// The current page's `can_navigate_to` refused the target
    #[error("navigation from '{from}' to '{to}' was denied")]
    Denied {
        /// Page that was active
        from: PageId,
        /// Page that was requested
        to: PageId,
    },

    /// `PREV_PAGE` on the first reachable page
    #[error("there is no page before '{0}'")]
    NoPreviousPage(PageId),

    /// `go_back` at the oldest history entry
    #[error("already at the oldest history entry")]
    HistoryStart,

    /// `go_forward` at the newest history entry
    #[error("already at the newest history entry")]
    HistoryEnd,

    /// An operation that needs an active page ran before the first navigation
    #[error("no page is active")]
    NotStarted,

    /// An `on_enter` or `on_exit` hook returned an error
    #[error("{hook} hook of page '{page}' failed: {message}")]
    Hook {
        /// Page whose hook failed
        page: PageId,
        /// `on_enter` or `on_exit`
        hook: &'static str,
        /// Rendered hook error
        message: String,
    },
}

/// Plugin installation and removal failures
#[derive(Debug, Error)]
pub enum PluginError {
    /// A plugin with the same name is already installed
    #[error("plugin '{0}' is already installed")]
    AlreadyInstalled(String),

    /// A plugin page collides with a registered page
    #[error("plugin '{plugin}' contributes page '{page}' which is already registered")]
    DuplicatePage {
        /// Plugin being installed
        plugin: String,
        /// Colliding page id
        page: PageId,
    },

    /// `unuse_plugin` named a plugin that is not installed
    #[error("plugin '{0}' is not installed")]
    NotInstalled(String),

    /// The plugin failed its capability checks
    #[error("invalid plugin: {0}")]
    Invalid(String),

    /// Uninstalling would remove the page that is currently shown
    #[error("plugin '{plugin}' owns the active page '{page}'")]
    PageInUse {
        /// Plugin being removed
        plugin: String,
        /// Active page it contributed
        page: PageId,
    },

    /// `on_install` returned an error; contributions were rolled back
    #[error("plugin '{plugin}' failed to install: {source}")]
    InstallHook {
        /// Plugin being installed
        plugin: String,
        /// Hook error
        source: anyhow::Error,
    },
}

/// Failures inside `dispatch`
///
/// The store keeps its previous state whenever one of these is returned.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// The action failed its own `validate` check
    #[error("action '{kind}' rejected: {reason}")]
    InvalidAction {
        /// `Action::kind` of the rejected action
        kind: String,
        /// Validation message
        reason: String,
    },

    /// A middleware returned an error
    #[error("middleware '{name}' failed: {message}")]
    Middleware {
        /// Middleware name
        name: String,
        /// Error message
        message: String,
    },

    /// A reducer returned an error
    #[error("reducer '{name}' failed: {message}")]
    Reducer {
        /// Reducer name
        name: String,
        /// Error message
        message: String,
    },
}

impl DispatchError {
    /// Convenience constructor for middleware failures
    pub fn middleware(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Middleware {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Terminal and controlled-future failures
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CliError {
    /// The terminal was cleaned up while the operation was pending
    #[error("operation cancelled: terminal session was cleaned up")]
    Cancelled,

    /// The operation was rejected by its resolver or aborted by the user
    #[error("operation rejected: {0}")]
    Rejected(String),

    /// Another terminal session already owns raw mode
    #[error("raw mode is owned by another terminal session")]
    RawModeBusy,

    /// Writing to the terminal failed
    #[error("terminal I/O failed: {0}")]
    Terminal(String),
}

impl CliError {
    /// Whether this is the cancellation raised by `cleanup()`
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::AlreadyExists {
            Self::RawModeBusy
        } else {
            Self::Terminal(err.to_string())
        }
    }
}

/// Umbrella error returned by the framework's top-level operations
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// See [`ConfigurationError`]
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// See [`NavigationError`]
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    /// See [`PluginError`]
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// See [`DispatchError`]
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// See [`CliError`]
    #[error(transparent)]
    Cli(#[from] CliError),

    /// See [`ConfigError`]
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A page's `render` returned an error
    #[error("page '{page}' failed to render: {source}")]
    Render {
        /// Page being rendered
        page: PageId,
        /// Render error
        source: anyhow::Error,
    },

    /// `run()` was called while the framework was already running
    #[error("framework is already running")]
    AlreadyRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_already_exists_maps_to_raw_mode_busy() {
        let err = std::io::Error::new(std::io::ErrorKind::AlreadyExists, "owned");
        assert_eq!(CliError::from(err), CliError::RawModeBusy);

        let err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(matches!(CliError::from(err), CliError::Terminal(_)));
    }

    #[test]
    fn test_error_messages() {
        let err = NavigationError::Denied {
            from: PageId::new("a"),
            to: PageId::new("b"),
        };
        assert_eq!(err.to_string(), "navigation from 'a' to 'b' was denied");
        assert!(CliError::Cancelled.is_cancelled());
        assert!(!CliError::RawModeBusy.is_cancelled());
    }
}
