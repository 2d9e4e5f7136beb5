//! Pageflow Core - Page-Based Interactive CLI Framework
//!
//! This crate provides the machinery behind multi-step terminal wizards
//! (release helpers, repository setup flows, guided checklists), completely
//! independent of any particular terminal library. A surface crate supplies
//! a [`TerminalBackend`] and feeds key presses; everything else lives here.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Surfaces                                │
//! │  ┌──────────────────────┐        ┌───────────────────────────┐  │
//! │  │  pageflow-term       │        │  MemoryTerminal (tests,   │  │
//! │  │  (crossterm)         │        │  headless automation)     │  │
//! │  └──────────┬───────────┘        └─────────────┬─────────────┘  │
//! │             │    keys up / terminal ops down   │                │
//! └─────────────┼──────────────────────────────────┼────────────────┘
//!               │                                  │
//! ┌─────────────┼──────────────────────────────────┼────────────────┐
//! │             ▼         PAGEFLOW CORE            ▼                │
//! │  ┌──────────────────────────────────────────────────────────┐   │
//! │  │                       Framework                          │   │
//! │  │  ┌──────────┐ ┌────────────┐ ┌──────────┐ ┌───────────┐  │   │
//! │  │  │ Interac- │ │ Navigation │ │  State   │ │  Plugin   │  │   │
//! │  │  │ tiveCli  │ │  Engine    │ │  Store   │ │  Manager  │  │   │
//! │  │  └──────────┘ └────────────┘ └──────────┘ └───────────┘  │   │
//! │  │                     EventBus                             │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Framework`]: the running instance; drives the page loop
//! - [`FrameworkBuilder`]: validated, fluent configuration
//! - [`Page`]: one step of a flow
//! - [`StateStore`]: reducers, middleware and subscribers over one state value
//! - [`EventBus`]: lifecycle and error events
//! - [`Plugin`]: bundles pages, reducers, middleware and renderers
//! - [`InteractiveCli`]: terminal session with key listeners and cleanup
//!
//! # Quick Start
//!
//! ```ignore
//! use pageflow_core::{reducer, Framework, PageAction};
//!
//! let framework = Framework::builder()
//!     .initial_state(Release::default())
//!     .reducer("release", reducer(apply_release_action))
//!     .page(BranchPage)
//!     .page(BumpPage)
//!     .page(ConfirmPage)
//!     .build()
//!     .await?;
//!
//! let final_state = framework.run().await?;
//! ```
//!
//! # Module Overview
//!
//! - [`builder`]: framework configuration and validation
//! - [`cli`]: terminal session, key listeners, cleanup
//! - [`config`]: options from defaults, TOML file, environment and flags
//! - [`contrib`]: who contributed which page, reducer or renderer
//! - [`controlled`]: externally settled futures
//! - [`error`]: error types
//! - [`events`]: event bus and event payloads
//! - [`framework`]: the run loop
//! - [`history`]: bounded navigation history with state snapshots
//! - [`key`]: key press model and parsing
//! - [`navigation`]: page transitions and lifecycle hooks
//! - [`page`]: the page trait and page actions
//! - [`plugin`]: plugin trait and manager
//! - [`prompt`]: confirm, select and text input widgets
//! - [`registry`]: ordered page registry
//! - [`render`]: headers, help overlay and render pacing
//! - [`store`]: state store, reducers and middleware
//! - [`terminal`]: terminal backend trait and headless backend
//! - [`validation`]: validation results
//!
//! # No Terminal Dependencies
//!
//! This crate has **zero** dependencies on crossterm or any other terminal
//! library. Pages, state and navigation can be driven entirely in tests.

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod builder;
pub mod cli;
pub mod config;
pub mod contrib;
pub mod controlled;
pub mod error;
pub mod events;
pub mod framework;
pub mod history;
pub mod key;
pub mod navigation;
pub mod page;
pub mod plugin;
pub mod prompt;
pub mod registry;
pub mod render;
pub mod store;
pub mod terminal;
pub mod validation;

// Re-exports for convenience
pub use builder::FrameworkBuilder;
pub use cli::{CleanupReport, InteractiveCli, KeyWait, ListenerGuard, ListenerId};
pub use contrib::Contributor;
pub use controlled::{controlled, Pending, Resolver};
pub use error::{
    CliError, ConfigurationError, DispatchError, FrameworkError, NavigationError, PluginError,
    RegistryError,
};
pub use events::{ErrorEvent, ErrorSource, EventBus, EventKind, FrameworkEvent, SubscriptionId};
pub use framework::Framework;
pub use history::{History, HistoryEntry};
pub use key::{Key, KeyCode, Modifiers};
pub use navigation::NavigationEngine;
pub use page::{Page, PageAction, PageId, PageInfo};
pub use plugin::{Plugin, PluginInfo, PluginManager};
pub use registry::PageRegistry;
pub use render::{DefaultHeader, RenderMode, RenderScheduler, Renderer, HEADER_RENDERER};
pub use store::{
    middleware_fn, reducer, try_reducer, Action, Middleware, Next, Reducer, State, StateStore,
};
pub use terminal::{MemoryTerminal, RawModeGuard, TerminalBackend, TerminalOp};
pub use validation::ValidationResult;

// Config exports
pub use config::{
    default_config_path, load_options, load_options_from_path, ConfigError, ConfigSource,
    FrameworkOptions, LogLevel, OptionsOverrides, PageflowToml,
};
