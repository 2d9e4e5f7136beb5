//! Pageflow Term - Crossterm Surface for Pageflow
//!
//! Connects the headless `pageflow-core` framework to a real terminal:
//!
//! - [`CrosstermTerminal`]: the [`TerminalBackend`](pageflow_core::TerminalBackend)
//!   for a TTY
//! - [`spawn_key_pump`]: crossterm events into `InteractiveCli::emit_key`
//! - [`run_interactive`]: runs a framework with panic and signal safety
//! - [`run_until`]: the same session driver with a caller-supplied shutdown
//!
//! ```ignore
//! let framework = Framework::builder()
//!     .terminal(Arc::new(CrosstermTerminal::new()))
//!     // pages, reducers ...
//!     .build()
//!     .await?;
//!
//! install_panic_hook();
//! let state = run_interactive(&framework).await?;
//! ```

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod keys;
pub mod session;

pub use backend::{restore_terminal, CrosstermTerminal};
pub use keys::{convert_key, spawn_key_pump};
pub use session::{has_tty, install_panic_hook, run_interactive, run_until, shutdown_signal};
