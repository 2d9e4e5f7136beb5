//! Interactive session driver
//!
//! Wires a [`Framework`] to the real terminal: key pump in, panic hook and
//! signal handling around `run()`, and a cleanup that runs on every path.

use std::future::Future;
use std::io::{self, IsTerminal};
use std::panic;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use pageflow_core::{Action, Framework, FrameworkError, State};

use crate::backend::restore_terminal;
use crate::keys::spawn_key_pump;

/// Whether stdin and stdout are both a TTY
#[must_use]
pub fn has_tty() -> bool {
    io::stdin().is_terminal() && io::stdout().is_terminal()
}

/// Restore the terminal before the default panic output is printed
pub fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        restore_terminal();
        original_hook(panic_info);
    }));
}

/// Run `framework` against the terminal until it exits
///
/// Keys are read for the lifetime of the call. SIGINT, SIGTERM and SIGHUP
/// stop the loop the same way an exit hotkey does, and the terminal is
/// released before this returns.
///
/// # Errors
///
/// Whatever `Framework::run` returns.
pub async fn run_interactive<S: State, A: Action>(
    framework: &Framework<S, A>,
) -> Result<S, FrameworkError> {
    let pump = spawn_key_pump(framework.cli().clone());
    let result = run_until(framework, shutdown_signal()).await;
    pump.abort();
    result
}

/// Run `framework` until it exits or `shutdown` resolves, then clean up
///
/// # Errors
///
/// Whatever `Framework::run` returns.
pub async fn run_until<S, A, F>(framework: &Framework<S, A>, shutdown: F) -> Result<S, FrameworkError>
where
    S: State,
    A: Action,
    F: Future<Output = ()>,
{
    let run = framework.run();
    tokio::pin!(run);
    let result = tokio::select! {
        result = &mut run => result,
        () = shutdown => {
            framework.stop();
            run.await
        }
    };

    let report = framework.cleanup();
    tracing::debug!(?report, "Session finished");
    result
}

/// Resolves once the process is asked to stop
///
/// Listens for SIGINT everywhere, plus SIGTERM and SIGHUP on unix. A signal
/// whose handler cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!(signal = "SIGINT", "Signal received, stopping"),
            Err(e) => {
                tracing::warn!(signal = "SIGINT", error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = unix_signal(SignalKind::terminate(), "SIGTERM");
    #[cfg(unix)]
    let hangup = unix_signal(SignalKind::hangup(), "SIGHUP");

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    #[cfg(not(unix))]
    let hangup = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
        () = hangup => {}
    }
}

#[cfg(unix)]
async fn unix_signal(kind: SignalKind, name: &'static str) {
    match signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
            tracing::info!(signal = name, "Signal received, stopping");
        }
        Err(e) => {
            tracing::warn!(signal = name, error = %e, "Failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}
