//! Interactive CLI
//!
//! [`InteractiveCli`] owns the terminal for a framework session:
//!
//! - terminal writes (clear, cursor, text) through a [`TerminalBackend`]
//! - a multi-listener key-press channel fed by the surface's key source
//! - controlled futures that bridge key callbacks to awaiting page code
//! - raw-mode ownership through a [`RawModeGuard`]
//!
//! # Delivery order
//!
//! Listeners are called in registration order. A listener that returns an
//! error (or panics) is logged and skipped; the remaining listeners still
//! receive the key.
//!
//! # Cleanup
//!
//! [`InteractiveCli::cleanup`] can be called any number of times. Each call
//! shows the cursor, releases raw mode, rejects every pending controlled
//! future with [`CliError::Cancelled`] and removes all listeners.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::controlled::{controlled, Cancel, Pending, Resolver};
use crate::error::CliError;
use crate::key::Key;
use crate::terminal::{RawModeGuard, TerminalBackend};

/// Callback invoked for every key press
pub type KeyHandler = Arc<dyn Fn(&Key) -> anyhow::Result<()> + Send + Sync>;

/// Identifies a registered key listener
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Outcome of [`InteractiveCli::wait_for_key_or_timeout`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyWait {
    /// A key arrived in time
    Key(Key),
    /// The timer fired first
    Timeout,
}

/// What a call to [`InteractiveCli::cleanup`] released
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Controlled futures rejected with `Cancelled`
    pub cancelled: usize,
    /// Key listeners removed
    pub listeners_removed: usize,
    /// Whether this call released raw mode
    pub released_raw_mode: bool,
}

struct CliInner {
    backend: Arc<dyn TerminalBackend>,
    listeners: Mutex<Vec<(ListenerId, KeyHandler)>>,
    pending: Mutex<Vec<Weak<dyn Cancel>>>,
    raw_mode: Mutex<Option<RawModeGuard>>,
    next_id: AtomicU64,
}

/// Handle to the terminal session
///
/// Cloning is cheap; all clones share listeners, pending futures and
/// raw-mode ownership.
#[derive(Clone)]
pub struct InteractiveCli {
    inner: Arc<CliInner>,
}

impl std::fmt::Debug for InteractiveCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractiveCli")
            .field("listeners", &self.listener_count())
            .field("pending", &self.pending_count())
            .field("raw_mode", &self.is_raw_mode())
            .finish()
    }
}

impl InteractiveCli {
    /// Create a session over the given backend
    pub fn new(backend: Arc<dyn TerminalBackend>) -> Self {
        Self {
            inner: Arc::new(CliInner {
                backend,
                listeners: Mutex::new(Vec::new()),
                pending: Mutex::new(Vec::new()),
                raw_mode: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// The underlying terminal backend
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn TerminalBackend> {
        &self.inner.backend
    }

    // ========================================================================
    // Key listeners
    // ========================================================================

    /// Register a key listener; delivery follows registration order
    pub fn on_key_press<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&Key) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners.lock().push((id, Arc::new(handler)));
        tracing::trace!(listener = %id, "Key listener registered");
        id
    }

    /// Remove a key listener; returns false if it was not registered
    pub fn off_key_press(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        before != listeners.len()
    }

    /// Number of registered key listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Deliver a key press to every listener
    ///
    /// Called by the surface's key source. Returns how many listeners
    /// handled the key without error.
    pub fn emit_key(&self, key: &Key) -> usize {
        // Snapshot so listeners may (un)register while being called
        let listeners: Vec<(ListenerId, KeyHandler)> = self.inner.listeners.lock().clone();
        let mut delivered = 0;

        for (id, handler) in listeners {
            match catch_unwind(AssertUnwindSafe(|| handler(key))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(listener = %id, key = %key, error = %e, "Key listener failed");
                }
                Err(_) => {
                    tracing::error!(listener = %id, key = %key, "Key listener panicked");
                }
            }
        }

        delivered
    }

    // ========================================================================
    // Terminal output
    // ========================================================================

    /// Clear the whole screen
    pub fn clear_screen(&self) -> Result<(), CliError> {
        Ok(self.inner.backend.clear_screen()?)
    }

    /// Clear the current line
    pub fn clear_line(&self) -> Result<(), CliError> {
        Ok(self.inner.backend.clear_line()?)
    }

    /// Move the cursor to (column, row)
    pub fn move_to(&self, column: u16, row: u16) -> Result<(), CliError> {
        Ok(self.inner.backend.move_to(column, row)?)
    }

    /// Move the cursor up
    pub fn move_up(&self, lines: u16) -> Result<(), CliError> {
        Ok(self.inner.backend.move_up(lines)?)
    }

    /// Hide the cursor
    pub fn hide_cursor(&self) -> Result<(), CliError> {
        Ok(self.inner.backend.hide_cursor()?)
    }

    /// Show the cursor
    pub fn show_cursor(&self) -> Result<(), CliError> {
        Ok(self.inner.backend.show_cursor()?)
    }

    /// Write text at the cursor
    pub fn write(&self, text: &str) -> Result<(), CliError> {
        self.inner.backend.write(text)?;
        Ok(self.inner.backend.flush()?)
    }

    /// Write a line; uses `\r\n` so output stays aligned in raw mode
    pub fn write_line(&self, text: &str) -> Result<(), CliError> {
        self.inner.backend.write(text)?;
        self.inner.backend.write("\r\n")?;
        Ok(self.inner.backend.flush()?)
    }

    /// Terminal size as (columns, rows)
    pub fn size(&self) -> Result<(u16, u16), CliError> {
        Ok(self.inner.backend.size()?)
    }

    // ========================================================================
    // Raw mode
    // ========================================================================

    /// Take raw-mode ownership; a no-op if this session already owns it
    ///
    /// # Errors
    ///
    /// [`CliError::RawModeBusy`] when another session owns raw mode.
    pub fn enable_raw_mode(&self) -> Result<(), CliError> {
        let mut slot = self.inner.raw_mode.lock();
        if slot.is_none() {
            *slot = Some(RawModeGuard::acquire(self.inner.backend.clone())?);
        }
        Ok(())
    }

    /// Release raw-mode ownership; returns whether it was held
    pub fn disable_raw_mode(&self) -> bool {
        self.inner.raw_mode.lock().take().is_some()
    }

    /// Whether this session owns raw mode
    #[must_use]
    pub fn is_raw_mode(&self) -> bool {
        self.inner.raw_mode.lock().is_some()
    }

    // ========================================================================
    // Controlled futures
    // ========================================================================

    /// Create a controlled future that `cleanup()` will cancel
    pub fn create_controlled<T: Send + 'static>(&self) -> (Resolver<T>, Pending<T>) {
        let (resolver, pending) = controlled();
        let mut registry = self.inner.pending.lock();
        registry.retain(|weak| weak.upgrade().is_some_and(|c| !c.is_settled()));
        registry.push(resolver.cancel_handle());
        (resolver, pending)
    }

    /// Number of controlled futures still waiting to be settled
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner
            .pending
            .lock()
            .iter()
            .filter(|weak| weak.upgrade().is_some_and(|c| !c.is_settled()))
            .count()
    }

    /// Wait for the next key press
    ///
    /// # Errors
    ///
    /// [`CliError::Cancelled`] if the session is cleaned up first.
    pub async fn wait_for_key(&self) -> Result<Key, CliError> {
        let (resolver, pending) = self.create_controlled::<Key>();
        let _listener = self.scoped_listener(move |key| {
            resolver.resolve(*key);
            Ok(())
        });
        pending.await
    }

    /// Wait for a key press or until `timeout` elapses
    ///
    /// The temporary listener is removed on every path, including timeout.
    pub async fn wait_for_key_or_timeout(&self, timeout: Duration) -> Result<KeyWait, CliError> {
        match tokio::time::timeout(timeout, self.wait_for_key()).await {
            Ok(Ok(key)) => Ok(KeyWait::Key(key)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(KeyWait::Timeout),
        }
    }

    /// Register a listener that is removed when the returned guard drops
    pub fn scoped_listener<F>(&self, handler: F) -> ListenerGuard
    where
        F: Fn(&Key) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.on_key_press(handler);
        ListenerGuard {
            cli: Arc::downgrade(&self.inner),
            id,
        }
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Release every terminal resource held by this session
    ///
    /// Idempotent: later calls find nothing left to release.
    pub fn cleanup(&self) -> CleanupReport {
        if let Err(e) = self.inner.backend.show_cursor() {
            tracing::warn!(error = %e, "Failed to restore cursor");
        }

        // Only the owning session may switch raw mode off
        let released_raw_mode = self.disable_raw_mode();

        let pending: Vec<Weak<dyn Cancel>> = std::mem::take(&mut *self.inner.pending.lock());
        let cancelled = pending
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|c| c.cancel())
            .count();

        let listeners_removed = {
            let mut listeners = self.inner.listeners.lock();
            let count = listeners.len();
            listeners.clear();
            count
        };

        if let Err(e) = self.inner.backend.flush() {
            tracing::warn!(error = %e, "Failed to flush terminal");
        }

        let report = CleanupReport {
            cancelled,
            listeners_removed,
            released_raw_mode,
        };
        tracing::debug!(?report, "Terminal session cleaned up");
        report
    }
}

/// Removes its key listener on drop
#[must_use = "the listener is removed as soon as the guard is dropped"]
pub struct ListenerGuard {
    cli: Weak<CliInner>,
    id: ListenerId,
}

impl ListenerGuard {
    /// The guarded listener's id
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.cli.upgrade() {
            inner.listeners.lock().retain(|(lid, _)| *lid != self.id);
        }
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::key::KeyCode;
    use crate::terminal::MemoryTerminal;

    fn cli() -> (InteractiveCli, Arc<MemoryTerminal>) {
        let terminal = Arc::new(MemoryTerminal::new());
        (InteractiveCli::new(terminal.clone()), terminal)
    }

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let (cli, _) = cli();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 1..=3 {
            let order = order.clone();
            cli.on_key_press(move |_| {
                order.lock().push(n);
                Ok(())
            });
        }

        assert_eq!(cli.emit_key(&Key::char('x')), 3);
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_failing_listener_is_isolated() {
        let (cli, _) = cli();
        let hits = Arc::new(AtomicUsize::new(0));

        cli.on_key_press(|_| anyhow::bail!("broken handler"));
        cli.on_key_press(|_| panic!("panicking handler"));
        let counter = hits.clone();
        cli.on_key_press(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(cli.emit_key(&Key::new(KeyCode::Enter)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_key_press() {
        let (cli, _) = cli();
        let id = cli.on_key_press(|_| Ok(()));
        assert_eq!(cli.listener_count(), 1);
        assert!(cli.off_key_press(id));
        assert!(!cli.off_key_press(id));
        assert_eq!(cli.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_key_removes_listener() {
        let (cli, _) = cli();
        let emitter = cli.clone();
        tokio::spawn(async move {
            while emitter.listener_count() == 0 {
                tokio::task::yield_now().await;
            }
            emitter.emit_key(&Key::char('y'));
        });

        assert_eq!(cli.wait_for_key().await, Ok(Key::char('y')));
        assert_eq!(cli.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_key_or_timeout_times_out() {
        let (cli, _) = cli();
        let outcome = cli
            .wait_for_key_or_timeout(Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(outcome, KeyWait::Timeout);
        assert_eq!(cli.listener_count(), 0, "timeout must not leak a listener");
    }

    #[tokio::test]
    async fn test_cleanup_cancels_pending_futures() {
        let (cli, terminal) = cli();
        let (_r1, p1) = cli.create_controlled::<u32>();
        let (_r2, p2) = cli.create_controlled::<String>();
        let (r3, p3) = cli.create_controlled::<u32>();
        r3.resolve(3);
        cli.on_key_press(|_| Ok(()));
        cli.hide_cursor().unwrap();

        let report = cli.cleanup();
        assert_eq!(report.cancelled, 2);
        assert_eq!(report.listeners_removed, 1);
        assert_eq!(p1.await, Err(CliError::Cancelled));
        assert_eq!(p2.await, Err(CliError::Cancelled));
        assert_eq!(p3.await, Ok(3));
        assert!(terminal.is_cursor_visible());
        assert!(!terminal.is_raw_mode_enabled());

        // idempotent
        assert_eq!(cli.cleanup(), CleanupReport::default());
    }

    #[test]
    fn test_raw_mode_is_owned_by_one_session() {
        let terminal = Arc::new(MemoryTerminal::new());
        let first = InteractiveCli::new(terminal.clone());
        let second = InteractiveCli::new(terminal.clone());

        first.enable_raw_mode().unwrap();
        first.enable_raw_mode().unwrap();
        assert_eq!(second.enable_raw_mode(), Err(CliError::RawModeBusy));

        let report = first.cleanup();
        assert!(report.released_raw_mode);
        assert!(second.enable_raw_mode().is_ok());
        second.cleanup();
        assert!(!terminal.is_raw_mode_enabled());
    }

    #[test]
    fn test_write_line_uses_crlf() {
        let (cli, terminal) = cli();
        cli.write_line("hello").unwrap();
        assert_eq!(terminal.output(), "hello\r\n");
    }
}
