//! Terminal Backends
//!
//! The [`TerminalBackend`] trait is the seam between the framework and a real
//! terminal. Surfaces provide an implementation (the `pageflow-term` crate
//! ships one built on crossterm); tests and headless runs use
//! [`MemoryTerminal`], which records every operation.
//!
//! # Raw mode ownership
//!
//! Raw mode is a process-wide resource. Backends report a second
//! `enable_raw_mode` while raw mode is already owned as
//! [`std::io::ErrorKind::AlreadyExists`], and [`RawModeGuard`] pairs the
//! acquisition with a guaranteed release on drop.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

/// Side-effecting terminal operations used by the framework
pub trait TerminalBackend: Send + Sync {
    /// Write text at the cursor position
    fn write(&self, text: &str) -> io::Result<()>;

    /// Clear the whole screen and home the cursor
    fn clear_screen(&self) -> io::Result<()>;

    /// Clear the line under the cursor and return to column 0
    fn clear_line(&self) -> io::Result<()>;

    /// Move the cursor to an absolute position (0-based)
    fn move_to(&self, column: u16, row: u16) -> io::Result<()>;

    /// Move the cursor up by `lines` rows
    fn move_up(&self, lines: u16) -> io::Result<()>;

    /// Hide the cursor
    fn hide_cursor(&self) -> io::Result<()>;

    /// Show the cursor
    fn show_cursor(&self) -> io::Result<()>;

    /// Terminal size as (columns, rows)
    fn size(&self) -> io::Result<(u16, u16)>;

    /// Enter raw input mode
    ///
    /// Must fail with [`io::ErrorKind::AlreadyExists`] when raw mode is
    /// already owned.
    fn enable_raw_mode(&self) -> io::Result<()>;

    /// Leave raw input mode; a no-op when raw mode is off
    fn disable_raw_mode(&self) -> io::Result<()>;

    /// Whether raw mode is currently enabled
    fn is_raw_mode_enabled(&self) -> bool;

    /// Flush buffered output
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Scoped ownership of the terminal's raw mode
///
/// Created by [`RawModeGuard::acquire`]; raw mode is disabled when the guard
/// is dropped, whichever path drops it.
pub struct RawModeGuard {
    backend: Arc<dyn TerminalBackend>,
}

impl RawModeGuard {
    /// Enable raw mode and take ownership of it
    ///
    /// # Errors
    ///
    /// Returns the backend's error; `AlreadyExists` means another session
    /// owns raw mode.
    pub fn acquire(backend: Arc<dyn TerminalBackend>) -> io::Result<Self> {
        backend.enable_raw_mode()?;
        tracing::debug!("Raw mode acquired");
        Ok(Self { backend })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.backend.disable_raw_mode() {
            tracing::warn!(error = %e, "Failed to disable raw mode");
        } else {
            tracing::debug!("Raw mode released");
        }
    }
}

impl std::fmt::Debug for RawModeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawModeGuard").finish_non_exhaustive()
    }
}

/// An operation recorded by [`MemoryTerminal`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminalOp {
    /// `write`
    Write(String),
    /// `clear_screen`
    ClearScreen,
    /// `clear_line`
    ClearLine,
    /// `move_to`
    MoveTo(u16, u16),
    /// `move_up`
    MoveUp(u16),
    /// `hide_cursor`
    HideCursor,
    /// `show_cursor`
    ShowCursor,
    /// `enable_raw_mode`
    EnableRawMode,
    /// `disable_raw_mode`
    DisableRawMode,
}

#[derive(Debug)]
struct MemoryState {
    ops: Vec<TerminalOp>,
    output: String,
    raw_mode: bool,
    cursor_visible: bool,
    size: (u16, u16),
}

/// Headless terminal that records operations instead of performing them
///
/// Raw-mode ownership is tracked per instance, so two sessions sharing one
/// `MemoryTerminal` contend exactly like two sessions on a real TTY.
#[derive(Debug)]
pub struct MemoryTerminal {
    state: Mutex<MemoryState>,
}

impl Default for MemoryTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTerminal {
    /// An 80x24 headless terminal
    #[must_use]
    pub fn new() -> Self {
        Self::with_size(80, 24)
    }

    /// A headless terminal with the given size
    #[must_use]
    pub fn with_size(columns: u16, rows: u16) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                ops: Vec::new(),
                output: String::new(),
                raw_mode: false,
                cursor_visible: true,
                size: (columns, rows),
            }),
        }
    }

    /// Everything written so far, concatenated
    #[must_use]
    pub fn output(&self) -> String {
        self.state.lock().output.clone()
    }

    /// All recorded operations in order
    #[must_use]
    pub fn ops(&self) -> Vec<TerminalOp> {
        self.state.lock().ops.clone()
    }

    /// Whether the cursor is currently visible
    #[must_use]
    pub fn is_cursor_visible(&self) -> bool {
        self.state.lock().cursor_visible
    }

    /// Discard recorded output and operations
    pub fn clear_recording(&self) {
        let mut state = self.state.lock();
        state.ops.clear();
        state.output.clear();
    }

    fn record(&self, op: TerminalOp) {
        self.state.lock().ops.push(op);
    }
}

impl TerminalBackend for MemoryTerminal {
    fn write(&self, text: &str) -> io::Result<()> {
        let mut state = self.state.lock();
        state.output.push_str(text);
        state.ops.push(TerminalOp::Write(text.to_string()));
        Ok(())
    }

    fn clear_screen(&self) -> io::Result<()> {
        self.record(TerminalOp::ClearScreen);
        Ok(())
    }

    fn clear_line(&self) -> io::Result<()> {
        self.record(TerminalOp::ClearLine);
        Ok(())
    }

    fn move_to(&self, column: u16, row: u16) -> io::Result<()> {
        self.record(TerminalOp::MoveTo(column, row));
        Ok(())
    }

    fn move_up(&self, lines: u16) -> io::Result<()> {
        self.record(TerminalOp::MoveUp(lines));
        Ok(())
    }

    fn hide_cursor(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.cursor_visible = false;
        state.ops.push(TerminalOp::HideCursor);
        Ok(())
    }

    fn show_cursor(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.cursor_visible = true;
        state.ops.push(TerminalOp::ShowCursor);
        Ok(())
    }

    fn size(&self) -> io::Result<(u16, u16)> {
        Ok(self.state.lock().size)
    }

    fn enable_raw_mode(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.raw_mode {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "raw mode already owned",
            ));
        }
        state.raw_mode = true;
        state.ops.push(TerminalOp::EnableRawMode);
        Ok(())
    }

    fn disable_raw_mode(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.raw_mode {
            state.raw_mode = false;
            state.ops.push(TerminalOp::DisableRawMode);
        }
        Ok(())
    }

    fn is_raw_mode_enabled(&self) -> bool {
        self.state.lock().raw_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_releases_on_drop() {
        let terminal = Arc::new(MemoryTerminal::new());
        {
            let _guard = RawModeGuard::acquire(terminal.clone()).unwrap();
            assert!(terminal.is_raw_mode_enabled());
        }
        assert!(!terminal.is_raw_mode_enabled());
        assert_eq!(
            terminal.ops(),
            vec![TerminalOp::EnableRawMode, TerminalOp::DisableRawMode]
        );
    }

    #[test]
    fn test_second_acquire_is_rejected() {
        let terminal = Arc::new(MemoryTerminal::new());
        let _first = RawModeGuard::acquire(terminal.clone()).unwrap();
        let err = RawModeGuard::acquire(terminal.clone()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        // the failed attempt must not have released the first owner
        assert!(terminal.is_raw_mode_enabled());
    }

    #[test]
    fn test_memory_terminal_records_output() {
        let terminal = MemoryTerminal::with_size(40, 10);
        terminal.write("hello ").unwrap();
        terminal.write("world").unwrap();
        terminal.hide_cursor().unwrap();
        assert_eq!(terminal.output(), "hello world");
        assert!(!terminal.is_cursor_visible());
        assert_eq!(terminal.size().unwrap(), (40, 10));

        terminal.clear_recording();
        assert!(terminal.ops().is_empty());
    }
}
