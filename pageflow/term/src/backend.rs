//! Crossterm terminal backend
//!
//! Writes go to stdout through crossterm commands. Raw mode is a process-wide
//! resource, so ownership is tracked in a static flag rather than per
//! backend instance: a second session in the same process gets
//! `AlreadyExists` instead of silently sharing the TTY.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::{cursor, queue, terminal};
use parking_lot::Mutex;

use pageflow_core::TerminalBackend;

static RAW_MODE_OWNED: AtomicBool = AtomicBool::new(false);

/// Restore the terminal without going through a backend
///
/// Used from the panic hook, where the session objects may be mid-drop.
pub fn restore_terminal() {
    if RAW_MODE_OWNED.swap(false, Ordering::SeqCst) {
        let _ = terminal::disable_raw_mode();
    }
    let mut stdout = io::stdout();
    let _ = queue!(stdout, cursor::Show);
    let _ = stdout.flush();
}

/// [`TerminalBackend`] for a real TTY
pub struct CrosstermTerminal {
    out: Mutex<io::Stdout>,
}

impl Default for CrosstermTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CrosstermTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrosstermTerminal")
            .field("raw_mode", &self.is_raw_mode_enabled())
            .finish()
    }
}

impl CrosstermTerminal {
    /// A backend writing to stdout
    #[must_use]
    pub fn new() -> Self {
        Self {
            out: Mutex::new(io::stdout()),
        }
    }
}

impl TerminalBackend for CrosstermTerminal {
    fn write(&self, text: &str) -> io::Result<()> {
        let mut out = self.out.lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    fn clear_screen(&self) -> io::Result<()> {
        let mut out = self.out.lock();
        queue!(
            out,
            terminal::Clear(terminal::ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        out.flush()
    }

    fn clear_line(&self) -> io::Result<()> {
        let mut out = self.out.lock();
        queue!(
            out,
            terminal::Clear(terminal::ClearType::CurrentLine),
            cursor::MoveToColumn(0)
        )?;
        out.flush()
    }

    fn move_to(&self, column: u16, row: u16) -> io::Result<()> {
        let mut out = self.out.lock();
        queue!(out, cursor::MoveTo(column, row))?;
        out.flush()
    }

    fn move_up(&self, lines: u16) -> io::Result<()> {
        if lines == 0 {
            return Ok(());
        }
        let mut out = self.out.lock();
        queue!(out, cursor::MoveUp(lines), cursor::MoveToColumn(0))?;
        out.flush()
    }

    fn hide_cursor(&self) -> io::Result<()> {
        let mut out = self.out.lock();
        queue!(out, cursor::Hide)?;
        out.flush()
    }

    fn show_cursor(&self) -> io::Result<()> {
        let mut out = self.out.lock();
        queue!(out, cursor::Show)?;
        out.flush()
    }

    fn size(&self) -> io::Result<(u16, u16)> {
        terminal::size()
    }

    fn enable_raw_mode(&self) -> io::Result<()> {
        if RAW_MODE_OWNED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "raw mode is owned by another session",
            ));
        }
        if let Err(e) = terminal::enable_raw_mode() {
            RAW_MODE_OWNED.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    fn disable_raw_mode(&self) -> io::Result<()> {
        if RAW_MODE_OWNED.swap(false, Ordering::SeqCst) {
            terminal::disable_raw_mode()?;
        }
        Ok(())
    }

    fn is_raw_mode_enabled(&self) -> bool {
        RAW_MODE_OWNED.load(Ordering::SeqCst)
    }

    fn flush(&self) -> io::Result<()> {
        self.out.lock().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_without_ownership_is_noop() {
        let terminal = CrosstermTerminal::new();
        assert!(!terminal.is_raw_mode_enabled());
        assert!(terminal.disable_raw_mode().is_ok());
        assert!(terminal.move_up(0).is_ok());
    }
}
