//! Prompts
//!
//! Small interactive widgets for page `render` implementations. Each prompt
//! draws itself, consumes keys until it has an answer, and returns it. A
//! prompt holds one key listener for its whole lifetime, so keys typed
//! faster than the prompt redraws are queued rather than lost.
//!
//! `Escape` aborts any prompt with [`CliError::Rejected`]; a session cleanup
//! while a prompt is waiting surfaces as [`CliError::Cancelled`].

use tokio::sync::mpsc;
use unicode_width::UnicodeWidthChar;

use crate::cli::{InteractiveCli, ListenerGuard};
use crate::controlled::{Pending, Resolver};
use crate::error::CliError;
use crate::key::{Key, KeyCode};
use crate::validation::ValidationResult;

fn aborted() -> CliError {
    CliError::Rejected("prompt aborted".to_string())
}

/// Keys delivered to one prompt, in arrival order
///
/// The registered controlled future is never settled by the reader itself;
/// it exists so a session cleanup can cancel the prompt.
struct KeyReader {
    keys: mpsc::UnboundedReceiver<Key>,
    cancelled: Pending<()>,
    _resolver: Resolver<()>,
    _listener: ListenerGuard,
}

impl KeyReader {
    fn new(cli: &InteractiveCli) -> Self {
        let (tx, keys) = mpsc::unbounded_channel();
        let (resolver, cancelled) = cli.create_controlled::<()>();
        let listener = cli.scoped_listener(move |key| {
            // a closed receiver means the prompt already returned
            let _ = tx.send(*key);
            Ok(())
        });
        Self {
            keys,
            cancelled,
            _resolver: resolver,
            _listener: listener,
        }
    }

    async fn next(&mut self) -> Result<Key, CliError> {
        tokio::select! {
            biased;
            settled = &mut self.cancelled => Err(settled.err().unwrap_or(CliError::Cancelled)),
            key = self.keys.recv() => key.ok_or(CliError::Cancelled),
        }
    }
}

/// Ask a yes/no question
///
/// `y`/`n` answer directly; `Enter` picks `default`.
///
/// # Errors
///
/// `Rejected` on `Escape`, `Cancelled` on cleanup.
pub async fn confirm(cli: &InteractiveCli, question: &str, default: bool) -> Result<bool, CliError> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    cli.write(&format!("{question} {hint} "))?;

    let mut keys = KeyReader::new(cli);
    let answer = loop {
        let key = keys.next().await?;
        match key.code {
            KeyCode::Enter => break default,
            KeyCode::Escape => return Err(aborted()),
            KeyCode::Char('y' | 'Y') if key.printable().is_some() => break true,
            KeyCode::Char('n' | 'N') if key.printable().is_some() => break false,
            _ => {}
        }
    };

    cli.write_line(if answer { "yes" } else { "no" })?;
    Ok(answer)
}

/// Pick one of `options`; returns its index
///
/// Arrow keys or `j`/`k` move, digits `1`-`9` jump, `Enter` accepts.
///
/// # Errors
///
/// `Rejected` on `Escape` or when `options` is empty, `Cancelled` on cleanup.
pub async fn select<T: AsRef<str>>(
    cli: &InteractiveCli,
    question: &str,
    options: &[T],
    initial: usize,
) -> Result<usize, CliError> {
    if options.is_empty() {
        return Err(CliError::Rejected("nothing to select".to_string()));
    }
    let mut selected = initial.min(options.len() - 1);
    let height = u16::try_from(options.len()).unwrap_or(u16::MAX);

    cli.write_line(question)?;
    draw_options(cli, options, selected)?;

    let mut keys = KeyReader::new(cli);
    loop {
        let key = keys.next().await?;
        let next = match key.code {
            KeyCode::Enter => return Ok(selected),
            KeyCode::Escape => return Err(aborted()),
            KeyCode::Up | KeyCode::Char('k') => selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => (selected + 1).min(options.len() - 1),
            KeyCode::Home => 0,
            KeyCode::End => options.len() - 1,
            KeyCode::Char(c) => match c.to_digit(10) {
                Some(d) if d >= 1 && (d as usize) <= options.len() => d as usize - 1,
                _ => continue,
            },
            _ => continue,
        };

        if next != selected {
            selected = next;
            cli.move_up(height)?;
            draw_options(cli, options, selected)?;
        }
    }
}

fn draw_options<T: AsRef<str>>(
    cli: &InteractiveCli,
    options: &[T],
    selected: usize,
) -> Result<(), CliError> {
    for (index, option) in options.iter().enumerate() {
        cli.clear_line()?;
        let marker = if index == selected { '>' } else { ' ' };
        cli.write_line(&format!("{marker} {}", option.as_ref()))?;
    }
    Ok(())
}

/// Read a line of text
///
/// An empty answer falls back to `default`. When `validate` rejects the
/// answer its errors are shown and editing continues.
///
/// # Errors
///
/// `Rejected` on `Escape`, `Cancelled` on cleanup.
pub async fn input(
    cli: &InteractiveCli,
    question: &str,
    default: Option<&str>,
    validate: Option<&(dyn Fn(&str) -> ValidationResult + Send + Sync)>,
) -> Result<String, CliError> {
    let prompt = match default {
        Some(d) => format!("{question} ({d}): "),
        None => format!("{question}: "),
    };
    cli.write(&prompt)?;

    let mut buffer = String::new();
    let mut keys = KeyReader::new(cli);
    loop {
        let key = keys.next().await?;
        match key.code {
            KeyCode::Escape => return Err(aborted()),
            KeyCode::Backspace => {
                if let Some(c) = buffer.pop() {
                    // wide characters occupy two cells
                    let cells = c.width().unwrap_or(0);
                    cli.write(&"\u{8} \u{8}".repeat(cells))?;
                }
            }
            KeyCode::Enter => {
                let answer = if buffer.is_empty() {
                    default.unwrap_or_default().to_string()
                } else {
                    buffer.clone()
                };

                let verdict = validate.map_or_else(ValidationResult::ok, |v| v(&answer));
                if verdict.is_valid {
                    cli.write_line("")?;
                    return Ok(answer);
                }

                cli.write_line("")?;
                for error in &verdict.errors {
                    cli.write_line(&format!("  ! {error}"))?;
                }
                buffer.clear();
                cli.write(&prompt)?;
            }
            _ => {
                if let Some(c) = key.printable() {
                    buffer.push(c);
                    cli.write(&c.to_string())?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::terminal::MemoryTerminal;

    /// Deliver all `keys` at once as soon as a prompt is listening
    fn feed(cli: &InteractiveCli, keys: Vec<Key>) -> tokio::task::JoinHandle<()> {
        let cli = cli.clone();
        tokio::spawn(async move {
            while cli.listener_count() == 0 {
                tokio::task::yield_now().await;
            }
            for key in keys {
                cli.emit_key(&key);
            }
        })
    }

    fn session() -> (Arc<MemoryTerminal>, InteractiveCli) {
        let terminal = Arc::new(MemoryTerminal::new());
        let cli = InteractiveCli::new(terminal.clone());
        (terminal, cli)
    }

    #[tokio::test]
    async fn test_confirm_answers() {
        let (terminal, cli) = session();
        feed(&cli, vec![Key::char('x'), Key::char('y')]);
        assert_eq!(confirm(&cli, "Tag release?", false).await, Ok(true));
        assert!(terminal.output().starts_with("Tag release? [y/N] "));

        feed(&cli, vec![Key::new(KeyCode::Enter)]);
        assert_eq!(confirm(&cli, "Push?", false).await, Ok(false));
    }

    #[tokio::test]
    async fn test_confirm_escape_rejects() {
        let (_terminal, cli) = session();
        feed(&cli, vec![Key::new(KeyCode::Escape)]);
        assert!(matches!(
            confirm(&cli, "Sure?", true).await,
            Err(CliError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_select_moves_and_accepts() {
        let (terminal, cli) = session();
        feed(
            &cli,
            vec![
                Key::new(KeyCode::Down),
                Key::new(KeyCode::Down),
                Key::new(KeyCode::Down),
                Key::new(KeyCode::Up),
                Key::new(KeyCode::Enter),
            ],
        );
        let choice = select(&cli, "Bump", &["patch", "minor", "major"], 0).await;
        assert_eq!(choice, Ok(1));
        assert!(terminal.output().contains("> minor"));
    }

    #[tokio::test]
    async fn test_select_digit_jump() {
        let (_terminal, cli) = session();
        feed(&cli, vec![Key::char('3'), Key::new(KeyCode::Enter)]);
        assert_eq!(select(&cli, "Bump", &["a", "b", "c"], 0).await, Ok(2));
    }

    #[tokio::test]
    async fn test_input_edit_default_and_validation() {
        let (terminal, cli) = session();
        let not_main = |s: &str| {
            if s == "main" {
                ValidationResult::error("cannot release from main")
            } else {
                ValidationResult::ok()
            }
        };

        feed(&cli, vec![Key::new(KeyCode::Enter)]);
        let answer = input(&cli, "Branch", Some("main"), None).await;
        assert_eq!(answer, Ok("main".to_string()));

        feed(
            &cli,
            vec![
                Key::new(KeyCode::Enter),
                Key::char('d'),
                Key::char('e'),
                Key::char('x'),
                Key::new(KeyCode::Backspace),
                Key::char('v'),
                Key::new(KeyCode::Enter),
            ],
        );
        let answer = input(&cli, "Branch", Some("main"), Some(&not_main)).await;
        assert_eq!(answer, Ok("dev".to_string()));
        assert!(terminal.output().contains("! cannot release from main"));
    }

    #[tokio::test]
    async fn test_prompt_cancelled_by_cleanup() {
        let (_terminal, cli) = session();
        let waiting = cli.clone();
        let task = tokio::spawn(async move { confirm(&waiting, "Wait?", true).await });

        while cli.pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        cli.cleanup();
        assert_eq!(task.await.unwrap(), Err(CliError::Cancelled));
    }

    #[tokio::test]
    async fn test_backspace_erases_wide_character() {
        let (terminal, cli) = session();
        feed(
            &cli,
            vec![
                Key::char('日'),
                Key::new(KeyCode::Backspace),
                Key::char('a'),
                Key::new(KeyCode::Enter),
            ],
        );
        assert_eq!(input(&cli, "Name", None, None).await, Ok("a".to_string()));
        assert!(terminal.output().contains("日\u{8} \u{8}\u{8} \u{8}a"));
    }

    #[tokio::test]
    async fn test_prompt_releases_listener() {
        let (_terminal, cli) = session();
        feed(&cli, vec![Key::char('n')]);
        assert_eq!(confirm(&cli, "Again?", true).await, Ok(false));
        assert_eq!(cli.listener_count(), 0);
        assert_eq!(cli.pending_count(), 0);
    }
}
