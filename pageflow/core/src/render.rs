//! Rendering
//!
//! Pages draw their own bodies; this module covers what surrounds them:
//!
//! - [`Renderer`] - named drawing hooks contributed by the builder or
//!   plugins. A renderer registered under [`HEADER_RENDERER`] replaces
//!   [`DefaultHeader`].
//! - [`RenderScheduler`] - applies the configured [`RenderMode`] before each
//!   redraw.
//! - [`render_help`] - the help overlay shown by the help hotkey.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use unicode_width::UnicodeWidthStr;

use crate::cli::InteractiveCli;
use crate::error::CliError;
use crate::key::Key;
use crate::page::PageInfo;
use crate::store::State;

/// Renderer name that replaces the default page header
pub const HEADER_RENDERER: &str = "header";

/// Named drawing hook
pub trait Renderer<S: State>: Send + Sync {
    /// Draw for `page` in `state`
    fn render(&self, cli: &InteractiveCli, page: &PageInfo, state: &S) -> anyhow::Result<()>;
}

impl<S: State, F> Renderer<S> for F
where
    F: Fn(&InteractiveCli, &PageInfo, &S) -> anyhow::Result<()> + Send + Sync,
{
    fn render(&self, cli: &InteractiveCli, page: &PageInfo, state: &S) -> anyhow::Result<()> {
        self(cli, page, state)
    }
}

/// Title line, rule and wrapped description
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHeader;

impl<S: State> Renderer<S> for DefaultHeader {
    fn render(&self, cli: &InteractiveCli, page: &PageInfo, _state: &S) -> anyhow::Result<()> {
        let (columns, _) = cli.size()?;
        let width = usize::from(columns.max(20));

        let title = match &page.icon {
            Some(icon) => format!("{icon} {}", page.title),
            None => page.title.clone(),
        };
        cli.write_line(&title)?;
        cli.write_line(&"─".repeat(title.width().min(width)))?;

        if let Some(description) = &page.description {
            for line in textwrap::wrap(description, width) {
                cli.write_line(&line)?;
            }
        }
        cli.write_line("")?;
        Ok(())
    }
}

/// When redraws happen after a state change
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Redraw right away
    #[default]
    Immediate,
    /// Redraw once changes have been quiet for the render delay
    Debounced,
    /// Redraw at most once per render delay
    Throttled,
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Immediate => "immediate",
            Self::Debounced => "debounced",
            Self::Throttled => "throttled",
        })
    }
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Self::Immediate),
            "debounced" => Ok(Self::Debounced),
            "throttled" => Ok(Self::Throttled),
            other => Err(format!("unknown render mode '{other}'")),
        }
    }
}

/// Paces redraws according to a [`RenderMode`]
#[derive(Debug)]
pub struct RenderScheduler {
    mode: RenderMode,
    delay: Duration,
    last_render: Option<Instant>,
}

impl RenderScheduler {
    /// Create a scheduler
    #[must_use]
    pub fn new(mode: RenderMode, delay: Duration) -> Self {
        Self {
            mode,
            delay,
            last_render: None,
        }
    }

    /// The configured mode
    #[must_use]
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Wait until a redraw is allowed
    ///
    /// `changes` ticks on every state change. Debounced mode keeps waiting
    /// while it keeps ticking.
    pub async fn wait(&mut self, changes: &mut watch::Receiver<u64>) {
        match self.mode {
            RenderMode::Immediate => {}
            RenderMode::Debounced => {
                while let Ok(Ok(())) = tokio::time::timeout(self.delay, changes.changed()).await {}
            }
            RenderMode::Throttled => {
                if let Some(last) = self.last_render {
                    tokio::time::sleep_until(last + self.delay).await;
                }
            }
        }
    }

    /// Note that a redraw just happened
    pub fn mark_rendered(&mut self) {
        self.last_render = Some(Instant::now());
    }
}

/// Write the help overlay: pages in order, current page marked, hotkeys
///
/// # Errors
///
/// Terminal write failures.
pub fn render_help(
    cli: &InteractiveCli,
    pages: &[PageInfo],
    current: Option<&str>,
    exit_keys: &[Key],
    help_key: Option<&Key>,
) -> Result<(), CliError> {
    let width = usize::from(cli.size()?.0.max(20));

    cli.write_line("")?;
    cli.write_line("Help")?;
    cli.write_line("────")?;
    for (index, page) in pages.iter().enumerate() {
        let marker = if Some(page.id.as_str()) == current {
            '>'
        } else {
            ' '
        };
        let line = format!("{marker} {}. {} ({})", index + 1, page.title, page.id);
        for wrapped in textwrap::wrap(&line, width) {
            cli.write_line(&wrapped)?;
        }
    }

    cli.write_line("")?;
    if !exit_keys.is_empty() {
        let keys: Vec<String> = exit_keys.iter().map(ToString::to_string).collect();
        cli.write_line(&format!("  {:<12} exit", keys.join(", ")))?;
    }
    if let Some(key) = help_key {
        cli.write_line(&format!("  {:<12} help", key.to_string()))?;
    }
    Ok(())
}
