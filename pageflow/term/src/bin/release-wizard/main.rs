//! Release Wizard - Guided Release Tagging
//!
//! A four-page interactive flow built on pageflow: pick the release branch,
//! choose the version bump, confirm, and get the tag command to run.
//!
//! # Usage
//!
//! ```bash
//! # Start from version 1.4.2 on main
//! release-wizard --current 1.4.2
//!
//! # With a config file and debug events
//! release-wizard --config ./pageflow.toml --debug
//!
//! # Log to a file while the wizard owns the screen
//! release-wizard --current 1.4.2 --log-file /tmp/release-wizard.log
//! ```
//!
//! # Keys
//!
//! - `ctrl+c`: exit at any time
//! - `?`: help overlay

mod audit;
mod pages;
mod release;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use pageflow_core::{
    default_config_path, load_options_from_path, reducer, Framework, FrameworkOptions, LogLevel,
    OptionsOverrides, RenderMode,
};
use pageflow_term::{has_tty, install_panic_hook, run_interactive, CrosstermTerminal};

use audit::AuditPlugin;
use pages::{BranchPage, BumpPage, ConfirmPage, DonePage};
use release::{Release, Version};

/// Release Wizard - guided release tagging
#[derive(Parser, Debug)]
#[command(name = "release-wizard")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Version being released from
    #[arg(long, default_value = "0.1.0", value_name = "VERSION")]
    current: Version,

    /// Pre-filled release branch
    #[arg(short = 'b', long, default_value = "main")]
    branch: String,

    /// Configuration file path
    #[arg(short = 'c', long, env = "PAGEFLOW_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit framework debug events
    #[arg(short = 'd', long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<LogLevel>,

    /// Render mode (immediate, debounced, throttled)
    #[arg(long)]
    render_mode: Option<RenderMode>,

    /// Disable navigation history
    #[arg(long)]
    no_history: bool,

    /// Write logs here instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> OptionsOverrides {
        OptionsOverrides {
            debug: self.debug.then_some(true),
            log_level: self.log_level,
            render_mode: self.render_mode,
            enable_history: self.no_history.then_some(false),
        }
    }
}

/// Initialize logging from the resolved options
///
/// `RUST_LOG` wins over the configured level.
fn init_logging(options: &FrameworkOptions, log_file: Option<&Path>) -> Result<()> {
    let level = options.log_level.as_directive();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "release_wizard={level},pageflow_core={level},pageflow_term={level}"
        ))
    });

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut options = load_options_from_path(args.config.clone().or_else(default_config_path))
        .context("Failed to load configuration")?;
    args.overrides().apply(&mut options);
    init_logging(&options, args.log_file.as_deref())?;

    if !has_tty() {
        eprintln!("Error: release-wizard requires a terminal (TTY)");
        std::process::exit(1);
    }

    info!(
        current = %args.current,
        source = ?options.source(),
        "Starting release wizard"
    );

    let framework = Framework::builder()
        .options(options)
        .initial_state(Release::new(args.current, args.branch.clone()))
        .reducer("release", reducer(release::apply))
        .page(BranchPage)
        .page(BumpPage)
        .page(ConfirmPage)
        .page(DonePage)
        .plugin(AuditPlugin)
        .terminal(Arc::new(CrosstermTerminal::new()))
        .build()
        .await?;

    install_panic_hook();
    let release = run_interactive(&framework).await?;

    if release.confirmed == Some(true) {
        println!(
            "\nTag {} on {} ({} actions recorded)\n",
            release.tag(),
            release.branch,
            release.actions_seen
        );
    } else {
        println!("\nRelease cancelled\n");
    }
    Ok(())
}
