//! Integration Test: Layering Rules
//!
//! **Policy**: `pageflow-core` is headless. It must not depend on a terminal
//! library or write to the process's stdout; surfaces plug in through
//! `TerminalBackend`.

use architectural_enforcement::{assert_clean, rust_files, scan_dir, workspace_root};

#[test]
fn test_sources_are_found() {
    assert!(
        !rust_files("pageflow/core/src").is_empty(),
        "no sources under {}",
        workspace_root().display()
    );
}

#[test]
fn test_core_has_no_terminal_library() {
    let violations = scan_dir("pageflow/core/src", |code| code.contains("crossterm::"));
    assert_clean("core must not use crossterm", &violations);

    let manifest = std::fs::read_to_string(workspace_root().join("pageflow/core/Cargo.toml"))
        .expect("core manifest");
    assert!(
        !manifest.contains("crossterm"),
        "core Cargo.toml must not depend on crossterm"
    );
}

#[test]
fn test_core_never_prints() {
    let violations = scan_dir("pageflow/core/src", |code| {
        code.contains("println!")
            || code.contains("print!(")
            || code.contains("std::io::stdout")
            || code.contains("io::stdout()")
    });
    assert_clean("core output must go through TerminalBackend", &violations);
}

#[test]
fn test_no_thread_sleep() {
    let mut violations = scan_dir("pageflow/core/src", |code| {
        code.contains("std::thread::sleep") || code.contains("thread::sleep(")
    });
    violations.extend(scan_dir("pageflow/term/src", |code| {
        code.contains("std::thread::sleep") || code.contains("thread::sleep(")
    }));
    assert_clean("use tokio timers instead of blocking sleeps", &violations);
}
