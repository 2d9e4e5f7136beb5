//! Architectural Enforcement Integration Tests
//!
//! This package scans the workspace sources and enforces the layering rules
//! the crates rely on:
//! - `pageflow-core` stays terminal-agnostic (no crossterm)
//! - core never writes to stdout directly; all output goes through a
//!   `TerminalBackend`
//! - no thread sleeps in production code
//!
//! The scanning helpers live here so each rule's test stays short.

use std::fs;
use std::path::{Path, PathBuf};

/// A source line that broke a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File containing the line
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// The offending line, trimmed
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Workspace root, resolved from this package's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every `.rs` file under `dir` (relative to the workspace root)
#[must_use]
pub fn rust_files(dir: &str) -> Vec<PathBuf> {
    let path = workspace_root().join(dir);
    if !path.exists() {
        return Vec::new();
    }
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.path().to_path_buf())
        .collect()
}

/// Lines of production code in `path` matching `is_violation`
///
/// Comment text and everything from the first `#[cfg(test)]` on are
/// skipped; test modules sit at the bottom of each file.
#[must_use]
pub fn scan_file(path: &Path, is_violation: impl Fn(&str) -> bool) -> Vec<Violation> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    let mut violations = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            break;
        }
        if trimmed.starts_with("//") {
            continue;
        }
        let code = line.split("//").next().unwrap_or(line);
        if is_violation(code) {
            violations.push(Violation {
                path: path.to_path_buf(),
                line: idx + 1,
                text: trimmed.to_string(),
            });
        }
    }
    violations
}

/// Scan every file under `dir` with [`scan_file`]
#[must_use]
pub fn scan_dir(dir: &str, is_violation: impl Fn(&str) -> bool) -> Vec<Violation> {
    rust_files(dir)
        .iter()
        .flat_map(|path| scan_file(path, &is_violation))
        .collect()
}

/// Panic with a readable report when `violations` is non-empty
pub fn assert_clean(rule: &str, violations: &[Violation]) {
    if violations.is_empty() {
        return;
    }
    eprintln!("\n❌ {rule}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!("\nFound {} violation(s) of: {rule}", violations.len());
}
