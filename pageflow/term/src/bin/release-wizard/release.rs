//! Release state, actions and the reducer that applies them

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use pageflow_core::{Action, ValidationResult};

/// A `major.minor.patch` version
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("expected MAJOR.MINOR.PATCH, got '{0}'")]
    Shape(String),
    #[error("'{0}' is not a number")]
    Number(String),
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('v');
        let parts: Vec<&str> = trimmed.split('.').collect();
        let [major, minor, patch] = parts.as_slice() else {
            return Err(VersionError::Shape(s.to_string()));
        };
        let number = |part: &str| {
            part.parse::<u64>()
                .map_err(|_| VersionError::Number(part.to_string()))
        };
        Ok(Self {
            major: number(major)?,
            minor: number(minor)?,
            patch: number(patch)?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Bump {
    #[default]
    Patch,
    Minor,
    Major,
}

impl Bump {
    pub const ALL: [Bump; 3] = [Bump::Patch, Bump::Minor, Bump::Major];

    pub fn label(self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Minor => "minor",
            Self::Major => "major",
        }
    }

    pub fn apply(self, v: Version) -> Version {
        match self {
            Self::Patch => Version {
                patch: v.patch + 1,
                ..v
            },
            Self::Minor => Version {
                minor: v.minor + 1,
                patch: 0,
                ..v
            },
            Self::Major => Version {
                major: v.major + 1,
                minor: 0,
                patch: 0,
            },
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|b| *b == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1).min(Self::ALL.len() - 1)]
    }

    pub fn prev(self) -> Self {
        Self::ALL[self.index().saturating_sub(1)]
    }
}

/// Everything the wizard collects
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Release {
    pub current: Version,
    pub branch: String,
    pub branch_submitted: bool,
    pub bump: Bump,
    pub bump_chosen: bool,
    pub confirmed: Option<bool>,
    pub actions_seen: u64,
}

impl Release {
    pub fn new(current: Version, branch: impl Into<String>) -> Self {
        Self {
            current,
            branch: branch.into(),
            branch_submitted: false,
            bump: Bump::default(),
            bump_chosen: false,
            confirmed: None,
            actions_seen: 0,
        }
    }

    pub fn next_version(&self) -> Version {
        self.bump.apply(self.current)
    }

    pub fn tag(&self) -> String {
        format!("v{}", self.next_version())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReleaseAction {
    BranchChar(char),
    BranchBackspace,
    SubmitBranch,
    SelectBump(Bump),
    ChooseBump,
    Confirm(bool),
}

impl Action for ReleaseAction {
    fn kind(&self) -> &str {
        match self {
            Self::BranchChar(_) => "BRANCH_CHAR",
            Self::BranchBackspace => "BRANCH_BACKSPACE",
            Self::SubmitBranch => "SUBMIT_BRANCH",
            Self::SelectBump(_) => "SELECT_BUMP",
            Self::ChooseBump => "CHOOSE_BUMP",
            Self::Confirm(_) => "CONFIRM",
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::BranchChar(c) if c.is_control() => Err(format!("{c:?} is not a branch character")),
            _ => Ok(()),
        }
    }
}

pub fn apply(state: &Release, action: &ReleaseAction) -> Release {
    let mut next = state.clone();
    match action {
        ReleaseAction::BranchChar(c) => {
            next.branch.push(*c);
            next.branch_submitted = false;
        }
        ReleaseAction::BranchBackspace => {
            next.branch.pop();
            next.branch_submitted = false;
        }
        ReleaseAction::SubmitBranch => next.branch_submitted = true,
        ReleaseAction::SelectBump(bump) => next.bump = *bump,
        ReleaseAction::ChooseBump => {
            next.bump_chosen = true;
            next.confirmed = None;
        }
        ReleaseAction::Confirm(yes) => {
            next.confirmed = Some(*yes);
            if !yes {
                next.bump_chosen = false;
            }
        }
    }
    next
}

/// Git-style branch name rules
pub fn check_branch(name: &str) -> ValidationResult {
    let rules: [&dyn Fn(&str) -> ValidationResult; 3] = [
        &|n: &str| {
            if n.is_empty() {
                ValidationResult::error("branch name is empty")
            } else {
                ValidationResult::ok()
            }
        },
        &|n: &str| {
            if n.chars().any(char::is_whitespace) {
                ValidationResult::error("branch name contains whitespace")
            } else {
                ValidationResult::ok()
            }
        },
        &|n: &str| {
            if n.starts_with('-') || n.contains("..") || n.ends_with('/') {
                ValidationResult::error(format!("'{n}' is not a valid ref name"))
            } else {
                ValidationResult::ok()
            }
        },
    ];
    ValidationResult::all(name, &rules)
}
