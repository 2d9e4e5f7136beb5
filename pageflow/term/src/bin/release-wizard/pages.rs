//! The four wizard pages
//!
//! The first three pages are driven by keys: `handle_key` turns a press
//! into a [`ReleaseAction`], and `next_action` reads the resulting state to
//! decide whether to move on. The last page asks its question while
//! rendering and then ends the run.

use async_trait::async_trait;
use serde_json::json;

use pageflow_core::{
    prompt, CliError, InteractiveCli, Key, KeyCode, Page, PageAction, PageId, ValidationResult,
};

use crate::release::{check_branch, Bump, Release, ReleaseAction};

pub const STEPS: u64 = 4;

pub struct BranchPage;

#[async_trait]
impl Page<Release, ReleaseAction> for BranchPage {
    fn id(&self) -> PageId {
        PageId::new("branch")
    }

    fn title(&self) -> &str {
        "Release branch"
    }

    fn description(&self) -> Option<&str> {
        Some("Type the branch to release from and press Enter.")
    }

    fn icon(&self) -> Option<&str> {
        Some("⎇")
    }

    fn metadata(&self) -> Option<serde_json::Value> {
        Some(json!({ "step": 1 }))
    }

    async fn render(&self, cli: &InteractiveCli, state: &Release) -> anyhow::Result<()> {
        cli.write_line(&format!("Branch: {}_", state.branch))?;
        Ok(())
    }

    fn handle_key(&self, key: &Key, _state: &Release) -> Option<ReleaseAction> {
        match key.code {
            KeyCode::Enter => Some(ReleaseAction::SubmitBranch),
            KeyCode::Backspace => Some(ReleaseAction::BranchBackspace),
            _ => key.printable().map(ReleaseAction::BranchChar),
        }
    }

    fn next_action(&self, state: &Release) -> PageAction<ReleaseAction> {
        if state.branch_submitted {
            PageAction::NextPage
        } else {
            PageAction::ReRender
        }
    }

    fn validate(&self, state: &Release) -> ValidationResult {
        check_branch(&state.branch)
    }
}

pub struct BumpPage;

#[async_trait]
impl Page<Release, ReleaseAction> for BumpPage {
    fn id(&self) -> PageId {
        PageId::new("bump")
    }

    fn title(&self) -> &str {
        "Version bump"
    }

    fn description(&self) -> Option<&str> {
        Some("Pick which part of the version to increase. Up/Down to move, Enter to choose.")
    }

    fn metadata(&self) -> Option<serde_json::Value> {
        Some(json!({ "step": 2 }))
    }

    async fn render(&self, cli: &InteractiveCli, state: &Release) -> anyhow::Result<()> {
        cli.write_line(&format!("Current version: {}", state.current))?;
        cli.write_line("")?;
        for bump in Bump::ALL {
            let marker = if bump == state.bump { '>' } else { ' ' };
            cli.write_line(&format!(
                "{marker} {:<6} -> {}",
                bump.label(),
                bump.apply(state.current)
            ))?;
        }
        Ok(())
    }

    fn handle_key(&self, key: &Key, state: &Release) -> Option<ReleaseAction> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => Some(ReleaseAction::SelectBump(state.bump.prev())),
            KeyCode::Down | KeyCode::Char('j') => {
                Some(ReleaseAction::SelectBump(state.bump.next()))
            }
            KeyCode::Enter => Some(ReleaseAction::ChooseBump),
            _ => None,
        }
    }

    fn next_action(&self, state: &Release) -> PageAction<ReleaseAction> {
        if state.bump_chosen {
            PageAction::NextPage
        } else {
            PageAction::ReRender
        }
    }
}

pub struct ConfirmPage;

#[async_trait]
impl Page<Release, ReleaseAction> for ConfirmPage {
    fn id(&self) -> PageId {
        PageId::new("confirm")
    }

    fn title(&self) -> &str {
        "Confirm"
    }

    fn metadata(&self) -> Option<serde_json::Value> {
        Some(json!({ "step": 3 }))
    }

    async fn render(&self, cli: &InteractiveCli, state: &Release) -> anyhow::Result<()> {
        cli.write_line(&format!("Branch:  {}", state.branch))?;
        cli.write_line(&format!(
            "Version: {} -> {} ({})",
            state.current,
            state.next_version(),
            state.bump.label()
        ))?;
        cli.write_line(&format!("Tag:     {}", state.tag()))?;
        cli.write_line("")?;
        cli.write_line("Create this release? [y/n]")?;
        Ok(())
    }

    fn handle_key(&self, key: &Key, _state: &Release) -> Option<ReleaseAction> {
        match key.printable() {
            Some('y' | 'Y') => Some(ReleaseAction::Confirm(true)),
            Some('n' | 'N') => Some(ReleaseAction::Confirm(false)),
            _ => None,
        }
    }

    fn next_action(&self, state: &Release) -> PageAction<ReleaseAction> {
        match state.confirmed {
            Some(true) => PageAction::NextPage,
            Some(false) => PageAction::PrevPage,
            None => PageAction::ReRender,
        }
    }

    fn can_navigate_to(&self, target: &PageId, state: &Release) -> bool {
        // only leave forward once confirmed
        target.as_str() != "done" || state.confirmed == Some(true)
    }
}

pub struct DonePage;

#[async_trait]
impl Page<Release, ReleaseAction> for DonePage {
    fn id(&self) -> PageId {
        PageId::new("done")
    }

    fn title(&self) -> &str {
        "Ready"
    }

    fn icon(&self) -> Option<&str> {
        Some("✔")
    }

    fn metadata(&self) -> Option<serde_json::Value> {
        Some(json!({ "step": 4 }))
    }

    async fn render(&self, cli: &InteractiveCli, state: &Release) -> anyhow::Result<()> {
        let push = match prompt::confirm(cli, "Push the tag as well?", true).await {
            Ok(push) => push,
            Err(CliError::Rejected(_)) => false,
            Err(e) => return Err(e.into()),
        };

        cli.write_line("")?;
        cli.write_line("Run:")?;
        cli.write_line(&format!(
            "  git tag -a {tag} -m \"Release {tag}\" {branch}",
            tag = state.tag(),
            branch = state.branch
        ))?;
        if push {
            cli.write_line(&format!("  git push origin {}", state.tag()))?;
        }
        Ok(())
    }

    fn next_action(&self, _state: &Release) -> PageAction<ReleaseAction> {
        PageAction::Exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::Version;

    fn release() -> Release {
        Release::new(
            Version {
                major: 1,
                minor: 4,
                patch: 2,
            },
            "main",
        )
    }

    #[test]
    fn test_branch_keys() {
        let state = release();
        assert_eq!(
            BranchPage.handle_key(&Key::char('x'), &state),
            Some(ReleaseAction::BranchChar('x'))
        );
        assert_eq!(
            BranchPage.handle_key(&Key::ctrl('x'), &state),
            None
        );
        assert_eq!(
            BranchPage.handle_key(&Key::new(KeyCode::Enter), &state),
            Some(ReleaseAction::SubmitBranch)
        );
    }

    #[test]
    fn test_bump_selection_keys() {
        let state = release();
        assert_eq!(
            BumpPage.handle_key(&Key::new(KeyCode::Down), &state),
            Some(ReleaseAction::SelectBump(Bump::Minor))
        );
        assert_eq!(BumpPage.next_action(&state), PageAction::ReRender);
    }

    #[test]
    fn test_confirm_decides_direction() {
        let mut state = release();
        assert_eq!(ConfirmPage.next_action(&state), PageAction::ReRender);
        assert!(!ConfirmPage.can_navigate_to(&PageId::new("done"), &state));

        state.confirmed = Some(false);
        assert_eq!(ConfirmPage.next_action(&state), PageAction::PrevPage);

        state.confirmed = Some(true);
        assert_eq!(ConfirmPage.next_action(&state), PageAction::NextPage);
        assert!(ConfirmPage.can_navigate_to(&PageId::new("done"), &state));
    }

    #[test]
    fn test_declining_waits_on_bump_page() {
        let mut state = release();
        state.bump_chosen = true;
        let state = crate::release::apply(&state, &ReleaseAction::Confirm(false));

        // back on the bump page, nothing moves until a new choice is made
        assert_eq!(ConfirmPage.next_action(&state), PageAction::PrevPage);
        assert_eq!(BumpPage.next_action(&state), PageAction::ReRender);
    }
}
