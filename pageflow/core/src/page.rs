//! Pages
//!
//! A page is one screen of a wizard-style CLI. The run loop renders the
//! current page, waits for a key, lets the page turn the key into a domain
//! action, dispatches it, then asks the page for its [`PageAction`].
//!
//! Pages are immutable once registered; everything that changes lives in
//! the store's state.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cli::InteractiveCli;
use crate::key::Key;
use crate::store::{Action, State};
use crate::validation::ValidationResult;

/// Unique page identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    /// Create a page id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What the framework should do after a page has handled input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageAction<A> {
    /// Advance to the next page in registry order
    NextPage,
    /// Go to the previous page in registry order
    PrevPage,
    /// Jump to a specific page
    ChangePage(PageId),
    /// Stay and draw the page again
    ReRender,
    /// End the run
    Exit,
    /// Dispatch a domain action, then re-render
    Custom(A),
}

impl<A> PageAction<A> {
    /// Variant name, for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::NextPage => "NEXT_PAGE",
            Self::PrevPage => "PREV_PAGE",
            Self::ChangePage(_) => "CHANGE_PAGE",
            Self::ReRender => "RE_RENDER",
            Self::Exit => "EXIT",
            Self::Custom(_) => "CUSTOM",
        }
    }

    /// Shorthand for [`PageAction::ChangePage`]
    pub fn change_page(target: impl Into<PageId>) -> Self {
        Self::ChangePage(target.into())
    }
}

/// One screen of the CLI
///
/// Only [`id`](Page::id), [`title`](Page::title), [`render`](Page::render)
/// and [`next_action`](Page::next_action) are required; every other hook has
/// a permissive default.
#[async_trait]
pub trait Page<S: State, A: Action>: Send + Sync {
    /// Registry-wide unique id
    fn id(&self) -> PageId;

    /// Title shown in the header
    fn title(&self) -> &str;

    /// Longer text shown under the title
    fn description(&self) -> Option<&str> {
        None
    }

    /// Short glyph shown before the title
    fn icon(&self) -> Option<&str> {
        None
    }

    /// Arbitrary structured data for renderers and plugins
    fn metadata(&self) -> Option<serde_json::Value> {
        None
    }

    /// Draw the page body
    ///
    /// May await controlled futures (prompts); those are cancelled if the
    /// session is cleaned up while the page is rendering.
    async fn render(&self, cli: &InteractiveCli, state: &S) -> anyhow::Result<()>;

    /// Turn a key press into a domain action
    fn handle_key(&self, _key: &Key, _state: &S) -> Option<A> {
        None
    }

    /// Decide what happens after input has been handled
    fn next_action(&self, state: &S) -> PageAction<A>;

    /// Whether leaving this page for `target` is allowed
    fn can_navigate_to(&self, _target: &PageId, _state: &S) -> bool {
        true
    }

    /// Called when the page becomes current
    async fn on_enter(&self, _state: &S) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the page stops being current
    async fn on_exit(&self, _state: &S) -> anyhow::Result<()> {
        Ok(())
    }

    /// Gate for `NEXT_PAGE`
    fn validate(&self, _state: &S) -> ValidationResult {
        ValidationResult::ok()
    }

    /// Whether `NEXT_PAGE`/`PREV_PAGE` should pass over this page
    fn can_skip(&self, _state: &S) -> bool {
        false
    }
}

/// Descriptive snapshot of a page, used by renderers and the help overlay
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PageInfo {
    /// Page id
    pub id: PageId,
    /// Title
    pub title: String,
    /// Description, if any
    pub description: Option<String>,
    /// Icon, if any
    pub icon: Option<String>,
    /// Metadata, if any
    pub metadata: Option<serde_json::Value>,
}

impl PageInfo {
    /// Capture the descriptive fields of a page
    pub fn of<S: State, A: Action>(page: &dyn Page<S, A>) -> Self {
        Self {
            id: page.id(),
            title: page.title().to_string(),
            description: page.description().map(str::to_string),
            icon: page.icon().map(str::to_string),
            metadata: page.metadata(),
        }
    }
}

/// Registration-time capability check
///
/// Ids must be non-empty and free of whitespace and control characters;
/// titles must not be blank.
pub fn check_page<S: State, A: Action>(page: &dyn Page<S, A>) -> Result<(), String> {
    let id = page.id();
    if id.as_str().is_empty() {
        return Err("page id must not be empty".to_string());
    }
    if id
        .as_str()
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(format!("page id '{id}' contains whitespace"));
    }
    if page.title().trim().is_empty() {
        return Err(format!("page '{id}' has an empty title"));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::StaticPage;
    use super::*;
    use crate::store::testing::Counter;

    #[test]
    fn test_page_id_serializes_as_string() {
        let id = PageId::new("branch");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"branch\"");
        assert_eq!(id.to_string(), "branch");
    }

    #[test]
    fn test_page_action_names() {
        assert_eq!(PageAction::<()>::NextPage.name(), "NEXT_PAGE");
        assert_eq!(PageAction::<()>::change_page("x").name(), "CHANGE_PAGE");
    }

    #[test]
    fn test_check_page() {
        let ok = StaticPage::<Counter>::new("ok", PageAction::Exit);
        assert!(check_page::<u32, Counter>(&ok).is_ok());

        let spaced = StaticPage::<Counter>::new("has space", PageAction::Exit);
        assert!(check_page::<u32, Counter>(&spaced).is_err());

        let mut untitled = StaticPage::<Counter>::new("untitled", PageAction::Exit);
        untitled.title = "  ";
        assert!(check_page::<u32, Counter>(&untitled).is_err());
    }
}
