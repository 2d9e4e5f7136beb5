//! Key Events
//!
//! Terminal-agnostic key model. Surfaces translate their native key events
//! into [`Key`] before handing them to the `InteractiveCli`, so the core never
//! depends on a particular terminal library.
//!
//! Keys also have a textual binding syntax used by the configuration file:
//!
//! ```text
//! q            plain character
//! ctrl+c       modifier + character
//! shift+tab    modifier + named key
//! f1, escape   named keys
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a key binding cannot be parsed
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid key binding '{0}'")]
pub struct KeyParseError(pub String);

/// The key that was pressed, without modifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A printable character
    Char(char),
    /// Enter / Return
    Enter,
    /// Escape
    Escape,
    /// Backspace
    Backspace,
    /// Tab
    Tab,
    /// Shift+Tab as reported by most terminals
    BackTab,
    /// Arrow up
    Up,
    /// Arrow down
    Down,
    /// Arrow left
    Left,
    /// Arrow right
    Right,
    /// Home
    Home,
    /// End
    End,
    /// Page up
    PageUp,
    /// Page down
    PageDown,
    /// Delete
    Delete,
    /// Insert
    Insert,
    /// Function key F1..F24
    F(u8),
}

impl KeyCode {
    fn name(self) -> String {
        match self {
            Self::Char(' ') => "space".to_string(),
            Self::Char(c) => c.to_string(),
            Self::Enter => "enter".to_string(),
            Self::Escape => "escape".to_string(),
            Self::Backspace => "backspace".to_string(),
            Self::Tab => "tab".to_string(),
            Self::BackTab => "backtab".to_string(),
            Self::Up => "up".to_string(),
            Self::Down => "down".to_string(),
            Self::Left => "left".to_string(),
            Self::Right => "right".to_string(),
            Self::Home => "home".to_string(),
            Self::End => "end".to_string(),
            Self::PageUp => "pageup".to_string(),
            Self::PageDown => "pagedown".to_string(),
            Self::Delete => "delete".to_string(),
            Self::Insert => "insert".to_string(),
            Self::F(n) => format!("f{n}"),
        }
    }

    fn parse(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        let code = match lower.as_str() {
            "enter" | "return" => Self::Enter,
            "escape" | "esc" => Self::Escape,
            "backspace" => Self::Backspace,
            "tab" => Self::Tab,
            "backtab" => Self::BackTab,
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "home" => Self::Home,
            "end" => Self::End,
            "pageup" => Self::PageUp,
            "pagedown" => Self::PageDown,
            "delete" | "del" => Self::Delete,
            "insert" | "ins" => Self::Insert,
            "space" => Self::Char(' '),
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Self::Char(c),
                    _ => {
                        let n = lower.strip_prefix('f')?.parse::<u8>().ok()?;
                        if (1..=24).contains(&n) {
                            Self::F(n)
                        } else {
                            return None;
                        }
                    }
                }
            }
        };
        Some(code)
    }
}

/// Modifier keys held during a key press
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    /// Control
    pub ctrl: bool,
    /// Alt / Meta
    pub alt: bool,
    /// Shift
    pub shift: bool,
}

impl Modifiers {
    /// No modifiers held
    pub const NONE: Self = Self {
        ctrl: false,
        alt: false,
        shift: false,
    };

    /// Whether no modifier is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.ctrl && !self.alt && !self.shift
    }
}

/// A single key press
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key {
    /// The key itself
    pub code: KeyCode,
    /// Held modifiers
    pub modifiers: Modifiers,
}

impl Key {
    /// A key without modifiers
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::NONE,
        }
    }

    /// A plain character key
    #[must_use]
    pub const fn char(c: char) -> Self {
        Self::new(KeyCode::Char(c))
    }

    /// Ctrl + character
    #[must_use]
    pub const fn ctrl(c: char) -> Self {
        Self {
            code: KeyCode::Char(c),
            modifiers: Modifiers {
                ctrl: true,
                alt: false,
                shift: false,
            },
        }
    }

    /// Returns the key with the given modifiers
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// The printable character, if this is an unmodified (or shift-only) char key
    #[must_use]
    pub fn printable(&self) -> Option<char> {
        match self.code {
            KeyCode::Char(c) if !self.modifiers.ctrl && !self.modifiers.alt => Some(c),
            _ => None,
        }
    }

    /// Whether a pressed key satisfies this binding
    ///
    /// Shift is ignored for character keys because the character itself
    /// already reflects it (`Q` arrives as `shift+Q` on some terminals).
    /// Control combinations compare case-insensitively.
    #[must_use]
    pub fn matches(&self, pressed: &Key) -> bool {
        match (self.code, pressed.code) {
            (KeyCode::Char(a), KeyCode::Char(b)) => {
                let same_char = if self.modifiers.ctrl || self.modifiers.alt {
                    a.eq_ignore_ascii_case(&b)
                } else {
                    a == b
                };
                same_char
                    && self.modifiers.ctrl == pressed.modifiers.ctrl
                    && self.modifiers.alt == pressed.modifiers.alt
            }
            (a, b) => a == b && self.modifiers == pressed.modifiers,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.ctrl {
            write!(f, "ctrl+")?;
        }
        if self.modifiers.alt {
            write!(f, "alt+")?;
        }
        if self.modifiers.shift {
            write!(f, "shift+")?;
        }
        write!(f, "{}", self.code.name())
    }
}

impl FromStr for Key {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(KeyParseError(s.to_string()));
        }
        // "+" alone and "ctrl++" bind the plus key itself
        let (prefix, last) = match trimmed.strip_suffix("++") {
            Some(rest) => (Some(rest), "+"),
            None if trimmed == "+" => (None, "+"),
            None => match trimmed.rsplit_once('+') {
                Some((rest, last)) => (Some(rest), last),
                None => (None, trimmed),
            },
        };

        let mut modifiers = Modifiers::NONE;
        if let Some(prefix) = prefix {
            for part in prefix.split('+') {
                match part.to_lowercase().as_str() {
                    "ctrl" | "control" => modifiers.ctrl = true,
                    "alt" | "meta" => modifiers.alt = true,
                    "shift" => modifiers.shift = true,
                    _ => return Err(KeyParseError(s.to_string())),
                }
            }
        }

        let code = KeyCode::parse(last).ok_or_else(|| KeyParseError(s.to_string()))?;
        Ok(Self { code, modifiers })
    }
}

impl TryFrom<String> for Key {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bindings() {
        assert_eq!("q".parse::<Key>().unwrap(), Key::char('q'));
        assert_eq!("ctrl+c".parse::<Key>().unwrap(), Key::ctrl('c'));
        assert_eq!("Escape".parse::<Key>().unwrap(), Key::new(KeyCode::Escape));
        assert_eq!("f1".parse::<Key>().unwrap(), Key::new(KeyCode::F(1)));
        assert_eq!("space".parse::<Key>().unwrap(), Key::char(' '));
        assert_eq!("+".parse::<Key>().unwrap(), Key::char('+'));
        assert_eq!("ctrl++".parse::<Key>().unwrap(), Key::ctrl('+'));

        let shift_tab = "shift+tab".parse::<Key>().unwrap();
        assert_eq!(shift_tab.code, KeyCode::Tab);
        assert!(shift_tab.modifiers.shift);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Key>().is_err());
        assert!("hyper+x".parse::<Key>().is_err());
        assert!("f99".parse::<Key>().is_err());
        assert!("notakey".parse::<Key>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_binding_syntax() {
        for binding in ["ctrl+c", "escape", "f12", "?", "alt+enter"] {
            let key: Key = binding.parse().unwrap();
            assert_eq!(key.to_string(), binding);
        }
    }

    #[test]
    fn test_matches_ignores_shift_on_chars() {
        let binding = Key::char('Q');
        let pressed = Key::char('Q').with_modifiers(Modifiers {
            shift: true,
            ..Modifiers::NONE
        });
        assert!(binding.matches(&pressed));
        assert!(!Key::char('q').matches(&pressed));
        assert!(Key::ctrl('c').matches(&Key::ctrl('C')));
        assert!(!Key::ctrl('c').matches(&Key::char('c')));
    }

    #[test]
    fn test_printable() {
        assert_eq!(Key::char('x').printable(), Some('x'));
        assert_eq!(Key::ctrl('x').printable(), None);
        assert_eq!(Key::new(KeyCode::Enter).printable(), None);
    }

    #[test]
    fn test_serde_uses_binding_syntax() {
        #[derive(Deserialize)]
        struct Keys {
            exit: Vec<Key>,
        }
        let keys: Keys = toml::from_str(r#"exit = ["ctrl+c", "q"]"#).unwrap();
        assert_eq!(keys.exit, vec![Key::ctrl('c'), Key::char('q')]);

        let bad: Result<Keys, _> = toml::from_str(r#"exit = ["ctrl+nope"]"#);
        assert!(bad.is_err());
    }
}
