//! Crossterm key events to framework keys
//!
//! Only `Press` events are forwarded; `Release` and `Repeat` are dropped so
//! a single press never counts twice on terminals with the kitty protocol.

use crossterm::event::{Event, EventStream, KeyCode as CtKeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use tokio::task::JoinHandle;

use pageflow_core::{InteractiveCli, Key, KeyCode, Modifiers};

/// Convert a crossterm key event, or `None` for events the framework ignores
#[must_use]
pub fn convert_key(event: &KeyEvent) -> Option<Key> {
    if event.kind != KeyEventKind::Press {
        return None;
    }

    let code = match event.code {
        CtKeyCode::Char(c) => KeyCode::Char(c),
        CtKeyCode::Enter => KeyCode::Enter,
        CtKeyCode::Esc => KeyCode::Escape,
        CtKeyCode::Backspace => KeyCode::Backspace,
        CtKeyCode::Tab => KeyCode::Tab,
        CtKeyCode::BackTab => KeyCode::BackTab,
        CtKeyCode::Up => KeyCode::Up,
        CtKeyCode::Down => KeyCode::Down,
        CtKeyCode::Left => KeyCode::Left,
        CtKeyCode::Right => KeyCode::Right,
        CtKeyCode::Home => KeyCode::Home,
        CtKeyCode::End => KeyCode::End,
        CtKeyCode::PageUp => KeyCode::PageUp,
        CtKeyCode::PageDown => KeyCode::PageDown,
        CtKeyCode::Delete => KeyCode::Delete,
        CtKeyCode::Insert => KeyCode::Insert,
        CtKeyCode::F(n) => KeyCode::F(n),
        _ => return None,
    };

    let modifiers = Modifiers {
        ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
        alt: event.modifiers.contains(KeyModifiers::ALT),
        // the character already carries shift
        shift: event.modifiers.contains(KeyModifiers::SHIFT)
            && !matches!(code, KeyCode::Char(_)),
    };
    Some(Key::new(code).with_modifiers(modifiers))
}

/// Forward terminal key presses to `cli` until the event stream ends
///
/// Abort the returned handle to stop reading.
pub fn spawn_key_pump(cli: InteractiveCli) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = EventStream::new();
        while let Some(event) = events.next().await {
            match event {
                Ok(Event::Key(key_event)) => {
                    if let Some(key) = convert_key(&key_event) {
                        let delivered = cli.emit_key(&key);
                        tracing::trace!(key = %key, delivered, "Key forwarded");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Terminal event stream failed");
                    break;
                }
            }
        }
        tracing::debug!("Key pump stopped");
    })
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyEventState;
    use pretty_assertions::assert_eq;

    use super::*;

    fn event(code: CtKeyCode, modifiers: KeyModifiers, kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_press_only() {
        let press = event(CtKeyCode::Enter, KeyModifiers::NONE, KeyEventKind::Press);
        let release = event(CtKeyCode::Enter, KeyModifiers::NONE, KeyEventKind::Release);
        let repeat = event(CtKeyCode::Enter, KeyModifiers::NONE, KeyEventKind::Repeat);

        assert_eq!(convert_key(&press), Some(Key::new(KeyCode::Enter)));
        assert_eq!(convert_key(&release), None);
        assert_eq!(convert_key(&repeat), None);
    }

    #[test]
    fn test_ctrl_c_matches_exit_binding() {
        let pressed = convert_key(&event(
            CtKeyCode::Char('c'),
            KeyModifiers::CONTROL,
            KeyEventKind::Press,
        ))
        .unwrap();
        assert!(Key::ctrl('c').matches(&pressed));
    }

    #[test]
    fn test_shifted_char_drops_shift() {
        let pressed = convert_key(&event(
            CtKeyCode::Char('?'),
            KeyModifiers::SHIFT,
            KeyEventKind::Press,
        ))
        .unwrap();
        assert_eq!(pressed, Key::char('?'));

        let backtab = convert_key(&event(
            CtKeyCode::BackTab,
            KeyModifiers::SHIFT,
            KeyEventKind::Press,
        ))
        .unwrap();
        assert!(backtab.modifiers.shift);
    }

    #[test]
    fn test_unsupported_keys_ignored() {
        let media = event(CtKeyCode::CapsLock, KeyModifiers::NONE, KeyEventKind::Press);
        assert_eq!(convert_key(&media), None);
    }
}
