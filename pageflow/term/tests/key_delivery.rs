//! Crossterm events reach framework key listeners

use std::sync::Arc;

use crossterm::event::{KeyCode as CtKeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers};
use pretty_assertions::assert_eq;

use pageflow_core::{InteractiveCli, Key, KeyCode, KeyWait, MemoryTerminal};
use pageflow_term::convert_key;

fn press(code: CtKeyCode) -> KeyEvent {
    KeyEvent {
        code,
        modifiers: KeyModifiers::NONE,
        kind: KeyEventKind::Press,
        state: KeyEventState::NONE,
    }
}

#[tokio::test]
async fn test_converted_key_resolves_waiter() {
    let cli = InteractiveCli::new(Arc::new(MemoryTerminal::new()));
    let waiter = cli.clone();
    let task = tokio::spawn(async move { waiter.wait_for_key().await });

    while cli.listener_count() == 0 {
        tokio::task::yield_now().await;
    }
    let key = convert_key(&press(CtKeyCode::Down)).unwrap();
    assert_eq!(cli.emit_key(&key), 1);

    assert_eq!(task.await.unwrap(), Ok(Key::new(KeyCode::Down)));
    assert_eq!(cli.listener_count(), 0);
}

#[tokio::test]
async fn test_timeout_without_keys() {
    let cli = InteractiveCli::new(Arc::new(MemoryTerminal::new()));
    let waited = cli
        .wait_for_key_or_timeout(std::time::Duration::from_millis(10))
        .await;
    assert_eq!(waited, Ok(KeyWait::Timeout));
    assert_eq!(cli.listener_count(), 0);
}
