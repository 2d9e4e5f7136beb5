//! Navigation History
//!
//! Chronological log of entered pages with the state snapshot taken as each
//! page was entered. Entries are never mutated; the oldest is evicted once
//! the log exceeds its bound.
//!
//! A cursor marks the entry for the current page. `back`/`forward` move the
//! cursor without adding entries. A fresh navigation drops the entries ahead
//! of the cursor, then appends and moves the cursor to the new end, so after
//! `a -> b`, back, `-> c` the log reads `a, c`.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::page::PageId;

/// A page visit
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryEntry<S> {
    /// Page that was entered
    pub page_id: PageId,
    /// State at the moment of entry
    pub state_snapshot: S,
    /// When the page was entered; never earlier than the previous entry
    pub timestamp: DateTime<Utc>,
    /// Free-form context recorded with the entry
    pub metadata: Option<serde_json::Value>,
}

/// Bounded history log with a cursor
#[derive(Clone, Debug)]
pub struct History<S> {
    entries: VecDeque<HistoryEntry<S>>,
    cursor: Option<usize>,
    max_size: usize,
    enabled: bool,
}

impl<S: Clone> History<S> {
    /// A history that keeps at most `max_size` entries
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            max_size: max_size.max(1),
            enabled: true,
        }
    }

    /// A history that records nothing
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(1)
        }
    }

    /// Whether entries are recorded
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Maximum number of retained entries
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Record entry into `page_id`
    ///
    /// Entries ahead of the cursor are discarded first. Returns the entry
    /// evicted to stay within bounds, if any.
    pub fn record(
        &mut self,
        page_id: PageId,
        state_snapshot: S,
        metadata: Option<serde_json::Value>,
    ) -> Option<HistoryEntry<S>> {
        if !self.enabled {
            return None;
        }

        if let Some(cursor) = self.cursor {
            self.entries.truncate(cursor + 1);
        }

        let now = Utc::now();
        // Wall clocks can step backwards; keep the log monotonic
        let timestamp = match self.entries.back() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        self.entries.push_back(HistoryEntry {
            page_id,
            state_snapshot,
            timestamp,
            metadata,
        });

        let evicted = if self.entries.len() > self.max_size {
            self.entries.pop_front()
        } else {
            None
        };
        self.cursor = Some(self.entries.len() - 1);
        evicted
    }

    /// Entry for the current page
    #[must_use]
    pub fn current(&self) -> Option<&HistoryEntry<S>> {
        self.cursor.and_then(|i| self.entries.get(i))
    }

    /// Entry the cursor would move to on `back`
    #[must_use]
    pub fn peek_back(&self) -> Option<&HistoryEntry<S>> {
        match self.cursor {
            Some(i) if i > 0 => self.entries.get(i - 1),
            _ => None,
        }
    }

    /// Entry the cursor would move to on `forward`
    #[must_use]
    pub fn peek_forward(&self) -> Option<&HistoryEntry<S>> {
        self.cursor.and_then(|i| self.entries.get(i + 1))
    }

    /// Whether there is an older entry
    #[must_use]
    pub fn can_go_back(&self) -> bool {
        self.peek_back().is_some()
    }

    /// Whether there is a newer entry
    #[must_use]
    pub fn can_go_forward(&self) -> bool {
        self.peek_forward().is_some()
    }

    /// Move the cursor one entry back
    pub fn back(&mut self) -> Option<&HistoryEntry<S>> {
        let target = self.cursor?.checked_sub(1)?;
        self.cursor = Some(target);
        self.entries.get(target)
    }

    /// Move the cursor one entry forward
    pub fn forward(&mut self) -> Option<&HistoryEntry<S>> {
        let target = self.cursor? + 1;
        if target >= self.entries.len() {
            return None;
        }
        self.cursor = Some(target);
        self.entries.get(target)
    }

    /// All entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry<S>> {
        self.entries.iter()
    }

    /// Number of retained entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries are retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ids(history: &History<u32>) -> Vec<String> {
        history
            .entries()
            .map(|e| e.page_id.to_string())
            .collect()
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let mut history = History::new(3);
        for (i, id) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            history.record(PageId::new(id), i as u32, None);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(ids(&history), vec!["c", "d", "e"]);
        assert_eq!(history.current().map(|e| e.state_snapshot), Some(4));
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let mut history = History::new(50);
        for i in 0..20 {
            history.record(PageId::new("p"), i, None);
        }
        let stamps: Vec<_> = history.entries().map(|e| e.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_back_forward_cursor() {
        let mut history = History::new(10);
        history.record(PageId::new("a"), 1, None);
        history.record(PageId::new("b"), 2, None);

        assert!(history.can_go_back());
        assert!(!history.can_go_forward());
        assert_eq!(history.back().map(|e| e.page_id.to_string()), Some("a".into()));
        assert!(history.back().is_none());
        assert_eq!(history.forward().map(|e| e.state_snapshot), Some(2));
        assert!(history.forward().is_none());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_record_after_back_drops_forward_branch() {
        let mut history = History::new(10);
        history.record(PageId::new("a"), 1, None);
        history.record(PageId::new("b"), 2, None);
        history.back();
        history.record(PageId::new("c"), 3, None);

        assert_eq!(ids(&history), vec!["a", "c"]);
        assert!(!history.can_go_forward());
        assert_eq!(history.peek_back().map(|e| e.page_id.to_string()), Some("a".into()));
    }

    #[test]
    fn test_disabled_records_nothing() {
        let mut history = History::disabled();
        history.record(PageId::new("a"), 1, None);
        assert!(history.is_empty());
        assert!(!history.can_go_back());
    }
}
