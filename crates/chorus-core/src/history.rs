//! Message history with a retention policy.

use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of messages kept for replay.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// How many messages the hub keeps for replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRetention {
    /// Keep every message for the lifetime of the process.
    Unbounded,
    /// Keep only the most recent `n` messages.
    Bounded(usize),
}

impl HistoryRetention {
    /// The maximum number of retained messages, if bounded.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        match self {
            HistoryRetention::Unbounded => None,
            HistoryRetention::Bounded(n) => Some(*n),
        }
    }
}

impl Default for HistoryRetention {
    fn default() -> Self {
        HistoryRetention::Bounded(DEFAULT_HISTORY_LIMIT)
    }
}

/// Append-only message log.
///
/// Entries are never reordered. With bounded retention the oldest entry is
/// dropped once the limit is reached.
#[derive(Debug, Default)]
pub struct History {
    entries: VecDeque<Message>,
    retention: HistoryRetention,
}

impl History {
    /// Create an empty history.
    #[must_use]
    pub fn new(retention: HistoryRetention) -> Self {
        let entries = match retention {
            HistoryRetention::Bounded(n) => VecDeque::with_capacity(n.min(4096)),
            HistoryRetention::Unbounded => VecDeque::new(),
        };
        Self { entries, retention }
    }

    /// Append a message.
    ///
    /// Returns the message that fell out of the window, if any.
    pub fn push(&mut self, message: Message) -> Option<Message> {
        match self.retention {
            HistoryRetention::Unbounded => {
                self.entries.push_back(message);
                None
            }
            HistoryRetention::Bounded(0) => Some(message),
            HistoryRetention::Bounded(n) => {
                let evicted = if self.entries.len() >= n {
                    self.entries.pop_front()
                } else {
                    None
                };
                self.entries.push_back(message);
                evicted
            }
        }
    }

    /// Iterate messages oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    /// Number of retained messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no messages are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy out all retained messages, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(history: &History) -> Vec<&str> {
        history.iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut history = History::new(HistoryRetention::Unbounded);
        for i in 0..5000 {
            assert!(history.push(Message::new("a", i.to_string())).is_none());
        }
        assert_eq!(history.len(), 5000);
        assert_eq!(history.iter().next().unwrap().text, "0");
    }

    #[test]
    fn test_bounded_drops_oldest() {
        let mut history = History::new(HistoryRetention::Bounded(3));
        for text in ["a", "b", "c"] {
            assert!(history.push(Message::new("x", text)).is_none());
        }

        let dropped = history.push(Message::new("x", "d")).unwrap();
        assert_eq!(dropped.text, "a");
        assert_eq!(texts(&history), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_zero_limit_keeps_nothing() {
        let mut history = History::new(HistoryRetention::Bounded(0));
        assert!(history.push(Message::new("x", "a")).is_some());
        assert!(history.is_empty());
    }

    #[test]
    fn test_retention_limit() {
        assert_eq!(HistoryRetention::Unbounded.limit(), None);
        assert_eq!(HistoryRetention::Bounded(10).limit(), Some(10));
        assert_eq!(HistoryRetention::default().limit(), Some(DEFAULT_HISTORY_LIMIT));
    }
}
