//! Bounded replay history for resuming clients.

use std::collections::VecDeque;

use bytes::Bytes;
use relay_common::EventId;

/// A single formatted event kept for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: EventId,
    /// Wire bytes produced at publish time. Replayed as-is.
    pub frame: Bytes,
}

/// Most-recent-first store of identified events, capped at `capacity`.
///
/// Ids are unique within the buffer. Replay relies on publishers assigning
/// ids in non-decreasing order.
#[derive(Debug)]
pub struct HistoryBuffer {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Store a frame under `id`.
    ///
    /// Unset ids (zero or empty) are not stored. A republished id replaces
    /// its stale entry and moves to the most-recent position. Evicts the
    /// oldest entry if the buffer exceeds capacity.
    ///
    /// Returns whether the frame was stored.
    pub fn append(&mut self, id: &EventId, frame: Bytes) -> bool {
        if !id.is_set() {
            return false;
        }

        if let Some(pos) = self.entries.iter().position(|entry| &entry.id == id) {
            self.entries.remove(pos);
        }

        self.entries.push_front(HistoryEntry {
            id: id.clone(),
            frame,
        });
        if self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
        true
    }

    /// Pre-populate from `(id, frame)` pairs given oldest first.
    pub fn seed<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (EventId, Bytes)>,
    {
        for (id, frame) in entries {
            self.append(&id, frame);
        }
    }

    /// Frames of every entry with an id strictly greater than `last_id`,
    /// oldest first.
    pub fn missed_since(&self, last_id: &EventId) -> Vec<Bytes> {
        let mut missed: Vec<Bytes> = self
            .entries
            .iter()
            .take_while(|entry| &entry.id > last_id)
            .map(|entry| entry.frame.clone())
            .collect();
        missed.reverse();
        missed
    }

    /// Entries oldest first.
    #[cfg(test)]
    pub(crate) fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    fn ids(buffer: &HistoryBuffer) -> Vec<EventId> {
        buffer.entries().map(|e| e.id.clone()).collect()
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut history = HistoryBuffer::new(5);
        for i in 1..=8u64 {
            history.append(&EventId::Numeric(i), frame(&format!("f{i}")));
        }

        assert_eq!(history.len(), 5);
        let missed = history.missed_since(&EventId::Numeric(0));
        assert_eq!(
            missed,
            vec![frame("f4"), frame("f5"), frame("f6"), frame("f7"), frame("f8")]
        );
    }

    #[test]
    fn missed_since_returns_newer_entries_oldest_first() {
        let mut history = HistoryBuffer::new(10);
        for i in 1..=5u64 {
            history.append(&EventId::Numeric(i), frame(&format!("f{i}")));
        }

        assert_eq!(
            history.missed_since(&EventId::Numeric(3)),
            vec![frame("f4"), frame("f5")]
        );
        assert!(history.missed_since(&EventId::Numeric(5)).is_empty());
        assert!(history.missed_since(&EventId::Numeric(99)).is_empty());
    }

    #[test]
    fn scan_stops_at_first_older_entry() {
        let mut history = HistoryBuffer::new(10);
        history.append(&EventId::Numeric(5), frame("f5"));
        history.append(&EventId::Numeric(2), frame("f2"));
        history.append(&EventId::Numeric(6), frame("f6"));

        // 2 is reached before 5, so 5 is never considered.
        assert_eq!(history.missed_since(&EventId::Numeric(3)), vec![frame("f6")]);
    }

    #[test]
    fn republish_replaces_and_moves_to_front() {
        let mut history = HistoryBuffer::new(10);
        history.append(&EventId::Numeric(1), frame("one"));
        history.append(&EventId::Numeric(2), frame("two"));
        history.append(&EventId::Numeric(3), frame("three"));
        history.append(&EventId::Numeric(2), frame("two again"));

        assert_eq!(history.len(), 3);
        assert_eq!(
            ids(&history),
            vec![EventId::Numeric(1), EventId::Numeric(3), EventId::Numeric(2)]
        );
        let newest = history.entries().last().unwrap();
        assert_eq!(newest.frame, frame("two again"));
    }

    #[test]
    fn unset_ids_are_not_stored() {
        let mut history = HistoryBuffer::new(10);
        assert!(!history.append(&EventId::Numeric(0), frame("zero")));
        assert!(!history.append(&EventId::Token(String::new()), frame("empty")));
        assert!(history.is_empty());
        assert!(history.missed_since(&EventId::Numeric(0)).is_empty());
    }

    #[test]
    fn seed_keeps_order_and_capacity() {
        let mut history = HistoryBuffer::new(2);
        history.seed(vec![
            (EventId::Numeric(1), frame("a")),
            (EventId::Numeric(2), frame("b")),
            (EventId::Numeric(3), frame("c")),
        ]);

        assert_eq!(ids(&history), vec![EventId::Numeric(2), EventId::Numeric(3)]);
        assert_eq!(history.capacity(), 2);
    }

    #[test]
    fn token_ids_compare_lexicographically() {
        let mut history = HistoryBuffer::new(10);
        history.append(&EventId::parse("a"), frame("a"));
        history.append(&EventId::parse("b"), frame("b"));
        history.append(&EventId::parse("c"), frame("c"));

        assert_eq!(
            history.missed_since(&EventId::parse("a")),
            vec![frame("b"), frame("c")]
        );
    }
}
