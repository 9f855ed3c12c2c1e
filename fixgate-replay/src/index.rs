/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! In-memory map from `(session, seq num)` to archive position.
//!
//! Maintained by the indexer alongside the durable counters and rebuilt from
//! the archive on restart. A resend request starts its archive scan at the
//! position this index returns instead of walking the stream from zero.

use fixgate_core::types::{Direction, SessionId};
use std::collections::{BTreeMap, HashMap};

/// Per-session seq-to-position map over sent messages.
#[derive(Debug, Default)]
pub struct ReplayIndex {
    by_session: HashMap<u64, BTreeMap<u64, i64>>,
}

impl ReplayIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one archived message. Inbound messages are not replayable and
    /// are ignored; a seq num keeps its first archived position, so replayed
    /// PossDup copies do not displace the original.
    pub fn on_message(
        &mut self,
        session_id: SessionId,
        seq_num: u64,
        position: i64,
        direction: Direction,
    ) {
        if direction == Direction::Inbound {
            return;
        }
        self.by_session
            .entry(session_id.value())
            .or_default()
            .entry(seq_num)
            .or_insert(position);
    }

    /// Returns the archive position to start scanning at for
    /// `(session_id, begin_seq_no)`: the position of the greatest indexed
    /// seq num at or below `begin_seq_no`, falling back to the first indexed
    /// message above it.
    #[must_use]
    pub fn position_of(&self, session_id: SessionId, begin_seq_no: u64) -> Option<i64> {
        let seqs = self.by_session.get(&session_id.value())?;
        seqs.range(..=begin_seq_no)
            .next_back()
            .or_else(|| seqs.range(begin_seq_no..).next())
            .map(|(_, position)| *position)
    }

    /// Drops a session's entries, e.g. once its retention lapses.
    pub fn remove_session(&mut self, session_id: SessionId) {
        self.by_session.remove(&session_id.value());
    }

    /// Returns the number of indexed messages for a session.
    #[must_use]
    pub fn message_count(&self, session_id: SessionId) -> usize {
        self.by_session
            .get(&session_id.value())
            .map_or(0, BTreeMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_lookup() {
        let mut index = ReplayIndex::new();
        index.on_message(SessionId::new(1), 1, 0, Direction::Outbound);
        index.on_message(SessionId::new(1), 2, 64, Direction::Outbound);
        index.on_message(SessionId::new(1), 3, 128, Direction::Outbound);

        assert_eq!(index.position_of(SessionId::new(1), 2), Some(64));
        assert_eq!(index.position_of(SessionId::new(1), 3), Some(128));
        // Begin below everything indexed starts at the earliest message.
        assert_eq!(index.position_of(SessionId::new(1), 0), Some(0));
        // Begin above everything indexed starts at the greatest below it.
        assert_eq!(index.position_of(SessionId::new(1), 9), Some(128));
    }

    #[test]
    fn test_inbound_not_indexed() {
        let mut index = ReplayIndex::new();
        index.on_message(SessionId::new(1), 1, 0, Direction::Inbound);

        assert_eq!(index.position_of(SessionId::new(1), 1), None);
        assert_eq!(index.message_count(SessionId::new(1)), 0);
    }

    #[test]
    fn test_unknown_session() {
        let index = ReplayIndex::new();
        assert_eq!(index.position_of(SessionId::new(42), 1), None);
    }

    #[test]
    fn test_remove_session() {
        let mut index = ReplayIndex::new();
        index.on_message(SessionId::new(1), 1, 0, Direction::Outbound);
        index.remove_session(SessionId::new(1));

        assert_eq!(index.message_count(SessionId::new(1)), 0);
    }
}
