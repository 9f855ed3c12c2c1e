/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The persisted per-session counter record.

use fixgate_core::types::SessionId;
use serde::{Deserialize, Serialize};

/// Fixed wire size of one record: `u64 + i32 + i32 + i64`, little-endian.
pub const RECORD_SIZE: usize = 24;

/// Durable counters for one session.
///
/// `archive_position` is the position of the last archived message that was
/// applied to this record; replaying the archive from the highest flushed
/// position reproduces the in-memory state exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceNumberRecord {
    /// The session the counters belong to.
    pub session_id: SessionId,
    /// Highest MsgSeqNum sent to the counterparty.
    pub last_sent_seq_num: i32,
    /// Highest MsgSeqNum received from the counterparty.
    pub last_recv_seq_num: i32,
    /// Archive position of the last applied message.
    pub archive_position: i64,
}

impl SequenceNumberRecord {
    /// Creates an empty record for a newly seen session.
    #[must_use]
    pub const fn empty(session_id: SessionId) -> Self {
        Self {
            session_id,
            last_sent_seq_num: 0,
            last_recv_seq_num: 0,
            archive_position: -1,
        }
    }

    /// Serializes the record into a 24-byte buffer slice.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than [`RECORD_SIZE`].
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.session_id.value().to_le_bytes());
        buf[8..12].copy_from_slice(&self.last_sent_seq_num.to_le_bytes());
        buf[12..16].copy_from_slice(&self.last_recv_seq_num.to_le_bytes());
        buf[16..24].copy_from_slice(&self.archive_position.to_le_bytes());
    }

    /// Deserializes a record from a 24-byte buffer slice.
    ///
    /// # Panics
    /// Panics if `buf` is shorter than [`RECORD_SIZE`].
    #[must_use]
    pub fn read_from(buf: &[u8]) -> Self {
        Self {
            session_id: SessionId::new(u64::from_le_bytes(buf[0..8].try_into().unwrap())),
            last_sent_seq_num: i32::from_le_bytes(buf[8..12].try_into().unwrap()),
            last_recv_seq_num: i32::from_le_bytes(buf[12..16].try_into().unwrap()),
            archive_position: i64::from_le_bytes(buf[16..24].try_into().unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let record = SequenceNumberRecord {
            session_id: SessionId::new(0xDEAD_BEEF),
            last_sent_seq_num: 42,
            last_recv_seq_num: 17,
            archive_position: 1 << 40,
        };

        let mut buf = [0u8; RECORD_SIZE];
        record.write_to(&mut buf);
        assert_eq!(SequenceNumberRecord::read_from(&buf), record);
    }

    #[test]
    fn test_empty_record() {
        let record = SequenceNumberRecord::empty(SessionId::new(9));
        assert_eq!(record.last_sent_seq_num, 0);
        assert_eq!(record.last_recv_seq_num, 0);
        assert_eq!(record.archive_position, -1);
    }
}
