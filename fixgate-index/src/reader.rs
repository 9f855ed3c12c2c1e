/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The sequence-number index reader.
//!
//! Readers map the file once at construction, pick the highest-epoch valid
//! copy, and answer lookups from memory. Nothing here blocks after the
//! initial map.

use crate::file::{IndexFileLayout, read_best_slot};
use crate::record::SequenceNumberRecord;
use fixgate_core::error::IndexError;
use fixgate_core::types::SessionId;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Read-only view of the durable sequence-number index.
#[derive(Debug)]
pub struct SequenceNumberIndexReader {
    records: HashMap<u64, SequenceNumberRecord>,
    /// Epoch of the copy the reader loaded (0 = file never flushed).
    epoch: u64,
}

impl SequenceNumberIndexReader {
    /// Maps the index file and loads the best copy.
    ///
    /// # Errors
    /// Returns `IndexError` when the file cannot be mapped, does not match
    /// the A/B layout, or both copies are corrupt.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let file = File::open(path).map_err(|e| IndexError::Io(e.to_string()))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| IndexError::Io(e.to_string()))?;
        let layout = IndexFileLayout::from_file_len(mmap.len())?;

        let mut records = HashMap::new();
        let mut epoch = 0;
        if let Some((found_epoch, found)) = read_best_slot(&mmap, layout)? {
            epoch = found_epoch;
            records.reserve(found.len());
            for record in found {
                records.insert(record.session_id.value(), record);
            }
        }

        Ok(Self { records, epoch })
    }

    /// Looks up the durable counters for a session.
    #[must_use]
    pub fn lookup(&self, session_id: SessionId) -> Option<SequenceNumberRecord> {
        self.records.get(&session_id.value()).copied()
    }

    /// Returns the highest flushed archive position, or -1 when the index
    /// holds nothing. Archive replay after restart starts past this point.
    #[must_use]
    pub fn last_flushed_position(&self) -> i64 {
        self.records
            .values()
            .map(|r| r.archive_position)
            .max()
            .unwrap_or(-1)
    }

    /// Returns the epoch of the loaded copy.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the number of sessions in the index.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::SequenceNumberIndexWriter;
    use fixgate_core::types::Direction;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_reader_sees_flushed_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sequence-numbers.idx");

        let mut writer =
            SequenceNumberIndexWriter::open(&path, 16, Duration::from_millis(100)).unwrap();
        writer
            .on_message(SessionId::new(1), 4, 0, Direction::Outbound)
            .unwrap();
        writer
            .on_message(SessionId::new(1), 3, 64, Direction::Inbound)
            .unwrap();
        writer.flush().unwrap();

        let reader = SequenceNumberIndexReader::open(&path).unwrap();
        let record = reader.lookup(SessionId::new(1)).unwrap();
        assert_eq!(record.last_sent_seq_num, 4);
        assert_eq!(record.last_recv_seq_num, 3);
        assert_eq!(reader.last_flushed_position(), 64);
        assert_eq!(reader.epoch(), 1);
        assert_eq!(reader.session_count(), 1);
    }

    #[test]
    fn test_reader_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sequence-numbers.idx");

        let mut writer =
            SequenceNumberIndexWriter::open(&path, 16, Duration::from_millis(100)).unwrap();
        writer.flush().unwrap();

        let reader = SequenceNumberIndexReader::open(&path).unwrap();
        assert!(reader.lookup(SessionId::new(42)).is_none());
        assert_eq!(reader.last_flushed_position(), -1);
    }

    #[test]
    fn test_reader_on_never_flushed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sequence-numbers.idx");

        let _writer =
            SequenceNumberIndexWriter::open(&path, 16, Duration::from_millis(100)).unwrap();

        let reader = SequenceNumberIndexReader::open(&path).unwrap();
        assert_eq!(reader.epoch(), 0);
        assert_eq!(reader.session_count(), 0);
    }

    #[test]
    fn test_reload_is_bit_identical() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sequence-numbers.idx");

        let mut writer =
            SequenceNumberIndexWriter::open(&path, 8, Duration::from_millis(100)).unwrap();
        for (id, seq, pos) in [(1u64, 10u64, 0i64), (2, 20, 32), (3, 30, 96)] {
            writer
                .on_message(SessionId::new(id), seq, pos, Direction::Outbound)
                .unwrap();
        }
        writer.flush().unwrap();

        let first = std::fs::read(&path).unwrap();
        let reader_a = SequenceNumberIndexReader::open(&path).unwrap();
        let second = std::fs::read(&path).unwrap();
        let reader_b = SequenceNumberIndexReader::open(&path).unwrap();

        assert_eq!(first, second);
        for id in 1..=3u64 {
            assert_eq!(
                reader_a.lookup(SessionId::new(id)),
                reader_b.lookup(SessionId::new(id))
            );
        }
    }
}
