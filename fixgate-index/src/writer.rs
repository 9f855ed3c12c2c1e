/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The sequence-number index writer.
//!
//! A single writer (the indexer worker) applies archived messages in archive
//! order and periodically flushes the whole table into the cold slot of the
//! A/B file. Applies are idempotent per archive position, so replaying the
//! archive from the last flushed position after a crash reproduces the same
//! file contents.

use crate::file::{IndexFileLayout, read_best_slot, write_slot};
use crate::record::SequenceNumberRecord;
use fixgate_core::error::IndexError;
use fixgate_core::types::{Direction, SessionId};
use memmap2::MmapMut;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Single-writer view of the durable sequence-number index.
#[derive(Debug)]
pub struct SequenceNumberIndexWriter {
    mmap: MmapMut,
    layout: IndexFileLayout,
    /// In-memory truth, keyed by session id.
    records: BTreeMap<u64, SequenceNumberRecord>,
    /// Epoch of the most recent flushed slot.
    epoch: u64,
    /// Highest archive position applied so far.
    last_position: i64,
    /// Whether unflushed updates exist.
    dirty: bool,
    flush_timeout_ns: u64,
    last_flush_ns: u64,
}

impl SequenceNumberIndexWriter {
    /// Opens or creates the index file, recovering any previously flushed
    /// state.
    ///
    /// # Arguments
    /// * `path` - Index file path
    /// * `capacity` - Maximum number of sessions (fixes the file size)
    /// * `flush_timeout` - Max staleness tolerated before `maybe_flush`
    ///   writes to disk
    ///
    /// # Errors
    /// Returns `IndexError` when the file cannot be mapped or both copies
    /// are corrupt.
    pub fn open(
        path: &Path,
        capacity: usize,
        flush_timeout: Duration,
    ) -> Result<Self, IndexError> {
        let layout = IndexFileLayout::new(capacity);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| IndexError::Io(e.to_string()))?;
        file.set_len(layout.file_len() as u64)
            .map_err(|e| IndexError::Io(e.to_string()))?;

        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| IndexError::Io(e.to_string()))?;

        let mut records = BTreeMap::new();
        let mut epoch = 0;
        let mut last_position = -1;
        if let Some((found_epoch, found)) = read_best_slot(&mmap, layout)? {
            epoch = found_epoch;
            for record in found {
                last_position = last_position.max(record.archive_position);
                records.insert(record.session_id.value(), record);
            }
            info!(
                sessions = records.len(),
                epoch, last_position, "recovered sequence number index"
            );
        }

        Ok(Self {
            mmap,
            layout,
            records,
            epoch,
            last_position,
            dirty: false,
            flush_timeout_ns: flush_timeout.as_nanos() as u64,
            last_flush_ns: 0,
        })
    }

    /// Applies one archived message to the index.
    ///
    /// Re-applying the position last applied is a no-op, which is what makes
    /// archive replay after a crash idempotent.
    ///
    /// # Errors
    /// Returns `IndexError::PositionRegression` when the position moves
    /// backwards, and `IndexError::CapacityExhausted` when a new session
    /// does not fit the file.
    pub fn on_message(
        &mut self,
        session_id: SessionId,
        seq_num: u64,
        archive_position: i64,
        direction: Direction,
    ) -> Result<(), IndexError> {
        if archive_position < self.last_position {
            return Err(IndexError::PositionRegression {
                last: self.last_position,
                offered: archive_position,
            });
        }
        if archive_position == self.last_position && self.last_position >= 0 {
            debug!(archive_position, "skipping already applied position");
            return Ok(());
        }

        if !self.records.contains_key(&session_id.value()) && self.records.len() >= self.layout.capacity
        {
            return Err(IndexError::CapacityExhausted {
                capacity: self.layout.capacity,
            });
        }

        let record = self
            .records
            .entry(session_id.value())
            .or_insert_with(|| SequenceNumberRecord::empty(session_id));

        let seq = seq_num.min(i32::MAX as u64) as i32;
        match direction {
            Direction::Outbound => record.last_sent_seq_num = record.last_sent_seq_num.max(seq),
            Direction::Inbound => record.last_recv_seq_num = record.last_recv_seq_num.max(seq),
        }
        record.archive_position = archive_position;

        self.last_position = archive_position;
        self.dirty = true;
        Ok(())
    }

    /// Flushes the table into the cold slot and syncs the mapping.
    ///
    /// # Errors
    /// Returns `IndexError::Io` when the sync fails; the in-memory state is
    /// kept and a later flush can retry.
    pub fn flush(&mut self) -> Result<(), IndexError> {
        let records: Vec<SequenceNumberRecord> = self.records.values().copied().collect();
        let next_epoch = self.epoch + 1;
        let cold_slot = (next_epoch % 2) as usize;

        write_slot(&mut self.mmap, self.layout, cold_slot, next_epoch, &records);
        self.mmap
            .flush()
            .map_err(|e| IndexError::Io(e.to_string()))?;

        self.epoch = next_epoch;
        self.dirty = false;
        debug!(
            epoch = self.epoch,
            sessions = records.len(),
            "flushed sequence number index"
        );
        Ok(())
    }

    /// Flushes when updates are pending and the flush timeout has elapsed.
    ///
    /// # Errors
    /// Propagates flush failures.
    pub fn maybe_flush(&mut self, now_ns: u64) -> Result<bool, IndexError> {
        if self.dirty && now_ns.saturating_sub(self.last_flush_ns) >= self.flush_timeout_ns {
            self.flush()?;
            self.last_flush_ns = now_ns;
            return Ok(true);
        }
        Ok(false)
    }

    /// Returns the record for a session, if one exists in memory.
    #[must_use]
    pub fn lookup(&self, session_id: SessionId) -> Option<SequenceNumberRecord> {
        self.records.get(&session_id.value()).copied()
    }

    /// Returns the highest applied archive position.
    #[must_use]
    pub const fn last_position(&self) -> i64 {
        self.last_position
    }

    /// Returns true when unflushed updates exist.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }
}
