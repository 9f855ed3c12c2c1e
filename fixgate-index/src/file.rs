/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! A/B double-buffered index file layout.
//!
//! The file holds two complete copies of the index. A write always goes to
//! the cold slot and bumps the epoch, so a crash mid-write leaves the hot
//! slot intact; readers pick the highest-epoch slot whose checksum verifies.
//! File size is fixed at creation: growth means rewriting at a larger
//! capacity.
//!
//! ```text
//! offset 0   : slot-0 header { epoch: u64, checksum: u32, count: u32 }
//! offset 16  : slot-1 header { epoch: u64, checksum: u32, count: u32 }
//! offset 32  : slot-0 entries (capacity * 24 bytes)
//! offset 32+C: slot-1 entries (capacity * 24 bytes)
//! ```

use crate::record::{RECORD_SIZE, SequenceNumberRecord};
use fixgate_core::error::IndexError;

/// Bytes per slot header: epoch (8) + checksum (4) + count (4).
pub const SLOT_HEADER_SIZE: usize = 16;

/// Offset of the first entry region.
pub const HEADER_REGION_SIZE: usize = 2 * SLOT_HEADER_SIZE;

/// Fixed geometry of an index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexFileLayout {
    /// Maximum number of sessions per slot.
    pub capacity: usize,
}

impl IndexFileLayout {
    /// Creates a layout for the given session capacity.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Derives the layout from an existing file's length.
    ///
    /// # Errors
    /// Returns `IndexError::Corrupted` if the length does not describe a
    /// well-formed A/B file.
    pub fn from_file_len(len: usize) -> Result<Self, IndexError> {
        if len < HEADER_REGION_SIZE || (len - HEADER_REGION_SIZE) % (2 * RECORD_SIZE) != 0 {
            return Err(IndexError::Corrupted {
                reason: format!("file length {len} does not match the A/B layout"),
            });
        }
        Ok(Self {
            capacity: (len - HEADER_REGION_SIZE) / (2 * RECORD_SIZE),
        })
    }

    /// Total file length.
    #[must_use]
    pub const fn file_len(self) -> usize {
        HEADER_REGION_SIZE + 2 * self.capacity * RECORD_SIZE
    }

    /// Byte offset of a slot's header.
    #[must_use]
    pub const fn slot_header_offset(self, slot: usize) -> usize {
        slot * SLOT_HEADER_SIZE
    }

    /// Byte offset of a slot's entry region.
    #[must_use]
    pub const fn entry_region_offset(self, slot: usize) -> usize {
        HEADER_REGION_SIZE + slot * self.capacity * RECORD_SIZE
    }
}

/// One slot's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    /// Write generation; the higher valid epoch wins. Zero means never
    /// written.
    pub epoch: u64,
    /// CRC32 of the slot's occupied entry bytes.
    pub checksum: u32,
    /// Number of records in the slot.
    pub count: u32,
}

impl SlotHeader {
    /// Reads a slot header from the file image.
    #[must_use]
    pub fn read(buf: &[u8], layout: IndexFileLayout, slot: usize) -> Self {
        let off = layout.slot_header_offset(slot);
        Self {
            epoch: u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()),
            checksum: u32::from_le_bytes(buf[off + 8..off + 12].try_into().unwrap()),
            count: u32::from_le_bytes(buf[off + 12..off + 16].try_into().unwrap()),
        }
    }

    /// Writes a slot header into the file image.
    pub fn write(&self, buf: &mut [u8], layout: IndexFileLayout, slot: usize) {
        let off = layout.slot_header_offset(slot);
        buf[off..off + 8].copy_from_slice(&self.epoch.to_le_bytes());
        buf[off + 8..off + 12].copy_from_slice(&self.checksum.to_le_bytes());
        buf[off + 12..off + 16].copy_from_slice(&self.count.to_le_bytes());
    }
}

/// Validates one slot and reads its records when intact.
#[must_use]
pub fn read_slot(
    buf: &[u8],
    layout: IndexFileLayout,
    slot: usize,
) -> Option<(u64, Vec<SequenceNumberRecord>)> {
    let header = SlotHeader::read(buf, layout, slot);
    if header.epoch == 0 || header.count as usize > layout.capacity {
        return None;
    }

    let start = layout.entry_region_offset(slot);
    let occupied = header.count as usize * RECORD_SIZE;
    let region = &buf[start..start + occupied];
    if crc32fast::hash(region) != header.checksum {
        return None;
    }

    let records = region
        .chunks_exact(RECORD_SIZE)
        .map(SequenceNumberRecord::read_from)
        .collect();
    Some((header.epoch, records))
}

/// Picks the highest-epoch valid slot.
///
/// # Errors
/// Returns `IndexError::Corrupted` when both copies fail validation on a
/// file that has been written at least once.
pub fn read_best_slot(
    buf: &[u8],
    layout: IndexFileLayout,
) -> Result<Option<(u64, Vec<SequenceNumberRecord>)>, IndexError> {
    let best = [0, 1]
        .into_iter()
        .filter_map(|slot| read_slot(buf, layout, slot))
        .max_by_key(|(epoch, _)| *epoch);

    if best.is_none() {
        let ever_written = (0..2).any(|slot| SlotHeader::read(buf, layout, slot).epoch != 0);
        if ever_written {
            return Err(IndexError::Corrupted {
                reason: "both index copies failed checksum validation".to_string(),
            });
        }
    }

    Ok(best)
}

/// Writes records into a slot and stamps its header with `epoch`.
pub fn write_slot(
    buf: &mut [u8],
    layout: IndexFileLayout,
    slot: usize,
    epoch: u64,
    records: &[SequenceNumberRecord],
) {
    let start = layout.entry_region_offset(slot);
    for (i, record) in records.iter().enumerate() {
        let off = start + i * RECORD_SIZE;
        record.write_to(&mut buf[off..off + RECORD_SIZE]);
    }

    let occupied = records.len() * RECORD_SIZE;
    let checksum = crc32fast::hash(&buf[start..start + occupied]);
    SlotHeader {
        epoch,
        checksum,
        count: records.len() as u32,
    }
    .write(buf, layout, slot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_core::types::SessionId;

    fn sample_records() -> Vec<SequenceNumberRecord> {
        vec![
            SequenceNumberRecord {
                session_id: SessionId::new(1),
                last_sent_seq_num: 5,
                last_recv_seq_num: 7,
                archive_position: 96,
            },
            SequenceNumberRecord {
                session_id: SessionId::new(2),
                last_sent_seq_num: 1,
                last_recv_seq_num: 1,
                archive_position: 128,
            },
        ]
    }

    #[test]
    fn test_layout_geometry() {
        let layout = IndexFileLayout::new(64);
        assert_eq!(layout.file_len(), 32 + 2 * 64 * RECORD_SIZE);
        assert_eq!(layout.slot_header_offset(1), 16);
        assert_eq!(layout.entry_region_offset(0), 32);
        assert_eq!(layout.entry_region_offset(1), 32 + 64 * RECORD_SIZE);

        assert_eq!(
            IndexFileLayout::from_file_len(layout.file_len()).unwrap(),
            layout
        );
        assert!(IndexFileLayout::from_file_len(33).is_err());
    }

    #[test]
    fn test_write_then_read_slot() {
        let layout = IndexFileLayout::new(8);
        let mut buf = vec![0u8; layout.file_len()];
        let records = sample_records();

        write_slot(&mut buf, layout, 0, 1, &records);

        let (epoch, read) = read_slot(&buf, layout, 0).unwrap();
        assert_eq!(epoch, 1);
        assert_eq!(read, records);
        assert!(read_slot(&buf, layout, 1).is_none());
    }

    #[test]
    fn test_best_slot_prefers_higher_epoch() {
        let layout = IndexFileLayout::new(8);
        let mut buf = vec![0u8; layout.file_len()];
        let mut records = sample_records();

        write_slot(&mut buf, layout, 0, 1, &records);
        records[0].last_sent_seq_num = 6;
        write_slot(&mut buf, layout, 1, 2, &records);

        let (epoch, read) = read_best_slot(&buf, layout).unwrap().unwrap();
        assert_eq!(epoch, 2);
        assert_eq!(read[0].last_sent_seq_num, 6);
    }

    #[test]
    fn test_corrupt_copy_is_recoverable() {
        let layout = IndexFileLayout::new(8);
        let mut buf = vec![0u8; layout.file_len()];
        let records = sample_records();

        write_slot(&mut buf, layout, 0, 1, &records);
        write_slot(&mut buf, layout, 1, 2, &records);

        // Corrupt the newer copy; the reader falls back to the older one.
        let region = layout.entry_region_offset(1);
        buf[region] ^= 0xFF;

        let (epoch, read) = read_best_slot(&buf, layout).unwrap().unwrap();
        assert_eq!(epoch, 1);
        assert_eq!(read, records);
    }

    #[test]
    fn test_both_copies_corrupt_is_an_error() {
        let layout = IndexFileLayout::new(8);
        let mut buf = vec![0u8; layout.file_len()];
        let records = sample_records();

        write_slot(&mut buf, layout, 0, 1, &records);
        write_slot(&mut buf, layout, 1, 2, &records);
        buf[layout.entry_region_offset(0)] ^= 0xFF;
        buf[layout.entry_region_offset(1)] ^= 0xFF;

        assert!(read_best_slot(&buf, layout).is_err());
    }

    #[test]
    fn test_unwritten_file_reads_empty() {
        let layout = IndexFileLayout::new(8);
        let buf = vec![0u8; layout.file_len()];
        assert!(read_best_slot(&buf, layout).unwrap().is_none());
    }
}
