/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixGate Index
//!
//! The durable sequence-number index: a write-ahead-indexed mapping
//! `sessionId -> (lastSentSeqNum, lastRecvSeqNum, archivePosition)` stored in
//! an A/B double-buffered file.
//!
//! The double buffer trades memory for a constant-time read path and a
//! bounded file size: the full table must fit in memory and each flush
//! rewrites one slot. Deployments with very large session counts would swap
//! in a log-structured file behind the same writer/reader contract.

pub mod file;
pub mod reader;
pub mod record;
pub mod writer;

pub use reader::SequenceNumberIndexReader;
pub use record::{RECORD_SIZE, SequenceNumberRecord};
pub use writer::SequenceNumberIndexWriter;
