/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The indexer worker.
//!
//! Tails the archive stream in archive order and keeps the durable
//! sequence-number index current, flushing on the configured timeout. It is
//! the index file's single writer.

use crate::worker::Worker;
use fixgate_core::clock::Clock;
use fixgate_core::error::ErrorHandler;
use fixgate_core::types::SessionId;
use fixgate_index::record::SequenceNumberRecord;
use fixgate_index::writer::SequenceNumberIndexWriter;
use fixgate_transport::stream::{PollAction, StreamCursor};
use std::sync::Arc;

/// Max archived messages applied per duty cycle.
const MESSAGES_PER_CYCLE: usize = 64;

/// The indexer worker: archive consumer, index-file writer.
pub struct Indexer {
    cursor: StreamCursor,
    writer: SequenceNumberIndexWriter,
    clock: Arc<dyn Clock>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl Indexer {
    /// Creates the indexer.
    ///
    /// # Arguments
    /// * `cursor` - Archive cursor positioned past anything already flushed
    /// * `writer` - The recovered index writer
    /// * `clock` - Time source for the flush timeout
    /// * `error_handler` - Where persistence failures are reported
    #[must_use]
    pub fn new(
        cursor: StreamCursor,
        writer: SequenceNumberIndexWriter,
        clock: Arc<dyn Clock>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            cursor,
            writer,
            clock,
            error_handler,
        }
    }

    /// Looks up the in-memory record for a session.
    #[must_use]
    pub fn lookup(&self, session_id: SessionId) -> Option<SequenceNumberRecord> {
        self.writer.lookup(session_id)
    }

    /// Forces a flush, e.g. at orderly shutdown.
    pub fn flush_now(&mut self) {
        if let Err(err) = self.writer.flush() {
            self.error_handler.on_error(&err.into());
        }
    }
}

impl Worker for Indexer {
    fn do_work(&mut self) -> usize {
        let Self {
            cursor,
            writer,
            error_handler,
            ..
        } = self;

        let mut work = cursor.poll(
            |position, message| {
                if let Err(err) = writer.on_message(
                    message.session_id,
                    message.seq_num,
                    position,
                    message.direction,
                ) {
                    // The session keeps running in memory; durability is
                    // degraded until the next successful apply/flush.
                    error_handler.on_error(&err.into());
                }
                PollAction::Continue
            },
            MESSAGES_PER_CYCLE,
        );

        match self.writer.maybe_flush(self.clock.monotonic_nanos()) {
            Ok(flushed) => {
                if flushed {
                    work += 1;
                }
            }
            Err(err) => self.error_handler.on_error(&err.into()),
        }

        work
    }

    fn on_close(&mut self) {
        self.flush_now();
    }

    fn name(&self) -> &'static str {
        "indexer"
    }
}
