/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Reading historical messages out of the archive.
//!
//! A query scans the archive stream from the position the replay index
//! recorded for `(session, begin)` and delivers the session's sent messages
//! in archive order. Each query runs on its own cursor, so concurrent
//! queries over different sessions do not interfere; delivery stops early
//! when the handler signals back-pressure.

use crate::index::ReplayIndex;
use fixgate_core::types::{Direction, SessionId};
use fixgate_transport::stream::{ArchivedMessage, PollAction, StreamBuffer, StreamCursor};
use std::sync::Arc;

/// Read access to a session's archived sent messages.
#[derive(Debug)]
pub struct ReplayQuery {
    stream: Arc<StreamBuffer>,
}

impl ReplayQuery {
    /// Creates a query facade over the archive stream.
    #[must_use]
    pub fn new(stream: Arc<StreamBuffer>) -> Self {
        Self { stream }
    }

    /// Delivers the session's sent messages with seq nums in
    /// `[begin, end]` (`end == 0` meaning unbounded) to `handler` in archive
    /// order.
    ///
    /// # Returns
    /// The number of messages delivered. Returns early if `handler` aborts.
    pub fn query<F>(
        &self,
        index: &ReplayIndex,
        session_id: SessionId,
        begin_seq_no: u64,
        end_seq_no: u64,
        mut handler: F,
    ) -> usize
    where
        F: FnMut(&ArchivedMessage) -> PollAction,
    {
        let mut cursor = self.cursor(index, session_id, begin_seq_no);
        let mut delivered = 0;

        while let Some(message) = cursor.next() {
            if message.seq_num < begin_seq_no {
                continue;
            }
            if end_seq_no != 0 && message.seq_num > end_seq_no {
                break;
            }
            if handler(&message) == PollAction::Abort {
                break;
            }
            delivered += 1;
        }

        delivered
    }

    /// Opens a resumable cursor over the session's sent messages, positioned
    /// for `begin_seq_no`.
    #[must_use]
    pub fn cursor(
        &self,
        index: &ReplayIndex,
        session_id: SessionId,
        begin_seq_no: u64,
    ) -> ReplayCursor {
        let start = index.position_of(session_id, begin_seq_no).unwrap_or(0);
        ReplayCursor {
            cursor: self.stream.subscribe_at(start),
            session_id,
        }
    }
}

/// Resumable cursor yielding one session's sent messages in archive order.
#[derive(Debug)]
pub struct ReplayCursor {
    cursor: StreamCursor,
    session_id: SessionId,
}

impl ReplayCursor {
    /// Returns the next sent message for the session, or `None` when the
    /// archive is exhausted.
    pub fn next(&mut self) -> Option<ArchivedMessage> {
        loop {
            let mut found = None;
            let consumed = self.cursor.poll(
                |_, message| {
                    if message.session_id == self.session_id
                        && message.direction == Direction::Outbound
                    {
                        found = Some(message.clone());
                    }
                    PollAction::Continue
                },
                1,
            );

            if consumed == 0 {
                return None;
            }
            if found.is_some() {
                return found;
            }
        }
    }
}
