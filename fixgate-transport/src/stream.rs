/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Ordered archive stream with position cursors.
//!
//! Every message flowing through the gateway is published onto a
//! [`StreamBuffer`]: an append-only, totally ordered log of
//! [`ArchivedMessage`] records addressed by byte position. The indexer, the
//! replayer, and the outbound sender each read through their own
//! [`StreamCursor`]; cursors never block the writer, and a bounded flow
//! window turns a slow consumer into publisher back-pressure instead of
//! unbounded memory growth.
//!
//! Records are retained after consumption - the stream doubles as the
//! archive that resend requests are served from.

use bytes::Bytes;
use fixgate_core::types::{Direction, MsgType, SessionId};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Frame header accounting used for position arithmetic.
const FRAME_HEADER_LEN: usize = 32;

/// Frame alignment in bytes.
const FRAME_ALIGNMENT: usize = 32;

/// One archived message.
#[derive(Debug, Clone)]
pub struct ArchivedMessage {
    /// The session the message belongs to.
    pub session_id: SessionId,
    /// The MsgSeqNum the message carried.
    pub seq_num: u64,
    /// The message type.
    pub msg_type: MsgType,
    /// Whether the gateway received or sent it.
    pub direction: Direction,
    /// The complete wire bytes.
    pub bytes: Bytes,
}

/// Outcome of a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The message was appended at this archive position.
    Published(i64),
    /// The flow window is exhausted; retry after consumers drain.
    BackPressure,
}

/// Action returned by a cursor's fragment handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Keep delivering fragments.
    Continue,
    /// Stop; the cursor stays on the current fragment for the next poll.
    Abort,
}

#[derive(Debug)]
struct StreamInner {
    /// All records in publish order, positions strictly increasing.
    records: Vec<(i64, ArchivedMessage)>,
    /// Position the next record will be appended at.
    next_position: i64,
    /// Consumption watermarks of registered cursors (record indices).
    cursors: Vec<Arc<AtomicUsize>>,
}

/// Append-only ordered stream, single writer, many cursors.
#[derive(Debug)]
pub struct StreamBuffer {
    inner: RwLock<StreamInner>,
    /// Max records in flight past the slowest cursor, if bounded.
    flow_window: Option<usize>,
}

impl StreamBuffer {
    /// Creates an unbounded stream (no publisher back-pressure).
    #[must_use]
    pub fn new() -> Self {
        Self::with_flow_window(None)
    }

    /// Creates a stream that back-pressures the publisher once the slowest
    /// cursor falls `window` records behind.
    #[must_use]
    pub fn bounded(window: usize) -> Self {
        Self::with_flow_window(Some(window))
    }

    /// Creates an unbounded stream whose first record takes position
    /// `base_position`. Used after a restart so fresh positions stay past
    /// everything the durable index already recorded.
    #[must_use]
    pub fn starting_at(base_position: i64) -> Self {
        let stream = Self::with_flow_window(None);
        stream.inner.write().next_position = base_position;
        stream
    }

    fn with_flow_window(flow_window: Option<usize>) -> Self {
        Self {
            inner: RwLock::new(StreamInner {
                records: Vec::new(),
                next_position: 0,
                cursors: Vec::new(),
            }),
            flow_window,
        }
    }

    /// Appends a message to the stream.
    ///
    /// Positions are strictly monotonic; the returned position identifies the
    /// record in the archive and in the sequence-number index.
    pub fn publish(&self, message: ArchivedMessage) -> PublishOutcome {
        let mut inner = self.inner.write();

        if let Some(window) = self.flow_window {
            let slowest = inner
                .cursors
                .iter()
                .map(|c| c.load(Ordering::Acquire))
                .min()
                .unwrap_or(inner.records.len());
            if inner.records.len() - slowest >= window {
                return PublishOutcome::BackPressure;
            }
        }

        let position = inner.next_position;
        let frame = FRAME_HEADER_LEN + message.bytes.len();
        let aligned = frame.div_ceil(FRAME_ALIGNMENT) * FRAME_ALIGNMENT;
        inner.next_position += aligned as i64;
        inner.records.push((position, message));

        PublishOutcome::Published(position)
    }

    /// Opens a cursor at the start of the stream.
    #[must_use]
    pub fn subscribe(self: &Arc<Self>) -> StreamCursor {
        self.subscribe_at(0)
    }

    /// Opens a cursor positioned at the first record whose position is
    /// `>= position`.
    #[must_use]
    pub fn subscribe_at(self: &Arc<Self>, position: i64) -> StreamCursor {
        let mut inner = self.inner.write();
        let index = inner.records.partition_point(|(p, _)| *p < position);
        let watermark = Arc::new(AtomicUsize::new(index));
        inner.cursors.push(Arc::clone(&watermark));

        StreamCursor {
            stream: Arc::clone(self),
            watermark,
        }
    }

    /// Returns the position the next published record will take.
    #[must_use]
    pub fn end_position(&self) -> i64 {
        self.inner.read().next_position
    }

    /// Returns the number of records in the stream.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.inner.read().records.len()
    }
}

impl Default for StreamBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A reader's independent position in a [`StreamBuffer`].
#[derive(Debug)]
pub struct StreamCursor {
    stream: Arc<StreamBuffer>,
    watermark: Arc<AtomicUsize>,
}

impl StreamCursor {
    /// Delivers up to `limit` records to `handler` in archive order.
    ///
    /// If the handler returns [`PollAction::Abort`], the cursor does not
    /// advance past the aborted record and the next poll re-delivers it.
    ///
    /// # Returns
    /// The number of records consumed.
    pub fn poll<F>(&mut self, mut handler: F, limit: usize) -> usize
    where
        F: FnMut(i64, &ArchivedMessage) -> PollAction,
    {
        let inner = self.stream.inner.read();
        let mut index = self.watermark.load(Ordering::Acquire);
        let mut consumed = 0;

        while consumed < limit {
            let Some((position, message)) = inner.records.get(index) else {
                break;
            };
            if handler(*position, message) == PollAction::Abort {
                break;
            }
            index += 1;
            consumed += 1;
        }

        self.watermark.store(index, Ordering::Release);
        consumed
    }

    /// Repositions the cursor at the first record with position `>= position`.
    pub fn seek(&mut self, position: i64) {
        let inner = self.stream.inner.read();
        let index = inner.records.partition_point(|(p, _)| *p < position);
        self.watermark.store(index, Ordering::Release);
    }

    /// Returns true if no unconsumed records remain.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.watermark.load(Ordering::Acquire) >= self.stream.record_count()
    }
}
