/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Servicing resend requests: re-emission and gap-filling.
//!
//! For each accepted `ResendRequest` the replayer walks the session's
//! archived sent messages. Runs of session-level messages collapse into a
//! single `SequenceReset(GapFill=Y)`; application messages are re-emitted
//! with `PossDupFlag=Y`, a fresh `SendingTime`, and the original stamp
//! preserved in `OrigSendingTime`. A trailing gap fill advances the
//! counterparty past the end of the range.
//!
//! A replay survives transport back-pressure: its progress lives in an
//! explicit `(cursor, pending gap, pending emissions)` record inspected on
//! each worker tick, so a retried tick resumes exactly where the transport
//! pushed back and never re-sends what already went out. At most
//! `max_concurrent` channels run at once; overflow waits FIFO.

use crate::index::ReplayIndex;
use crate::query::{ReplayCursor, ReplayQuery};
use bytes::Bytes;
use fixgate_core::clock::Clock;
use fixgate_core::error::ReplayError;
use fixgate_core::tags;
use fixgate_core::types::{CompId, MsgType, ResendRange, SessionId};
use fixgate_session::proxy::{Publication, SendOutcome, SessionProxy};
use fixgate_tagvalue::decoder::Decoder;
use fixgate_tagvalue::encoder::Encoder;
use fixgate_tagvalue::timestamp::{TimestampPrecision, UtcTimestamp};
use fixgate_transport::stream::ArchivedMessage;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

/// Message types gap-filled (rather than retransmitted) during replay, by
/// wire byte: Heartbeat, TestRequest, ResendRequest, Reject, SequenceReset,
/// Logout, Logon.
pub const DEFAULT_GAPFILL_ON_REPLAY: &[u8] = &[b'0', b'1', b'2', b'3', b'4', b'5', b'A'];

/// Session facts a replay channel needs to encode on the session's behalf.
#[derive(Debug, Clone)]
pub struct ReplaySessionInfo {
    /// Our CompID (tag 49).
    pub sender_comp_id: CompId,
    /// The counterparty's CompID (tag 56).
    pub target_comp_id: CompId,
    /// FIX version string.
    pub begin_string: &'static str,
    /// SendingTime fraction width.
    pub precision: TimestampPrecision,
}

/// Result of one replay duty-cycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Progress was made; step again.
    Continue,
    /// The transport pushed back; retry the same emission next tick.
    BackPressure,
    /// The range has been fully replayed.
    Complete,
    /// The connection died; the replay is abandoned.
    Aborted,
}

/// One in-flight replay for one session.
#[derive(Debug)]
pub struct ReplayChannel<P: Publication> {
    session_id: SessionId,
    begin_seq_no: u64,
    effective_end: u64,
    cursor: ReplayCursor,
    proxy: SessionProxy<P>,
    clock: Arc<dyn Clock>,
    begin_string: &'static str,
    precision: TimestampPrecision,
    gapfill_types: Vec<u8>,

    pending_gap_start: Option<u64>,
    pending_emit: VecDeque<(u64, MsgType, Bytes)>,
    last_replayed: u64,
    exhausted: bool,
}

impl<P: Publication> ReplayChannel<P> {
    fn new(
        range: ResendRange,
        effective_end: u64,
        cursor: ReplayCursor,
        proxy: SessionProxy<P>,
        clock: Arc<dyn Clock>,
        info: &ReplaySessionInfo,
        gapfill_types: Vec<u8>,
    ) -> Self {
        Self {
            session_id: range.session_id,
            begin_seq_no: range.begin_seq_no,
            effective_end,
            cursor,
            proxy,
            clock,
            begin_string: info.begin_string,
            precision: info.precision,
            gapfill_types,
            pending_gap_start: None,
            pending_emit: VecDeque::new(),
            last_replayed: 0,
            exhausted: false,
        }
    }

    /// Returns the session this channel replays for.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Advances the replay by one unit of work.
    pub fn step(&mut self) -> StepOutcome {
        // Emissions first: nothing new is produced while sends are parked.
        while let Some((seq_num, msg_type, bytes)) = self.pending_emit.front() {
            match self.proxy.offer(*seq_num, *msg_type, bytes) {
                SendOutcome::Ok(_) => {
                    self.pending_emit.pop_front();
                }
                SendOutcome::BackPressure => return StepOutcome::BackPressure,
                SendOutcome::Disconnected => return StepOutcome::Aborted,
            }
        }

        if self.exhausted {
            return StepOutcome::Complete;
        }

        match self.cursor.next() {
            Some(message) => {
                if message.seq_num < self.begin_seq_no {
                    return StepOutcome::Continue;
                }
                if message.seq_num > self.effective_end {
                    self.finish();
                    return StepOutcome::Continue;
                }
                self.on_archived(&message);
                StepOutcome::Continue
            }
            None => {
                self.finish();
                StepOutcome::Continue
            }
        }
    }

    fn on_archived(&mut self, message: &ArchivedMessage) {
        if self.gapfill_types.contains(&message.msg_type.wire_byte()) {
            self.pending_gap_start.get_or_insert(message.seq_num);
            return;
        }

        if let Some(gap_start) = self.pending_gap_start.take() {
            self.enqueue_gap_fill(gap_start, message.seq_num);
        }

        match self.re_stamp(message) {
            Ok(bytes) => {
                self.pending_emit
                    .push_back((message.seq_num, message.msg_type, bytes));
                self.last_replayed = message.seq_num;
            }
            Err(error) => {
                // An unencodable archived message is gap-filled over rather
                // than leaving a hole in the resent sequence.
                warn!(
                    session_id = %self.session_id,
                    seq_num = message.seq_num,
                    %error,
                    "gap-filling unreplayable message"
                );
                self.pending_gap_start = Some(message.seq_num);
            }
        }
    }

    fn finish(&mut self) {
        if self.exhausted {
            return;
        }
        self.exhausted = true;

        if self.effective_end > self.last_replayed {
            let gap_start = self
                .pending_gap_start
                .take()
                .unwrap_or(self.last_replayed + 1);
            self.enqueue_gap_fill(gap_start, self.effective_end + 1);
        }
    }

    fn enqueue_gap_fill(&mut self, gap_start: u64, new_seq_no: u64) {
        let bytes = self.proxy.sequence_reset(gap_start, new_seq_no, true, true);
        self.pending_emit
            .push_back((gap_start, MsgType::SequenceReset, bytes));
    }

    /// Re-encodes an archived message with `PossDupFlag=Y`, a fresh
    /// SendingTime, and `OrigSendingTime` carrying the original stamp.
    fn re_stamp(&self, message: &ArchivedMessage) -> Result<Bytes, ReplayError> {
        let mut decoder = Decoder::new(&message.bytes).with_checksum_validation(false);
        let parsed = decoder.decode().map_err(|e| ReplayError::ReEncodeFailed {
            seq_num: message.seq_num,
            reason: e.to_string(),
        })?;
        if parsed.find(tags::SENDING_TIME).is_none() {
            return Err(ReplayError::ReEncodeFailed {
                seq_num: message.seq_num,
                reason: "archived message has no SendingTime".to_string(),
            });
        }

        let mut encoder = Encoder::new(self.begin_string);
        for field in parsed.fields() {
            match field.tag {
                tags::BEGIN_STRING
                | tags::BODY_LENGTH
                | tags::CHECK_SUM
                | tags::POSS_DUP_FLAG
                | tags::ORIG_SENDING_TIME => {}
                tags::SENDING_TIME => {
                    encoder.put_timestamp(
                        tags::SENDING_TIME,
                        UtcTimestamp::from_epoch_nanos(self.clock.epoch_nanos()),
                        self.precision,
                    );
                    encoder.put_bool(tags::POSS_DUP_FLAG, true);
                    encoder.put_raw(tags::ORIG_SENDING_TIME, field.value);
                }
                _ => encoder.put_raw(field.tag, field.value),
            }
        }

        Ok(encoder.finish().freeze())
    }
}

struct PendingReplay<P: Publication> {
    range: ResendRange,
    info: ReplaySessionInfo,
    publication: P,
}

/// Drives all in-flight replays under a global concurrency bound.
pub struct Replayer<P: Publication> {
    query: ReplayQuery,
    clock: Arc<dyn Clock>,
    gapfill_types: Vec<u8>,
    max_concurrent: usize,
    active: Vec<ReplayChannel<P>>,
    queued: VecDeque<PendingReplay<P>>,
    /// Sessions whose replays ran to completion since the last drain.
    completed: Vec<SessionId>,
}

impl<P: Publication> Replayer<P> {
    /// Creates a replayer over the archive.
    ///
    /// # Arguments
    /// * `query` - Archive read access
    /// * `clock` - Wall clock for re-stamped SendingTimes
    /// * `gapfill_types` - Wire bytes of message types gap-filled instead of
    ///   re-sent
    /// * `max_concurrent` - Bound on simultaneously replaying sessions
    #[must_use]
    pub fn new(
        query: ReplayQuery,
        clock: Arc<dyn Clock>,
        gapfill_types: Vec<u8>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            query,
            clock,
            gapfill_types,
            max_concurrent: max_concurrent.max(1),
            active: Vec::new(),
            queued: VecDeque::new(),
            completed: Vec::new(),
        }
    }

    /// Accepts a validated resend request; starts it now or queues it behind
    /// the concurrency bound.
    pub fn on_resend_request(
        &mut self,
        range: ResendRange,
        info: ReplaySessionInfo,
        publication: P,
        index: &ReplayIndex,
    ) {
        let pending = PendingReplay {
            range,
            info,
            publication,
        };
        if self.active.len() < self.max_concurrent {
            let channel = self.start(pending, index);
            self.active.push(channel);
        } else {
            info!(
                session_id = %range.session_id,
                queued = self.queued.len() + 1,
                "replay concurrency bound reached, queueing"
            );
            self.queued.push_back(pending);
        }
    }

    /// Steps every active channel once and promotes queued requests into
    /// freed slots. Completed sessions are collected for
    /// [`Replayer::drain_completed`].
    ///
    /// # Returns
    /// Amount of work done this tick.
    pub fn do_work(&mut self, index: &ReplayIndex) -> usize {
        let mut work = 0;

        let Self {
            active, completed, ..
        } = self;
        active.retain_mut(|channel| match channel.step() {
            StepOutcome::Continue => {
                work += 1;
                true
            }
            StepOutcome::BackPressure => true,
            StepOutcome::Complete => {
                info!(session_id = %channel.session_id(), "replay complete");
                completed.push(channel.session_id());
                work += 1;
                false
            }
            StepOutcome::Aborted => {
                info!(session_id = %channel.session_id(), "replay aborted");
                work += 1;
                false
            }
        });

        while self.active.len() < self.max_concurrent {
            let Some(pending) = self.queued.pop_front() else {
                break;
            };
            let channel = self.start(pending, index);
            self.active.push(channel);
            work += 1;
        }

        work
    }

    /// Takes the sessions whose replays completed since the last call, so
    /// the caller can signal each resend request as fully serviced.
    #[must_use]
    pub fn drain_completed(&mut self) -> Vec<SessionId> {
        std::mem::take(&mut self.completed)
    }

    /// Drops any replay state for a disconnected session.
    pub fn abort_session(&mut self, session_id: SessionId) {
        self.active.retain(|c| c.session_id() != session_id);
        self.queued.retain(|p| p.range.session_id != session_id);
    }

    /// Returns the number of currently replaying sessions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Returns the number of requests waiting behind the concurrency bound.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    fn start(&self, pending: PendingReplay<P>, index: &ReplayIndex) -> ReplayChannel<P> {
        let range = pending.range;
        let effective_end = if range.end_seq_no == 0 {
            range.last_sent_seq_no
        } else {
            range.end_seq_no.min(range.last_sent_seq_no)
        };

        info!(
            session_id = %range.session_id,
            begin = range.begin_seq_no,
            effective_end,
            "starting replay"
        );

        let cursor = self
            .query
            .cursor(index, range.session_id, range.begin_seq_no);
        let proxy = SessionProxy::new(
            range.session_id,
            pending.info.sender_comp_id.clone(),
            pending.info.target_comp_id.clone(),
            pending.info.begin_string,
            pending.info.precision,
            Arc::clone(&self.clock),
            pending.publication,
        );

        ReplayChannel::new(
            range,
            effective_end,
            cursor,
            proxy,
            Arc::clone(&self.clock),
            &pending.info,
            self.gapfill_types.clone(),
        )
    }
}
