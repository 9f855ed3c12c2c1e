/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The per-connection FIX session state machine.
//!
//! One [`Session`] owns one connection's protocol state: logon negotiation,
//! sequence-number enforcement, gap detection, heartbeating, and logout. It
//! is mutated exclusively by the framer thread; all outbound traffic flows
//! through a single outbox so `MsgSeqNum` is strictly increasing on the wire
//! even across transport back-pressure.
//!
//! Timeouts run on monotonic time supplied to [`Session::poll`]; SendingTime
//! stamps use the wall clock inside the proxy.

use crate::config::SessionConfig;
use crate::proxy::{Publication, SendOutcome, SessionProxy};
use crate::state::SessionState;
use bytes::Bytes;
use fixgate_core::clock::Clock;
use fixgate_core::error::SessionRejectReason;
use fixgate_core::tags;
use fixgate_core::types::{CompId, DisconnectReason, MsgType, ResendRange, SessionId};
use fixgate_tagvalue::encoder::Encoder;
use fixgate_tagvalue::timestamp::UtcTimestamp;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the framer should do with an inbound message's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    /// Deliver the content to the application.
    Process,
    /// Drop the content; sequencing rules consumed the message.
    Ignore,
}

/// Standard-header fields validated before the sequence check.
#[derive(Debug)]
pub struct InboundHeader<'a> {
    /// MsgSeqNum (tag 34).
    pub msg_seq_num: u64,
    /// SenderCompID (tag 49) - the counterparty's id.
    pub sender_comp_id: &'a str,
    /// TargetCompID (tag 56) - our id.
    pub target_comp_id: &'a str,
    /// SendingTime (tag 52), unparsed.
    pub sending_time: &'a [u8],
}

/// One encoded message waiting in the outbox.
#[derive(Debug)]
struct PendingSend {
    seq_num: u64,
    msg_type: MsgType,
    bytes: Bytes,
}

/// Per-connection FIX session state machine.
pub struct Session<P: Publication> {
    id: SessionId,
    state: SessionState,
    proxy: SessionProxy<P>,
    clock: Arc<dyn Clock>,

    /// Our CompID; inbound TargetCompID must match.
    local_comp_id: CompId,
    /// The counterparty's CompID; inbound SenderCompID must match.
    remote_comp_id: CompId,

    expected_seq_no: u64,
    last_sent_msg_seq_num: u64,
    last_received_msg_seq_num: u64,

    heartbeat_interval_ns: u64,
    configured_heartbeat_secs: u64,
    logout_timeout_ns: u64,
    reset_seq_num_on_logon: bool,

    last_sent_time_ns: u64,
    last_received_time_ns: u64,
    logout_deadline_ns: Option<u64>,

    /// Seq of the message that opened the current gap; catching up past it
    /// returns the session to ACTIVE.
    awaiting_high_water: u64,

    /// Encoded messages not yet accepted by the transport, FIFO.
    outbox: VecDeque<PendingSend>,
}

impl<P: Publication> Session<P> {
    /// Creates a session.
    ///
    /// # Arguments
    /// * `id` - Stable session identity
    /// * `config` - Session configuration
    /// * `initial_state` - Starting state (`Connected` for an accepted
    ///   socket, `Connecting` for an outbound connect)
    /// * `clock` - Time source for timers and SendingTime
    /// * `publication` - Transport handle
    #[must_use]
    pub fn new(
        id: SessionId,
        config: &SessionConfig,
        initial_state: SessionState,
        clock: Arc<dyn Clock>,
        publication: P,
    ) -> Self {
        let proxy = SessionProxy::new(
            id,
            config.sender_comp_id.clone(),
            config.target_comp_id.clone(),
            config.begin_string,
            config.sending_time_precision,
            Arc::clone(&clock),
            publication,
        );
        let now = clock.monotonic_nanos();

        Self {
            id,
            state: initial_state,
            proxy,
            clock,
            local_comp_id: config.sender_comp_id.clone(),
            remote_comp_id: config.target_comp_id.clone(),
            expected_seq_no: 1,
            last_sent_msg_seq_num: 0,
            last_received_msg_seq_num: 0,
            heartbeat_interval_ns: config.heartbeat_interval.as_nanos() as u64,
            configured_heartbeat_secs: config.heartbeat_interval.as_secs(),
            logout_timeout_ns: config.logout_timeout.as_nanos() as u64,
            reset_seq_num_on_logon: config.reset_seq_num_on_logon,
            last_sent_time_ns: now,
            last_received_time_ns: now,
            logout_deadline_ns: None,
            awaiting_high_water: 0,
            outbox: VecDeque::new(),
        }
    }

    /// Seeds counters recovered from the durable index: the next inbound
    /// message is expected at `last_recv + 1`, the next outbound goes out as
    /// `last_sent + 1`.
    pub fn restore_sequence_numbers(&mut self, last_sent: u64, last_recv: u64) {
        self.last_sent_msg_seq_num = last_sent;
        self.last_received_msg_seq_num = last_recv;
        self.expected_seq_no = last_recv + 1;
    }

    /// Returns the stable session identity.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the next expected inbound MsgSeqNum.
    #[must_use]
    pub const fn expected_seq_no(&self) -> u64 {
        self.expected_seq_no
    }

    /// Returns the highest outbound MsgSeqNum allocated so far.
    #[must_use]
    pub const fn last_sent_msg_seq_num(&self) -> u64 {
        self.last_sent_msg_seq_num
    }

    /// Returns the highest accepted inbound MsgSeqNum.
    #[must_use]
    pub const fn last_received_msg_seq_num(&self) -> u64 {
        self.last_received_msg_seq_num
    }

    // ------------------------------------------------------------------
    // Header validation (before the sequence check)
    // ------------------------------------------------------------------

    /// Validates comp ids and SendingTime.
    ///
    /// On failure sends a Reject and a Logout, disconnects, and returns
    /// false; `expected_seq_no` is not advanced.
    pub fn validate_header(&mut self, header: &InboundHeader<'_>) -> bool {
        let offending_tag = if header.sender_comp_id != self.remote_comp_id.as_str() {
            Some(tags::SENDER_COMP_ID)
        } else if header.target_comp_id != self.local_comp_id.as_str() {
            Some(tags::TARGET_COMP_ID)
        } else {
            None
        };

        if let Some(tag) = offending_tag {
            warn!(
                session_id = %self.id,
                tag,
                sender = header.sender_comp_id,
                target = header.target_comp_id,
                "comp id mismatch"
            );
            let reject = self.next_seq_num();
            let bytes = self.proxy.reject(
                reject,
                header.msg_seq_num,
                Some(tag),
                None,
                SessionRejectReason::CompIdProblem,
            );
            self.enqueue(reject, MsgType::Reject, bytes);
            self.send_logout(None);
            self.disconnect(DisconnectReason::CompIdMismatch);
            return false;
        }

        if UtcTimestamp::parse(header.sending_time).is_err() {
            warn!(session_id = %self.id, "unparseable SendingTime");
            let reject = self.next_seq_num();
            let bytes = self.proxy.reject(
                reject,
                header.msg_seq_num,
                Some(tags::SENDING_TIME),
                None,
                SessionRejectReason::SendingTimeAccuracyProblem,
            );
            self.enqueue(reject, MsgType::Reject, bytes);
            self.send_logout(None);
            self.disconnect(DisconnectReason::InvalidSendingTime);
            return false;
        }

        true
    }

    // ------------------------------------------------------------------
    // Inbound protocol events
    // ------------------------------------------------------------------

    /// Applies the sequence-number rule to an inbound message.
    pub fn on_message(&mut self, msg_seq_num: u64, poss_dup: bool) -> MessageAction {
        self.last_received_time_ns = self.clock.monotonic_nanos();

        match self.state {
            SessionState::Disconnected | SessionState::Connecting => MessageAction::Ignore,
            SessionState::AwaitingResend => self.on_message_awaiting_resend(msg_seq_num, poss_dup),
            _ => self.on_message_sequenced(msg_seq_num, poss_dup),
        }
    }

    fn on_message_sequenced(&mut self, seq: u64, poss_dup: bool) -> MessageAction {
        if seq == self.expected_seq_no {
            self.accept(seq);
            MessageAction::Process
        } else if seq > self.expected_seq_no {
            debug!(
                session_id = %self.id,
                expected = self.expected_seq_no,
                received = seq,
                "sequence gap, requesting resend"
            );
            self.send_resend_request(self.expected_seq_no);
            self.awaiting_high_water = seq;
            self.state = SessionState::AwaitingResend;
            MessageAction::Ignore
        } else if poss_dup {
            MessageAction::Ignore
        } else {
            self.seq_num_too_low(seq);
            MessageAction::Ignore
        }
    }

    fn on_message_awaiting_resend(&mut self, seq: u64, poss_dup: bool) -> MessageAction {
        if poss_dup {
            if seq == self.expected_seq_no {
                self.accept(seq);
                self.check_gap_filled();
                MessageAction::Process
            } else {
                MessageAction::Ignore
            }
        } else if seq < self.expected_seq_no {
            self.seq_num_too_low(seq);
            MessageAction::Ignore
        } else {
            // Another live message past the gap; widen the high-water mark.
            if seq > self.awaiting_high_water {
                self.awaiting_high_water = seq;
            }
            MessageAction::Ignore
        }
    }

    /// Handles an inbound Logon, as acceptor (replying) or initiator
    /// (acknowledgement).
    pub fn on_logon(&mut self, msg_seq_num: u64, heartbeat_secs: u64, reset_seq_num_flag: bool) {
        self.last_received_time_ns = self.clock.monotonic_nanos();
        if heartbeat_secs > 0 {
            self.heartbeat_interval_ns = heartbeat_secs * 1_000_000_000;
        }

        match self.state {
            SessionState::Connected => {
                // Acceptor: reply with our Logon.
                if reset_seq_num_flag {
                    self.apply_logon_reset(msg_seq_num);
                    self.send_logon(heartbeat_secs, true);
                    self.become_active();
                    return;
                }

                if msg_seq_num == self.expected_seq_no {
                    self.accept(msg_seq_num);
                    self.send_logon(heartbeat_secs, false);
                    self.become_active();
                } else if msg_seq_num > self.expected_seq_no {
                    self.send_logon(heartbeat_secs, false);
                    self.send_resend_request(self.expected_seq_no);
                    self.awaiting_high_water = msg_seq_num;
                    self.state = SessionState::AwaitingResend;
                } else {
                    self.seq_num_too_low(msg_seq_num);
                }
            }
            SessionState::SentLogon => {
                // Initiator: the counterparty acknowledged our Logon.
                if reset_seq_num_flag {
                    self.expected_seq_no = msg_seq_num + 1;
                    self.last_received_msg_seq_num = msg_seq_num;
                    self.become_active();
                } else if msg_seq_num == self.expected_seq_no {
                    self.accept(msg_seq_num);
                    self.become_active();
                } else if msg_seq_num > self.expected_seq_no {
                    self.send_resend_request(self.expected_seq_no);
                    self.awaiting_high_water = msg_seq_num;
                    self.state = SessionState::AwaitingResend;
                } else {
                    self.seq_num_too_low(msg_seq_num);
                }
            }
            other => {
                warn!(session_id = %self.id, state = %other, "unexpected Logon");
            }
        }
    }

    /// Handles an inbound Logout: echoes it and disconnects, or treats it as
    /// the reply to our own Logout.
    pub fn on_logout(&mut self, msg_seq_num: u64) {
        self.last_received_time_ns = self.clock.monotonic_nanos();

        if self.state == SessionState::SentLogout {
            self.disconnect(DisconnectReason::ApplicationRequested);
            return;
        }

        if msg_seq_num == self.expected_seq_no {
            self.accept(msg_seq_num);
        }
        self.send_logout(None);
        self.disconnect(DisconnectReason::RemoteDisconnect);
    }

    /// Handles an inbound TestRequest by echoing its id in a Heartbeat.
    pub fn on_test_request(&mut self, msg_seq_num: u64, test_req_id: &str, poss_dup: bool) {
        if self.on_message(msg_seq_num, poss_dup) == MessageAction::Process {
            let seq = self.next_seq_num();
            let bytes = self.proxy.heartbeat(seq, Some(test_req_id));
            self.enqueue(seq, MsgType::Heartbeat, bytes);
        }
    }

    /// Handles an inbound Heartbeat; its arrival is all that matters.
    pub fn on_heartbeat(&mut self, msg_seq_num: u64, poss_dup: bool) {
        self.on_message(msg_seq_num, poss_dup);
    }

    /// Handles an inbound ResendRequest.
    ///
    /// Returns the validated range for the replayer, or `None` when the
    /// request was rejected or consumed by sequencing.
    pub fn on_resend_request(
        &mut self,
        msg_seq_num: u64,
        begin_seq_no: u64,
        end_seq_no: u64,
        poss_dup: bool,
    ) -> Option<ResendRange> {
        if self.on_message(msg_seq_num, poss_dup) != MessageAction::Process {
            return None;
        }

        let invalid = begin_seq_no < 1
            || (end_seq_no != 0 && end_seq_no < begin_seq_no)
            || begin_seq_no > self.last_sent_msg_seq_num;
        if invalid {
            warn!(
                session_id = %self.id,
                begin = begin_seq_no,
                end = end_seq_no,
                last_sent = self.last_sent_msg_seq_num,
                "rejecting resend request"
            );
            let seq = self.next_seq_num();
            let bytes = self.proxy.reject(
                seq,
                msg_seq_num,
                None,
                Some(MsgType::ResendRequest),
                SessionRejectReason::ValueIsIncorrect,
            );
            self.enqueue(seq, MsgType::Reject, bytes);
            return None;
        }

        info!(
            session_id = %self.id,
            begin = begin_seq_no,
            end = end_seq_no,
            "resend requested"
        );
        Some(ResendRange {
            session_id: self.id,
            begin_seq_no,
            end_seq_no,
            last_sent_seq_no: self.last_sent_msg_seq_num,
        })
    }

    /// Handles an inbound SequenceReset in either gap-fill or reset mode.
    pub fn on_sequence_reset(
        &mut self,
        msg_seq_num: u64,
        new_seq_no: u64,
        gap_fill_flag: bool,
        poss_dup: bool,
    ) {
        self.last_received_time_ns = self.clock.monotonic_nanos();

        if gap_fill_flag {
            self.on_gap_fill(msg_seq_num, new_seq_no, poss_dup);
        } else {
            self.on_reset(new_seq_no);
        }
    }

    fn on_gap_fill(&mut self, msg_seq_num: u64, new_seq_no: u64, poss_dup: bool) {
        if msg_seq_num < self.expected_seq_no {
            if poss_dup {
                return;
            }
            self.seq_num_too_low(msg_seq_num);
            return;
        }

        if msg_seq_num > self.expected_seq_no {
            self.send_resend_request(self.expected_seq_no);
            if msg_seq_num > self.awaiting_high_water {
                self.awaiting_high_water = msg_seq_num;
            }
            self.state = SessionState::AwaitingResend;
            return;
        }

        // A gap fill moving the sequence backwards is malformed.
        if new_seq_no < msg_seq_num {
            warn!(
                session_id = %self.id,
                msg_seq_num,
                new_seq_no,
                "gap fill attempted to move sequence backwards"
            );
            self.disconnect(DisconnectReason::InvalidGapFill);
            return;
        }

        self.expected_seq_no = new_seq_no;
        self.last_received_msg_seq_num = msg_seq_num;
        self.check_gap_filled();
    }

    fn on_reset(&mut self, new_seq_no: u64) {
        if new_seq_no >= self.expected_seq_no {
            debug!(session_id = %self.id, new_seq_no, "sequence reset accepted");
            self.expected_seq_no = new_seq_no;
        } else {
            let seq = self.next_seq_num();
            let bytes = self.proxy.reject(
                seq,
                new_seq_no,
                None,
                None,
                SessionRejectReason::ValueIsIncorrect,
            );
            self.enqueue(seq, MsgType::Reject, bytes);
        }
    }

    /// The socket died underneath the session.
    pub fn on_disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            info!(session_id = %self.id, "socket closed");
            self.state = SessionState::Disconnected;
            self.outbox.clear();
        }
    }

    // ------------------------------------------------------------------
    // Outbound operations
    // ------------------------------------------------------------------

    /// Sends our Logon (initiator side) and awaits the acknowledgement.
    pub fn start_logon(&mut self) {
        if self.reset_seq_num_on_logon {
            self.last_sent_msg_seq_num = 0;
            self.expected_seq_no = 1;
        }
        self.send_logon(self.configured_heartbeat_secs, self.reset_seq_num_on_logon);
        self.state = SessionState::SentLogon;
    }

    /// Sends a Logout and awaits the reply; times out into a disconnect.
    pub fn start_logout(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.send_logout(None);
        self.state = SessionState::SentLogout;
        self.logout_deadline_ns = Some(self.clock.monotonic_nanos() + self.logout_timeout_ns);
    }

    /// Sends an outbound TestRequest.
    pub fn send_test_request(&mut self, test_req_id: &str) {
        let seq = self.next_seq_num();
        let bytes = self.proxy.test_request(seq, test_req_id);
        self.enqueue(seq, MsgType::TestRequest, bytes);
    }

    /// Stamps and sends an application message; `body` appends the payload
    /// fields after the standard header.
    ///
    /// # Returns
    /// The MsgSeqNum the message was allocated.
    pub fn send(&mut self, msg_type: MsgType, body: impl FnOnce(&mut Encoder)) -> u64 {
        let seq = self.next_seq_num();
        let bytes = self.proxy.application(seq, msg_type, body);
        self.enqueue(seq, msg_type, bytes);
        seq
    }

    // ------------------------------------------------------------------
    // Duty cycle
    // ------------------------------------------------------------------

    /// Drives timers and pending outbound work.
    ///
    /// # Arguments
    /// * `now_ns` - Monotonic now
    ///
    /// # Returns
    /// Amount of work done this tick.
    pub fn poll(&mut self, now_ns: u64) -> usize {
        if self.state.is_terminal() {
            return 0;
        }

        let mut work = self.flush_outbox();

        match self.state {
            SessionState::SentLogout => {
                if let Some(deadline) = self.logout_deadline_ns
                    && now_ns >= deadline
                {
                    self.disconnect(DisconnectReason::LogoutTimeout);
                    work += 1;
                }
            }
            SessionState::Active | SessionState::AwaitingResend => {
                if now_ns.saturating_sub(self.last_received_time_ns)
                    >= 2 * self.heartbeat_interval_ns
                {
                    // Deliberately no intermediate TestRequest: a peer that
                    // silent for two intervals is gone.
                    self.disconnect(DisconnectReason::HeartbeatTimeout);
                    work += 1;
                } else if self.outbox.is_empty()
                    && now_ns.saturating_sub(self.last_sent_time_ns) >= self.heartbeat_interval_ns
                {
                    let seq = self.next_seq_num();
                    let bytes = self.proxy.heartbeat(seq, None);
                    self.enqueue(seq, MsgType::Heartbeat, bytes);
                    work += 1;
                }
            }
            _ => {}
        }

        work
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn accept(&mut self, seq: u64) {
        self.expected_seq_no = seq + 1;
        self.last_received_msg_seq_num = seq;
    }

    fn check_gap_filled(&mut self) {
        if self.state == SessionState::AwaitingResend
            && self.expected_seq_no > self.awaiting_high_water
        {
            info!(session_id = %self.id, "gap filled, session active");
            self.state = SessionState::Active;
        }
    }

    fn apply_logon_reset(&mut self, logon_seq_num: u64) {
        info!(session_id = %self.id, "sequence numbers reset on logon");
        self.expected_seq_no = logon_seq_num + 1;
        self.last_received_msg_seq_num = logon_seq_num;
        self.last_sent_msg_seq_num = 0;
    }

    fn become_active(&mut self) {
        info!(session_id = %self.id, "logon complete");
        self.state = SessionState::Active;
    }

    fn seq_num_too_low(&mut self, seq: u64) {
        warn!(
            session_id = %self.id,
            expected = self.expected_seq_no,
            received = seq,
            "msg seq num too low"
        );
        self.send_logout(Some("MsgSeqNum too low"));
        self.disconnect(DisconnectReason::SeqNumTooLow);
    }

    fn send_logon(&mut self, heartbeat_secs: u64, reset: bool) {
        let seq = self.next_seq_num();
        let bytes = self.proxy.logon(seq, heartbeat_secs, reset);
        self.enqueue(seq, MsgType::Logon, bytes);
    }

    fn send_logout(&mut self, text: Option<&str>) {
        let seq = self.next_seq_num();
        let bytes = self.proxy.logout(seq, text);
        self.enqueue(seq, MsgType::Logout, bytes);
    }

    fn send_resend_request(&mut self, begin: u64) {
        let seq = self.next_seq_num();
        let bytes = self.proxy.resend_request(seq, begin, 0);
        self.enqueue(seq, MsgType::ResendRequest, bytes);
    }

    fn next_seq_num(&mut self) -> u64 {
        self.last_sent_msg_seq_num += 1;
        self.last_sent_msg_seq_num
    }

    /// Queues an encoded message and immediately tries to drain the outbox.
    fn enqueue(&mut self, seq_num: u64, msg_type: MsgType, bytes: Bytes) {
        self.outbox.push_back(PendingSend {
            seq_num,
            msg_type,
            bytes,
        });
        self.flush_outbox();
    }

    /// Offers queued messages in FIFO order until the transport pushes back.
    fn flush_outbox(&mut self) -> usize {
        let mut sent = 0;
        while let Some(front) = self.outbox.front() {
            match self
                .proxy
                .offer(front.seq_num, front.msg_type, &front.bytes)
            {
                SendOutcome::Ok(_) => {
                    self.outbox.pop_front();
                    self.last_sent_time_ns = self.clock.monotonic_nanos();
                    sent += 1;
                }
                SendOutcome::BackPressure => break,
                SendOutcome::Disconnected => {
                    self.on_disconnect();
                    break;
                }
            }
        }
        sent
    }

    fn disconnect(&mut self, reason: DisconnectReason) {
        if self.state == SessionState::Disconnected {
            return;
        }
        info!(session_id = %self.id, %reason, "disconnecting");
        self.proxy.disconnect(reason);
        self.state = SessionState::Disconnected;
        self.outbox.clear();
        self.logout_deadline_ns = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::OutboundMessage;
    use fixgate_core::clock::FakeClock;
    use parking_lot::Mutex;
    use std::time::Duration;

    const HEARTBEAT_SECS: u64 = 30;

    #[derive(Debug, Default)]
    struct Recorded {
        frames: Vec<(u64, MsgType, Bytes)>,
        disconnects: Vec<DisconnectReason>,
        back_pressure_budget: usize,
    }

    #[derive(Debug, Clone, Default)]
    struct RecordingPublication {
        inner: Arc<Mutex<Recorded>>,
    }

    impl RecordingPublication {
        fn push_back_pressure(&self, attempts: usize) {
            self.inner.lock().back_pressure_budget = attempts;
        }

        fn sent(&self) -> Vec<(u64, MsgType)> {
            self.inner
                .lock()
                .frames
                .iter()
                .map(|(seq, msg_type, _)| (*seq, *msg_type))
                .collect()
        }

        fn last_frame_text(&self) -> String {
            let inner = self.inner.lock();
            let (_, _, bytes) = inner.frames.last().expect("no frames sent");
            String::from_utf8_lossy(bytes).replace('\x01', "|")
        }

        fn disconnects(&self) -> Vec<DisconnectReason> {
            self.inner.lock().disconnects.clone()
        }
    }

    impl Publication for RecordingPublication {
        fn offer(&mut self, message: &OutboundMessage<'_>) -> SendOutcome {
            let mut inner = self.inner.lock();
            if inner.back_pressure_budget > 0 {
                inner.back_pressure_budget -= 1;
                return SendOutcome::BackPressure;
            }
            inner.frames.push((
                message.seq_num,
                message.msg_type,
                Bytes::copy_from_slice(message.bytes),
            ));
            SendOutcome::Ok(inner.frames.len() as i64)
        }

        fn request_disconnect(&mut self, _session_id: SessionId, reason: DisconnectReason) {
            self.inner.lock().disconnects.push(reason);
        }
    }

    struct Harness {
        session: Session<RecordingPublication>,
        publication: RecordingPublication,
        clock: FakeClock,
    }

    fn harness(initial_state: SessionState) -> Harness {
        let clock = FakeClock::at(86_400_000_000_000, 0);
        let publication = RecordingPublication::default();
        let config = SessionConfig::new(
            CompId::new("GATEWAY").unwrap(),
            CompId::new("BANK").unwrap(),
        )
        .with_heartbeat_interval(Duration::from_secs(HEARTBEAT_SECS))
        .with_logout_timeout(Duration::from_secs(10));

        let session = Session::new(
            SessionId::new(1),
            &config,
            initial_state,
            Arc::new(clock.clone()),
            publication.clone(),
        );

        Harness {
            session,
            publication,
            clock,
        }
    }

    fn active_harness() -> Harness {
        harness(SessionState::Active)
    }

    #[test]
    fn test_heartbeat_after_interval() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(1, 0);

        h.clock.advance_seconds(HEARTBEAT_SECS);
        h.session.poll(h.clock.monotonic_nanos());

        assert_eq!(h.publication.sent(), vec![(2, MsgType::Heartbeat)]);
        let text = h.publication.last_frame_text();
        assert!(!text.contains("|112="), "unsolicited heartbeat has no TestReqID");
    }

    #[test]
    fn test_heartbeats_after_interval_repeatedly() {
        let mut h = active_harness();

        for expected_seq in 1..=3 {
            h.clock.advance_seconds(HEARTBEAT_SECS);
            // Keep the peer alive so the receive timeout stays out of the way.
            h.session.on_heartbeat(expected_seq, false);
            h.session.poll(h.clock.monotonic_nanos());
            assert_eq!(
                h.publication.sent().last(),
                Some(&(expected_seq, MsgType::Heartbeat))
            );
        }
    }

    #[test]
    fn test_disconnect_upon_timeout() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(0, 9);

        h.clock.advance_seconds(1);
        h.session.on_message(10, false);

        h.clock.advance_seconds(HEARTBEAT_SECS * 2);
        h.session.poll(h.clock.monotonic_nanos());

        assert_eq!(
            h.publication.disconnects(),
            vec![DisconnectReason::HeartbeatTimeout]
        );
        assert_eq!(h.session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_timeout_suppressed_by_traffic() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(0, 9);

        h.session.on_message(10, false);
        h.clock.advance_seconds(HEARTBEAT_SECS);
        h.session.poll(h.clock.monotonic_nanos());

        h.session.on_message(11, false);
        h.clock.advance_seconds(HEARTBEAT_SECS);
        h.session.poll(h.clock.monotonic_nanos());

        assert!(h.publication.disconnects().is_empty());
        assert_ne!(h.session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_high_seq_requests_resend() {
        let mut h = active_harness();

        let action = h.session.on_message(3, false);

        assert_eq!(action, MessageAction::Ignore);
        assert_eq!(h.publication.sent(), vec![(1, MsgType::ResendRequest)]);
        let text = h.publication.last_frame_text();
        assert!(text.contains("|7=1|"));
        assert!(text.contains("|16=0|"));
        assert_eq!(h.session.state(), SessionState::AwaitingResend);
        assert_eq!(h.session.expected_seq_no(), 1);
    }

    #[test]
    fn test_low_seq_disconnects() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(0, 2);

        let action = h.session.on_message(1, false);

        assert_eq!(action, MessageAction::Ignore);
        assert_eq!(h.publication.sent(), vec![(1, MsgType::Logout)]);
        assert!(h.publication.last_frame_text().contains("MsgSeqNum too low"));
        assert_eq!(
            h.publication.disconnects(),
            vec![DisconnectReason::SeqNumTooLow]
        );
        assert_eq!(h.session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_low_seq_poss_dup_ignored() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(0, 2);

        let action = h.session.on_message(1, true);

        assert_eq!(action, MessageAction::Ignore);
        assert!(h.publication.sent().is_empty());
        assert_eq!(h.session.state(), SessionState::Active);
        assert_eq!(h.session.expected_seq_no(), 3);
    }

    #[test]
    fn test_accepted_message_advances_expected() {
        let mut h = active_harness();

        assert_eq!(h.session.on_message(1, false), MessageAction::Process);
        assert_eq!(h.session.expected_seq_no(), 2);
        assert_eq!(h.session.last_received_msg_seq_num(), 1);
    }

    #[test]
    fn test_logout_is_echoed_then_disconnects() {
        let mut h = active_harness();

        h.session.on_logout(1);

        assert_eq!(h.publication.sent(), vec![(1, MsgType::Logout)]);
        assert_eq!(
            h.publication.disconnects(),
            vec![DisconnectReason::RemoteDisconnect]
        );
        assert_eq!(h.session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_test_request_answered_with_heartbeat() {
        let mut h = active_harness();

        h.session.on_test_request(1, "PING7", false);

        assert_eq!(h.publication.sent(), vec![(1, MsgType::Heartbeat)]);
        assert!(h.publication.last_frame_text().contains("|112=PING7|"));
    }

    #[test]
    fn test_unnecessary_sequence_reset_accepted() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(0, 3);

        h.session.on_sequence_reset(4, 4, false, false);

        assert_eq!(h.session.expected_seq_no(), 4);
        assert!(h.publication.sent().is_empty());
    }

    #[test]
    fn test_sequence_reset_forward_accepted() {
        let mut h = active_harness();

        h.session.on_sequence_reset(1, 4, false, false);

        assert_eq!(h.session.expected_seq_no(), 4);
        assert!(h.publication.sent().is_empty());
    }

    #[test]
    fn test_low_sequence_reset_rejected() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(3, 3);

        h.session.on_sequence_reset(2, 1, false, false);

        assert_eq!(h.session.expected_seq_no(), 4);
        assert_eq!(h.publication.sent(), vec![(4, MsgType::Reject)]);
        let text = h.publication.last_frame_text();
        assert!(text.contains("|45=1|"));
        assert!(text.contains("|373=5|"));
    }

    #[test]
    fn test_duplicate_gap_fill_ignored() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(0, 2);

        h.session.on_sequence_reset(1, 4, true, true);

        assert!(h.publication.sent().is_empty());
        assert_eq!(h.session.expected_seq_no(), 3);
    }

    #[test]
    fn test_low_gap_fill_without_poss_dup_disconnects() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(0, 2);

        h.session.on_sequence_reset(1, 4, true, false);

        assert_eq!(
            h.publication.disconnects(),
            vec![DisconnectReason::SeqNumTooLow]
        );
    }

    #[test]
    fn test_gap_fill_at_expected_advances() {
        let mut h = active_harness();

        h.session.on_sequence_reset(1, 4, true, true);

        assert_eq!(h.session.expected_seq_no(), 4);
        assert!(h.publication.sent().is_empty());
    }

    #[test]
    fn test_high_gap_fill_requests_resend() {
        let mut h = active_harness();

        h.session.on_sequence_reset(3, 4, true, false);

        assert_eq!(h.publication.sent(), vec![(1, MsgType::ResendRequest)]);
        assert_eq!(h.session.state(), SessionState::AwaitingResend);
    }

    #[test]
    fn test_backwards_gap_fill_disconnects() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(0, 4);

        h.session.on_sequence_reset(5, 3, true, false);

        assert_eq!(
            h.publication.disconnects(),
            vec![DisconnectReason::InvalidGapFill]
        );
        assert_eq!(h.session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_acceptor_logon_reset_seq_num_flag() {
        let mut h = harness(SessionState::Connected);
        h.session.restore_sequence_numbers(17, 23);

        h.session.on_logon(1, HEARTBEAT_SECS, true);

        // Logon reply goes out as #1 and both counters restart.
        assert_eq!(h.publication.sent(), vec![(1, MsgType::Logon)]);
        assert!(h.publication.last_frame_text().contains("|141=Y|"));
        assert_eq!(h.session.expected_seq_no(), 2);
        assert_eq!(h.session.last_sent_msg_seq_num(), 1);
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[test]
    fn test_acceptor_logon_replies_and_activates() {
        let mut h = harness(SessionState::Connected);

        h.session.on_logon(1, HEARTBEAT_SECS, false);

        assert_eq!(h.publication.sent(), vec![(1, MsgType::Logon)]);
        assert_eq!(h.session.state(), SessionState::Active);
        assert_eq!(h.session.expected_seq_no(), 2);
    }

    #[test]
    fn test_initiator_logon_ack_activates() {
        let mut h = harness(SessionState::Connecting);

        h.session.start_logon();
        assert_eq!(h.session.state(), SessionState::SentLogon);
        assert_eq!(h.publication.sent(), vec![(1, MsgType::Logon)]);

        h.session.on_logon(1, HEARTBEAT_SECS, false);
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[test]
    fn test_high_logon_requests_resend_after_reply() {
        let mut h = harness(SessionState::Connected);

        h.session.on_logon(5, HEARTBEAT_SECS, false);

        assert_eq!(
            h.publication.sent(),
            vec![(1, MsgType::Logon), (2, MsgType::ResendRequest)]
        );
        assert_eq!(h.session.state(), SessionState::AwaitingResend);
        assert_eq!(h.session.expected_seq_no(), 1);
    }

    #[test]
    fn test_comp_id_mismatch_rejects_and_disconnects() {
        let mut h = active_harness();

        let ok = h.session.validate_header(&InboundHeader {
            msg_seq_num: 5,
            sender_comp_id: "INTRUDER",
            target_comp_id: "GATEWAY",
            sending_time: b"20260127-10:00:00.000",
        });

        assert!(!ok);
        assert_eq!(
            h.publication.sent(),
            vec![(1, MsgType::Reject), (2, MsgType::Logout)]
        );
        let frames = h.publication.inner.lock().frames.clone();
        let reject_text = String::from_utf8_lossy(&frames[0].2).replace('\x01', "|");
        assert!(reject_text.contains("|45=5|"));
        assert!(reject_text.contains("|371=49|"));
        assert!(reject_text.contains("|373=9|"));
        assert_eq!(
            h.publication.disconnects(),
            vec![DisconnectReason::CompIdMismatch]
        );
        assert_eq!(h.session.expected_seq_no(), 1);
    }

    #[test]
    fn test_bad_sending_time_rejects_and_disconnects() {
        let mut h = active_harness();

        let ok = h.session.validate_header(&InboundHeader {
            msg_seq_num: 1,
            sender_comp_id: "BANK",
            target_comp_id: "GATEWAY",
            sending_time: b"yesterday",
        });

        assert!(!ok);
        assert_eq!(
            h.publication.sent(),
            vec![(1, MsgType::Reject), (2, MsgType::Logout)]
        );
        let frames = h.publication.inner.lock().frames.clone();
        let reject_text = String::from_utf8_lossy(&frames[0].2).replace('\x01', "|");
        assert!(reject_text.contains("|371=52|"));
        assert_eq!(
            h.publication.disconnects(),
            vec![DisconnectReason::InvalidSendingTime]
        );
    }

    #[test]
    fn test_valid_header_passes() {
        let mut h = active_harness();

        let ok = h.session.validate_header(&InboundHeader {
            msg_seq_num: 1,
            sender_comp_id: "BANK",
            target_comp_id: "GATEWAY",
            sending_time: b"20260127-10:00:00.000",
        });

        assert!(ok);
        assert!(h.publication.sent().is_empty());
    }

    #[test]
    fn test_resend_request_accepted() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(4, 0);

        let range = h.session.on_resend_request(1, 1, 0, false).unwrap();

        assert_eq!(range.begin_seq_no, 1);
        assert_eq!(range.end_seq_no, 0);
        assert_eq!(range.last_sent_seq_no, 4);
        assert!(h.publication.sent().is_empty());
    }

    #[test]
    fn test_resend_request_past_history_rejected() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(4, 0);

        let range = h.session.on_resend_request(1, 9, 0, false);

        assert!(range.is_none());
        assert_eq!(h.publication.sent(), vec![(5, MsgType::Reject)]);
        let text = h.publication.last_frame_text();
        assert!(text.contains("|372=2|"));
        assert!(text.contains("|45=1|"));
    }

    #[test]
    fn test_resend_request_inverted_range_rejected() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(9, 0);

        assert!(h.session.on_resend_request(1, 5, 3, false).is_none());
        assert_eq!(h.publication.sent(), vec![(10, MsgType::Reject)]);
    }

    #[test]
    fn test_awaiting_resend_poss_dup_catch_up() {
        let mut h = active_harness();

        // Gap: expected 1, got 3.
        h.session.on_message(3, false);
        assert_eq!(h.session.state(), SessionState::AwaitingResend);

        // Replayed 1 and 2 arrive as possible duplicates.
        assert_eq!(h.session.on_message(1, true), MessageAction::Process);
        assert_eq!(h.session.on_message(2, true), MessageAction::Process);
        assert_eq!(h.session.state(), SessionState::AwaitingResend);

        // The original gap message is replayed last; session catches up.
        assert_eq!(h.session.on_message(3, true), MessageAction::Process);
        assert_eq!(h.session.state(), SessionState::Active);
        assert_eq!(h.session.expected_seq_no(), 4);
    }

    #[test]
    fn test_awaiting_resend_ignores_live_traffic() {
        let mut h = active_harness();

        h.session.on_message(3, false);
        assert_eq!(h.session.on_message(5, false), MessageAction::Ignore);
        assert_eq!(h.session.expected_seq_no(), 1);

        // Catch-up now has to pass seq 5 before going active.
        for seq in 1..=4 {
            h.session.on_message(seq, true);
            assert_eq!(h.session.state(), SessionState::AwaitingResend);
        }
        h.session.on_message(5, true);
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[test]
    fn test_gap_fill_completes_resend() {
        let mut h = active_harness();

        h.session.on_message(4, false);
        assert_eq!(h.session.state(), SessionState::AwaitingResend);

        // Peer had only sent admin messages; one gap fill covers the range.
        h.session.on_sequence_reset(1, 5, true, true);

        assert_eq!(h.session.expected_seq_no(), 5);
        assert_eq!(h.session.state(), SessionState::Active);
    }

    #[test]
    fn test_start_logout_then_reply_disconnects() {
        let mut h = active_harness();

        h.session.start_logout();
        assert_eq!(h.session.state(), SessionState::SentLogout);
        assert_eq!(h.publication.sent(), vec![(1, MsgType::Logout)]);

        h.session.on_logout(1);
        assert_eq!(h.session.state(), SessionState::Disconnected);
        assert_eq!(
            h.publication.disconnects(),
            vec![DisconnectReason::ApplicationRequested]
        );
    }

    #[test]
    fn test_logout_timeout_disconnects() {
        let mut h = active_harness();

        h.session.start_logout();
        h.clock.advance_seconds(11);
        h.session.poll(h.clock.monotonic_nanos());

        assert_eq!(
            h.publication.disconnects(),
            vec![DisconnectReason::LogoutTimeout]
        );
        assert_eq!(h.session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_back_pressure_retries_without_duplicate() {
        let mut h = active_harness();
        h.publication.push_back_pressure(1);

        h.clock.advance_seconds(HEARTBEAT_SECS);
        h.session.on_heartbeat(1, false);
        h.session.poll(h.clock.monotonic_nanos());

        // The offer pushed back; nothing on the wire yet.
        assert!(h.publication.sent().is_empty());

        // The retry goes out with the originally allocated seq num.
        h.session.poll(h.clock.monotonic_nanos());
        assert_eq!(h.publication.sent(), vec![(1, MsgType::Heartbeat)]);

        // Further polls must not duplicate it.
        h.session.poll(h.clock.monotonic_nanos());
        assert_eq!(h.publication.sent().len(), 1);
        assert_eq!(h.session.last_sent_msg_seq_num(), 1);
    }

    #[test]
    fn test_back_pressure_preserves_fifo_order() {
        let mut h = active_harness();
        h.publication.push_back_pressure(1);

        // Reject (seq 1) is parked by back-pressure, then a heartbeat request
        // arrives; both must leave in allocation order.
        h.session.on_sequence_reset(1, 0, false, false);
        h.session.on_test_request(1, "PING", false);

        h.session.poll(h.clock.monotonic_nanos());

        assert_eq!(
            h.publication.sent(),
            vec![(1, MsgType::Reject), (2, MsgType::Heartbeat)]
        );
    }

    #[test]
    fn test_outbound_seq_nums_strictly_increase() {
        let mut h = active_harness();

        h.session.send(MsgType::Application(b'D'), |encoder| {
            encoder.put_str(11, "A");
        });
        h.session.on_test_request(1, "X", false);
        h.session.send(MsgType::Application(b'D'), |encoder| {
            encoder.put_str(11, "B");
        });

        let seqs: Vec<u64> = h.publication.sent().iter().map(|(s, _)| *s).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn test_persistent_counters_resume() {
        let mut h = active_harness();
        h.session.restore_sequence_numbers(3, 3);

        h.session.send_test_request("RECONNECT");

        assert_eq!(h.publication.sent(), vec![(4, MsgType::TestRequest)]);
        assert_eq!(h.session.expected_seq_no(), 4);
    }

    #[test]
    fn test_terminal_state_stays_terminal() {
        let mut h = active_harness();
        h.session.on_disconnect();

        assert_eq!(h.session.on_message(1, false), MessageAction::Ignore);
        assert_eq!(h.session.poll(u64::MAX), 0);
        assert!(h.publication.sent().is_empty());
    }
}
