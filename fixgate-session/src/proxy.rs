/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Outbound encoding of session-level messages.
//!
//! The proxy is a stateless encoder wrapper: each operation stamps the full
//! standard header (BeginString, BodyLength, MsgType, comp ids, MsgSeqNum,
//! SendingTime) and the checksum trailer. Encoding is separate from
//! [`SessionProxy::offer`] so the owning session can park an encoded message
//! across back-pressure and re-offer the identical bytes - sequence numbers
//! are allocated exactly once per logical message.

use bytes::Bytes;
use fixgate_core::clock::Clock;
use fixgate_core::error::SessionRejectReason;
use fixgate_core::tags;
use fixgate_core::types::{CompId, DisconnectReason, MsgType, SessionId};
use fixgate_tagvalue::encoder::Encoder;
use fixgate_tagvalue::timestamp::{TimestampPrecision, UtcTimestamp};
use std::sync::Arc;

/// Outcome of offering a message to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted; carries the archive position it was published at.
    Ok(i64),
    /// The transport cannot take the bytes now; retry on the next poll.
    BackPressure,
    /// The connection is gone; the attempt is dropped.
    Disconnected,
}

/// A fully encoded outbound message offered to the transport.
#[derive(Debug)]
pub struct OutboundMessage<'a> {
    /// The owning session.
    pub session_id: SessionId,
    /// The MsgSeqNum stamped in the message.
    pub seq_num: u64,
    /// The message type.
    pub msg_type: MsgType,
    /// Complete wire bytes, envelope included.
    pub bytes: &'a [u8],
}

/// Non-owning handle through which a session writes to its connection.
///
/// Implementations publish onto the outbound archive stream and route
/// disconnect requests back to the framer; tests substitute a recorder.
pub trait Publication: Send {
    /// Offers one complete message to the transport.
    fn offer(&mut self, message: &OutboundMessage<'_>) -> SendOutcome;

    /// Asks the framer to tear the connection down.
    fn request_disconnect(&mut self, session_id: SessionId, reason: DisconnectReason);
}

/// Stateless encoder wrapper for session-level messages.
#[derive(Debug)]
pub struct SessionProxy<P: Publication> {
    publication: P,
    clock: Arc<dyn Clock>,
    session_id: SessionId,
    sender_comp_id: CompId,
    target_comp_id: CompId,
    begin_string: &'static str,
    precision: TimestampPrecision,
}

impl<P: Publication> SessionProxy<P> {
    /// Creates a proxy for one session.
    ///
    /// # Arguments
    /// * `session_id` - The owning session
    /// * `sender_comp_id` - Our CompID (tag 49)
    /// * `target_comp_id` - The counterparty's CompID (tag 56)
    /// * `begin_string` - FIX version string
    /// * `precision` - SendingTime fraction width
    /// * `clock` - Wall clock for SendingTime stamps
    /// * `publication` - Transport handle
    #[must_use]
    pub fn new(
        session_id: SessionId,
        sender_comp_id: CompId,
        target_comp_id: CompId,
        begin_string: &'static str,
        precision: TimestampPrecision,
        clock: Arc<dyn Clock>,
        publication: P,
    ) -> Self {
        Self {
            publication,
            clock,
            session_id,
            sender_comp_id,
            target_comp_id,
            begin_string,
            precision,
        }
    }

    /// Encodes a Logon.
    #[must_use]
    pub fn logon(&self, seq_num: u64, heartbeat_secs: u64, reset_seq_num: bool) -> Bytes {
        let mut encoder = self.header(MsgType::Logon, seq_num);
        encoder.put_uint(tags::ENCRYPT_METHOD, 0);
        encoder.put_uint(tags::HEART_BT_INT, heartbeat_secs);
        if reset_seq_num {
            encoder.put_bool(tags::RESET_SEQ_NUM_FLAG, true);
        }
        encoder.finish().freeze()
    }

    /// Encodes a Logout, with optional explanatory text.
    #[must_use]
    pub fn logout(&self, seq_num: u64, text: Option<&str>) -> Bytes {
        let mut encoder = self.header(MsgType::Logout, seq_num);
        if let Some(text) = text {
            encoder.put_str(tags::TEXT, text);
        }
        encoder.finish().freeze()
    }

    /// Encodes a Heartbeat, echoing a TestReqID when replying to a
    /// TestRequest.
    #[must_use]
    pub fn heartbeat(&self, seq_num: u64, test_req_id: Option<&str>) -> Bytes {
        let mut encoder = self.header(MsgType::Heartbeat, seq_num);
        if let Some(id) = test_req_id {
            encoder.put_str(tags::TEST_REQ_ID, id);
        }
        encoder.finish().freeze()
    }

    /// Encodes a TestRequest.
    #[must_use]
    pub fn test_request(&self, seq_num: u64, test_req_id: &str) -> Bytes {
        let mut encoder = self.header(MsgType::TestRequest, seq_num);
        encoder.put_str(tags::TEST_REQ_ID, test_req_id);
        encoder.finish().freeze()
    }

    /// Encodes a ResendRequest for `[begin, end]`, `end == 0` meaning
    /// "through most recent".
    #[must_use]
    pub fn resend_request(&self, seq_num: u64, begin: u64, end: u64) -> Bytes {
        let mut encoder = self.header(MsgType::ResendRequest, seq_num);
        encoder.put_uint(tags::BEGIN_SEQ_NO, begin);
        encoder.put_uint(tags::END_SEQ_NO, end);
        encoder.finish().freeze()
    }

    /// Encodes a session-level Reject.
    #[must_use]
    pub fn reject(
        &self,
        seq_num: u64,
        ref_seq_num: u64,
        ref_tag_id: Option<u32>,
        ref_msg_type: Option<MsgType>,
        reason: SessionRejectReason,
    ) -> Bytes {
        let mut encoder = self.header(MsgType::Reject, seq_num);
        encoder.put_uint(tags::REF_SEQ_NUM, ref_seq_num);
        if let Some(tag) = ref_tag_id {
            encoder.put_uint(tags::REF_TAG_ID, u64::from(tag));
        }
        if let Some(msg_type) = ref_msg_type {
            encoder.put_char(tags::REF_MSG_TYPE, msg_type.wire_byte());
        }
        encoder.put_uint(tags::SESSION_REJECT_REASON, u64::from(reason.code()));
        encoder.finish().freeze()
    }

    /// Encodes a SequenceReset.
    ///
    /// Gap fills emitted during replay set both `gap_fill` and `poss_dup`.
    #[must_use]
    pub fn sequence_reset(
        &self,
        seq_num: u64,
        new_seq_no: u64,
        gap_fill: bool,
        poss_dup: bool,
    ) -> Bytes {
        let mut encoder = self.header_with_poss_dup(MsgType::SequenceReset, seq_num, poss_dup);
        encoder.put_bool(tags::GAP_FILL_FLAG, gap_fill);
        encoder.put_uint(tags::NEW_SEQ_NO, new_seq_no);
        encoder.finish().freeze()
    }

    /// Encodes an application message; `body` appends the payload fields
    /// after the stamped header.
    #[must_use]
    pub fn application(
        &self,
        seq_num: u64,
        msg_type: MsgType,
        body: impl FnOnce(&mut Encoder),
    ) -> Bytes {
        let mut encoder = self.header(msg_type, seq_num);
        body(&mut encoder);
        encoder.finish().freeze()
    }

    /// Offers an encoded message to the transport.
    pub fn offer(&mut self, seq_num: u64, msg_type: MsgType, bytes: &Bytes) -> SendOutcome {
        self.publication.offer(&OutboundMessage {
            session_id: self.session_id,
            seq_num,
            msg_type,
            bytes,
        })
    }

    /// Asks the framer to tear the connection down.
    pub fn disconnect(&mut self, reason: DisconnectReason) {
        self.publication.request_disconnect(self.session_id, reason);
    }

    /// Returns the session id this proxy writes for.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    fn header(&self, msg_type: MsgType, seq_num: u64) -> Encoder {
        self.header_with_poss_dup(msg_type, seq_num, false)
    }

    fn header_with_poss_dup(&self, msg_type: MsgType, seq_num: u64, poss_dup: bool) -> Encoder {
        let mut encoder = Encoder::new(self.begin_string);
        encoder.put_char(tags::MSG_TYPE, msg_type.wire_byte());
        encoder.put_str(tags::SENDER_COMP_ID, self.sender_comp_id.as_str());
        encoder.put_str(tags::TARGET_COMP_ID, self.target_comp_id.as_str());
        encoder.put_uint(tags::MSG_SEQ_NUM, seq_num);
        if poss_dup {
            encoder.put_bool(tags::POSS_DUP_FLAG, true);
        }
        encoder.put_timestamp(
            tags::SENDING_TIME,
            UtcTimestamp::from_epoch_nanos(self.clock.epoch_nanos()),
            self.precision,
        );
        encoder
    }
}
