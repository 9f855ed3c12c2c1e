/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Core types for the FixGate session core.
//!
//! This module provides the fundamental types shared across the gateway:
//! - [`SeqNum`]: FIX message sequence number
//! - [`SessionId`]: stable 64-bit session identity
//! - [`CompId`]: component identifier (SenderCompID, TargetCompID)
//! - [`MsgType`]: administrative message types plus an application escape hatch
//! - [`Direction`]: inbound/outbound marker for archived messages
//! - [`DisconnectReason`]: why a session was torn down

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length for CompID strings in bytes.
pub const COMP_ID_MAX_LEN: usize = 32;

/// FIX message sequence number.
///
/// Sequence numbers are unsigned 64-bit integers that identify messages
/// within a FIX session. They start at 1 and increment for each message sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct SeqNum(u64);

impl SeqNum {
    /// Creates a new sequence number.
    ///
    /// # Arguments
    /// * `value` - The sequence number value (should be >= 1 for valid FIX messages)
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw sequence number value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Checks if this sequence number is valid (>= 1).
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 1
    }
}

impl Default for SeqNum {
    fn default() -> Self {
        Self(1)
    }
}

impl From<u64> for SeqNum {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<SeqNum> for u64 {
    fn from(seq: SeqNum) -> Self {
        seq.0
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable 64-bit session identity.
///
/// Assigned once when a logical session (comp-id pair) is first seen and kept
/// across reconnects and process restarts. The durable sequence-number index
/// is keyed by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a new session id.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Component identifier for FIX sessions.
///
/// Used for SenderCompID (tag 49) and TargetCompID (tag 56). Maximum length
/// is 32 characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct CompId(ArrayString<COMP_ID_MAX_LEN>);

impl CompId {
    /// Creates a new CompId from a string slice.
    ///
    /// # Arguments
    /// * `s` - The component identifier string
    ///
    /// # Returns
    /// `Some(CompId)` if the string fits within the maximum length, `None` otherwise.
    #[must_use]
    pub fn new(s: &str) -> Option<Self> {
        ArrayString::from(s).ok().map(Self)
    }

    /// Returns the CompId as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the length of the CompId in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the CompId is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for CompId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CompId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CompId {
    type Err = arrayvec::CapacityError<()>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArrayString::try_from(s)
            .map(Self)
            .map_err(|_| arrayvec::CapacityError::new(()))
    }
}

/// FIX message types handled by the session core.
///
/// The administrative set is closed; everything else is carried as
/// `Application` with its wire byte. Multi-character application types are
/// outside the scope of the session layer and map to `Application` with
/// their first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MsgType {
    /// Heartbeat (0).
    #[default]
    Heartbeat,
    /// Test Request (1).
    TestRequest,
    /// Resend Request (2).
    ResendRequest,
    /// Reject (3).
    Reject,
    /// Sequence Reset (4).
    SequenceReset,
    /// Logout (5).
    Logout,
    /// Logon (A).
    Logon,
    /// Any application-level message, identified by its wire byte.
    Application(u8),
}

impl MsgType {
    /// Creates a MsgType from the first byte of the tag-35 value.
    #[must_use]
    pub const fn from_wire_byte(b: u8) -> Self {
        match b {
            b'0' => Self::Heartbeat,
            b'1' => Self::TestRequest,
            b'2' => Self::ResendRequest,
            b'3' => Self::Reject,
            b'4' => Self::SequenceReset,
            b'5' => Self::Logout,
            b'A' => Self::Logon,
            other => Self::Application(other),
        }
    }

    /// Returns the wire byte for this message type.
    #[must_use]
    pub const fn wire_byte(self) -> u8 {
        match self {
            Self::Heartbeat => b'0',
            Self::TestRequest => b'1',
            Self::ResendRequest => b'2',
            Self::Reject => b'3',
            Self::SequenceReset => b'4',
            Self::Logout => b'5',
            Self::Logon => b'A',
            Self::Application(b) => b,
        }
    }

    /// Returns true for session-level (administrative) message types.
    ///
    /// Session-level messages are gap-filled rather than retransmitted when a
    /// counterparty requests a resend.
    #[must_use]
    pub const fn is_session_level(self) -> bool {
        !matches!(self, Self::Application(_))
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_byte() as char)
    }
}

/// Direction of an archived message relative to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Received from the counterparty.
    Inbound,
    /// Sent to the counterparty.
    Outbound,
}

/// A counterparty's request to re-transmit a range of sent messages.
///
/// `end_seq_no == 0` means "through the most recent message".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResendRange {
    /// The session whose history was requested.
    pub session_id: SessionId,
    /// First sequence number to re-transmit.
    pub begin_seq_no: u64,
    /// Last sequence number to re-transmit, or 0 for "through most recent".
    pub end_seq_no: u64,
    /// The highest sequence number this side has sent, captured when the
    /// request was accepted.
    pub last_sent_seq_no: u64,
}

/// Why a session was disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// The counterparty closed the socket.
    RemoteDisconnect,
    /// The application asked for a logout/disconnect.
    ApplicationRequested,
    /// Inbound MsgSeqNum lower than expected without PossDupFlag.
    SeqNumTooLow,
    /// SenderCompID/TargetCompID did not match the session.
    CompIdMismatch,
    /// SendingTime failed to parse as a UTC timestamp.
    InvalidSendingTime,
    /// No traffic received within twice the heartbeat interval.
    HeartbeatTimeout,
    /// No Logout reply within the configured timeout.
    LogoutTimeout,
    /// A SequenceReset attempted to move the sequence backwards.
    InvalidGapFill,
    /// The engine is shutting down.
    EngineShutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RemoteDisconnect => "remote disconnect",
            Self::ApplicationRequested => "application requested",
            Self::SeqNumTooLow => "msg seq num too low",
            Self::CompIdMismatch => "comp id mismatch",
            Self::InvalidSendingTime => "invalid sending time",
            Self::HeartbeatTimeout => "heartbeat timeout",
            Self::LogoutTimeout => "logout timeout",
            Self::InvalidGapFill => "invalid gap fill",
            Self::EngineShutdown => "engine shutdown",
        };
        write!(f, "{s}")
    }
}
