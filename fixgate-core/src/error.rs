/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Error types for the FixGate session core.
//!
//! This module provides a unified error hierarchy using `thiserror` for typed,
//! domain-specific errors across the gateway, plus the non-throwing
//! [`ErrorHandler`] callback through which workers surface runtime errors
//! without unwinding across worker boundaries.

use crate::types::{DisconnectReason, SessionId};
use thiserror::Error;

/// Result type alias using [`GatewayError`] as the error type.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Top-level error type for all gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Error during message decoding.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error during message encoding.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in the sequence-number index.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Error while replaying archived messages.
    #[error("replay error: {0}")]
    Replay(#[from] ReplayError),

    /// I/O error from the underlying filesystem or transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur during FIX message decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Message buffer is incomplete, need more data.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// Invalid BeginString field (tag 8).
    #[error("invalid begin string: expected 8=FIX.x.y")]
    InvalidBeginString,

    /// Missing BodyLength field (tag 9).
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// Invalid BodyLength value.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// Missing MsgType field (tag 35).
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// Checksum mismatch between calculated and declared values.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum value.
        calculated: u8,
        /// Declared checksum value in message.
        declared: u8,
    },

    /// Missing required field.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for the expected type.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// Invalid UTF-8 in string field.
    #[error("invalid utf-8 in field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max_size: usize,
    },
}

/// Errors that occur during FIX message encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Missing required field during encoding.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Field value exceeds maximum length.
    #[error("field value too long for tag {tag}: {length} exceeds max {max_length}")]
    FieldTooLong {
        /// The tag number of the field.
        tag: u32,
        /// Actual length of the value.
        length: usize,
        /// Maximum allowed length.
        max_length: usize,
    },
}

/// Errors in FIX session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session is not in the correct state for the operation.
    #[error("invalid session state for {operation}: current {current}")]
    InvalidState {
        /// The attempted operation.
        operation: &'static str,
        /// Current session state.
        current: String,
    },

    /// Sequence number gap detected.
    #[error("sequence gap detected: expected {expected}, received {received}")]
    SequenceGap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// Sequence number too low without PossDupFlag.
    #[error("sequence too low: expected >= {expected}, received {received}")]
    SequenceTooLow {
        /// Minimum expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// The session was disconnected.
    #[error("session {session_id} disconnected: {reason}")]
    Disconnected {
        /// The session that was torn down.
        session_id: SessionId,
        /// Why it was torn down.
        reason: DisconnectReason,
    },

    /// Session configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Errors in the durable sequence-number index.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// Both A/B copies of the index file failed checksum validation.
    #[error("index file corrupted: {reason}")]
    Corrupted {
        /// Description of the corruption.
        reason: String,
    },

    /// The index file is full.
    #[error("index capacity exhausted: {capacity} sessions")]
    CapacityExhausted {
        /// Configured session capacity.
        capacity: usize,
    },

    /// Archive positions must be strictly monotonic.
    #[error("archive position regression: last {last}, offered {offered}")]
    PositionRegression {
        /// Last applied archive position.
        last: i64,
        /// The out-of-order position that was offered.
        offered: i64,
    },

    /// I/O error in the index file.
    #[error("index i/o error: {0}")]
    Io(String),
}

/// Errors while replaying archived messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// The requested resend range is invalid.
    #[error("invalid resend range: {begin}..{end}")]
    InvalidRange {
        /// Begin sequence number of requested range.
        begin: u64,
        /// End sequence number of requested range.
        end: u64,
    },

    /// No archived messages for the requested range.
    #[error("messages not archived for session {session_id}, range {begin}..{end}")]
    NotArchived {
        /// The session whose history was requested.
        session_id: SessionId,
        /// Begin sequence number.
        begin: u64,
        /// End sequence number.
        end: u64,
    },

    /// A replayed message could not be re-encoded.
    #[error("replay re-encode failed for seq {seq_num}: {reason}")]
    ReEncodeFailed {
        /// Sequence number of the archived message.
        seq_num: u64,
        /// Description of the failure.
        reason: String,
    },
}

/// FIX SessionRejectReason (tag 373) values used by the session core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRejectReason {
    /// Value is incorrect (out of range) for this tag (5).
    ValueIsIncorrect,
    /// CompID problem (9).
    CompIdProblem,
    /// SendingTime accuracy problem (10).
    SendingTimeAccuracyProblem,
    /// Other (99).
    Other,
}

impl SessionRejectReason {
    /// Returns the tag-373 wire code.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::ValueIsIncorrect => 5,
            Self::CompIdProblem => 9,
            Self::SendingTimeAccuracyProblem => 10,
            Self::Other => 99,
        }
    }
}

/// Non-throwing callback through which runtime errors are surfaced.
///
/// Workers report errors and keep running; the offending session is
/// disconnected rather than the fault propagating across workers. Fatal
/// startup errors are returned as `Result`s instead and terminate startup.
pub trait ErrorHandler: Send + Sync {
    /// Reports a runtime error.
    fn on_error(&self, error: &GatewayError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&GatewayError) + Send + Sync,
{
    fn on_error(&self, error: &GatewayError) {
        self(error);
    }
}
