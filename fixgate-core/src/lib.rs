/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixGate Core
//!
//! Core types, traits, and error definitions for the FixGate session core.
//!
//! This crate provides the fundamental building blocks used across all
//! FixGate crates:
//! - **Error types**: Unified error handling with `thiserror`, plus the
//!   non-throwing `ErrorHandler` callback
//! - **Field types**: `FieldRef` and the session-level tag numbers
//! - **Core types**: `SeqNum`, `SessionId`, `CompId`, `MsgType`
//! - **Clock**: wall-clock and monotonic nanosecond time sources

pub mod clock;
pub mod error;
pub mod field;
pub mod types;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{
    DecodeError, EncodeError, ErrorHandler, GatewayError, IndexError, ReplayError, Result,
    SessionError, SessionRejectReason,
};
pub use field::{FieldRef, tags};
pub use types::{CompId, Direction, DisconnectReason, MsgType, ResendRange, SeqNum, SessionId};
