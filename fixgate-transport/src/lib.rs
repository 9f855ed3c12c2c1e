/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixGate Transport
//!
//! Transport plumbing for the FixGate session core:
//! - **Framing codec**: splits a byte stream into complete FIX messages
//! - **Archive stream**: append-only ordered log with position cursors,
//!   doubling as the internal transport between workers

pub mod codec;
pub mod stream;

pub use codec::FixCodec;
pub use stream::{
    ArchivedMessage, PollAction, PublishOutcome, StreamBuffer, StreamCursor,
};
