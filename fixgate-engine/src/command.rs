/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Cross-worker commands.
//!
//! Workers share no mutable state; every interaction is a message over a
//! bounded channel or a record on the archive stream. These enums are the
//! complete command vocabulary.

use crate::publication::StreamPublication;
use fixgate_core::types::{DisconnectReason, ResendRange, SessionId};
use fixgate_replay::replayer::ReplaySessionInfo;

/// Commands from the framer to the replay worker.
#[derive(Debug)]
pub enum ReplayCommand {
    /// A validated resend request to service.
    StartReplay {
        /// The requested range.
        range: ResendRange,
        /// Encoding facts for the session.
        info: ReplaySessionInfo,
        /// Where to emit the replayed messages.
        publication: StreamPublication,
    },
    /// The session disconnected; drop its replay state.
    AbortSession {
        /// The session being torn down.
        session_id: SessionId,
    },
}

/// Commands delivered to the framer.
#[derive(Debug)]
pub enum FramerCommand {
    /// Tear down a connection.
    Disconnect {
        /// The session whose connection dies.
        session_id: SessionId,
        /// Why.
        reason: DisconnectReason,
    },
    /// A replay ran to completion; the resend request is fully serviced.
    ReplayComplete {
        /// The session whose history was replayed.
        session_id: SessionId,
    },
}
