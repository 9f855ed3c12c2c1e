/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixGate Replay
//!
//! Replay of archived messages in answer to resend requests.
//!
//! This crate provides:
//! - **Replay index**: in-memory `(session, seq num) -> archive position`
//! - **Replay query**: ordered reads of a session's sent history
//! - **Replayer**: gap-filling re-emission with PossDup semantics, resumable
//!   across back-pressure, bounded in concurrency

pub mod index;
pub mod query;
pub mod replayer;

pub use index::ReplayIndex;
pub use query::{ReplayCursor, ReplayQuery};
pub use replayer::{
    DEFAULT_GAPFILL_ON_REPLAY, ReplayChannel, ReplaySessionInfo, Replayer, StepOutcome,
};
