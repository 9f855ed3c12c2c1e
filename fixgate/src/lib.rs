/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixGate
//!
//! The session core of a FIX gateway: the state machine, proxy, durable
//! sequence-number index, and replay subsystem that terminate FIX sessions
//! and keep their sequence numbers continuous across restarts.
//!
//! ## Architecture
//!
//! Inbound bytes are framed and dispatched by the **framer**, which owns
//! every [`session`] state machine. Each message in either direction lands
//! on an append-only **archive stream**; the **indexer** tails it to keep
//! the durable per-session counters current, and the **replayer** walks it
//! to answer `ResendRequest`s with PossDup re-emissions and gap fills. The
//! three workers are cooperatively scheduled threads that interact only
//! through command queues and the stream.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixgate::core::CompId;
//! use fixgate::engine::EngineBuilder;
//! use fixgate::session::SessionConfig;
//!
//! let engine = EngineBuilder::new("/var/lib/fixgate")
//!     .add_session(SessionConfig::new(
//!         CompId::new("GATEWAY").unwrap(),
//!         CompId::new("BANK").unwrap(),
//!     ))
//!     .build()?
//!     .launch();
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: ids, sequence numbers, errors, clocks
//! - [`tagvalue`]: tag=value encoding, decoding, checksums, timestamps
//! - [`transport`]: framing codec and the archive stream
//! - [`session`]: the session state machine and proxy
//! - [`index`]: the durable sequence-number index
//! - [`replay`]: resend servicing
//! - [`engine`]: workers, wiring, and the builder

pub mod core {
    //! Core types, clocks, and error definitions.
    pub use fixgate_core::*;
}

pub mod tagvalue {
    //! Tag=value encoding and decoding.
    pub use fixgate_tagvalue::*;
}

pub mod transport {
    //! Framing codec and archive stream.
    pub use fixgate_transport::*;
}

pub mod session {
    //! Session state machine, proxy, and configuration.
    pub use fixgate_session::*;
}

pub mod index {
    //! Durable sequence-number index.
    pub use fixgate_index::*;
}

pub mod replay {
    //! Resend request servicing.
    pub use fixgate_replay::*;
}

pub mod engine {
    //! Workers and engine wiring.
    pub use fixgate_engine::*;
}

/// Commonly used types.
pub mod prelude {
    pub use fixgate_core::clock::{Clock, SystemClock};
    pub use fixgate_core::error::{ErrorHandler, GatewayError, Result};
    pub use fixgate_core::types::{CompId, MsgType, SeqNum, SessionId};
    pub use fixgate_engine::builder::EngineBuilder;
    pub use fixgate_engine::context::{Engine, EngineContext};
    pub use fixgate_engine::worker::IdleStrategy;
    pub use fixgate_session::config::SessionConfig;
    pub use fixgate_session::session::Session;
    pub use fixgate_session::state::SessionState;
}
