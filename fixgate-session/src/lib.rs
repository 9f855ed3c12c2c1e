/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # FixGate Session
//!
//! The FIX session layer of the FixGate gateway core.
//!
//! This crate provides:
//! - **State machine**: the per-connection session FSM enforcing logon,
//!   sequencing, gap detection, heartbeating, and logout semantics
//! - **Proxy**: outbound encoding of session-level messages with full
//!   standard headers
//! - **Configuration**: per-session options

pub mod config;
pub mod proxy;
pub mod session;
pub mod state;

pub use config::SessionConfig;
pub use proxy::{OutboundMessage, Publication, SendOutcome, SessionProxy};
pub use session::{InboundHeader, MessageAction, Session};
pub use state::SessionState;
