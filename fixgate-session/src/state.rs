/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session states.
//!
//! The state set is closed, so it is a plain tagged enum inspected at
//! runtime; every transition is made (and logged) by the session itself as
//! protocol events arrive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle state of a FIX session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// TCP connect in progress.
    Connecting,
    /// Transport established, no Logon exchanged yet.
    Connected,
    /// We sent a Logon and await the acknowledgement.
    SentLogon,
    /// Logon exchange complete; normal traffic.
    Active,
    /// A sequence gap was detected; a ResendRequest is outstanding.
    AwaitingResend,
    /// We sent a Logout and await the reply.
    SentLogout,
    /// Terminal. The in-memory session is dead; durable counters survive.
    Disconnected,
}

impl SessionState {
    /// Returns true once the session can carry application traffic.
    #[must_use]
    pub const fn is_established(self) -> bool {
        matches!(self, Self::Active | Self::AwaitingResend | Self::SentLogout)
    }

    /// Returns true for the terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::SentLogon => "SENT_LOGON",
            Self::Active => "ACTIVE",
            Self::AwaitingResend => "AWAITING_RESEND",
            Self::SentLogout => "SENT_LOGOUT",
            Self::Disconnected => "DISCONNECTED",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_established_states() {
        assert!(SessionState::Active.is_established());
        assert!(SessionState::AwaitingResend.is_established());
        assert!(SessionState::SentLogout.is_established());
        assert!(!SessionState::Connected.is_established());
        assert!(!SessionState::SentLogon.is_established());
        assert!(!SessionState::Disconnected.is_established());
    }

    #[test]
    fn test_terminal_state() {
        assert!(SessionState::Disconnected.is_terminal());
        assert!(!SessionState::Active.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::AwaitingResend.to_string(), "AWAITING_RESEND");
        assert_eq!(SessionState::SentLogout.to_string(), "SENT_LOGOUT");
    }
}
