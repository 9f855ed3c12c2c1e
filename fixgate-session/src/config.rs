/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session configuration.

use fixgate_core::types::CompId;
use fixgate_tagvalue::timestamp::TimestampPrecision;
use std::time::Duration;

/// Configuration for a FIX session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Our CompID, stamped into tag 49 of outbound messages.
    pub sender_comp_id: CompId,
    /// The counterparty's CompID, stamped into tag 56 of outbound messages.
    pub target_comp_id: CompId,
    /// FIX version BeginString (e.g., "FIX.4.4").
    pub begin_string: &'static str,
    /// Heartbeat interval. Twice this with no inbound traffic disconnects.
    pub heartbeat_interval: Duration,
    /// Whether to honor/emit ResetSeqNumFlag on logon.
    pub reset_seq_num_on_logon: bool,
    /// Whether sequence counters survive restarts via the durable index.
    pub sequence_numbers_persistent: bool,
    /// Fraction width of outbound SendingTime stamps.
    pub sending_time_precision: TimestampPrecision,
    /// How long to wait for a Logout reply before disconnecting.
    pub logout_timeout: Duration,
}

impl SessionConfig {
    /// Creates a new session configuration with required fields.
    ///
    /// # Arguments
    /// * `sender_comp_id` - Our CompID
    /// * `target_comp_id` - The counterparty's CompID
    #[must_use]
    pub fn new(sender_comp_id: CompId, target_comp_id: CompId) -> Self {
        Self {
            sender_comp_id,
            target_comp_id,
            begin_string: "FIX.4.4",
            heartbeat_interval: Duration::from_secs(30),
            reset_seq_num_on_logon: false,
            sequence_numbers_persistent: true,
            sending_time_precision: TimestampPrecision::default(),
            logout_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the BeginString.
    #[must_use]
    pub const fn with_begin_string(mut self, begin_string: &'static str) -> Self {
        self.begin_string = begin_string;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets whether sequence numbers reset on logon.
    #[must_use]
    pub const fn with_reset_seq_num_on_logon(mut self, reset: bool) -> Self {
        self.reset_seq_num_on_logon = reset;
        self
    }

    /// Sets whether sequence numbers persist across restarts.
    #[must_use]
    pub const fn with_sequence_numbers_persistent(mut self, persistent: bool) -> Self {
        self.sequence_numbers_persistent = persistent;
        self
    }

    /// Sets the SendingTime fraction width.
    #[must_use]
    pub const fn with_sending_time_precision(mut self, precision: TimestampPrecision) -> Self {
        self.sending_time_precision = precision;
        self
    }

    /// Sets the Logout reply timeout.
    #[must_use]
    pub const fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    /// Returns the heartbeat interval in whole seconds.
    #[must_use]
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs()
    }
}
