/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Engine builder for fluent configuration.

use crate::error::LoggingErrorHandler;
use crate::worker::IdleStrategy;
use fixgate_core::clock::{Clock, SystemClock};
use fixgate_core::error::ErrorHandler;
use fixgate_replay::replayer::DEFAULT_GAPFILL_ON_REPLAY;
use fixgate_session::config::SessionConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Fluent configuration for a gateway engine.
pub struct EngineBuilder {
    /// Directory holding the index file.
    pub(crate) data_dir: PathBuf,
    /// Maximum sessions the index file can hold.
    pub(crate) index_capacity: usize,
    /// Max staleness of the index file.
    pub(crate) index_flush_timeout: Duration,
    /// Worker behavior on empty duty cycles.
    pub(crate) idle_strategy: IdleStrategy,
    /// Maximum framed message size.
    pub(crate) max_message_size: usize,
    /// Bound on concurrently replaying sessions.
    pub(crate) max_concurrent_session_replays: usize,
    /// Wire bytes of message types gap-filled on replay.
    pub(crate) gapfill_on_replay_message_types: Vec<u8>,
    /// Configured sessions, in registration order.
    pub(crate) sessions: Vec<SessionConfig>,
    /// Time source.
    pub(crate) clock: Arc<dyn Clock>,
    /// Runtime error sink.
    pub(crate) error_handler: Arc<dyn ErrorHandler>,
}

impl EngineBuilder {
    /// Creates a builder with defaults, rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            index_capacity: 1024,
            index_flush_timeout: Duration::from_millis(500),
            idle_strategy: IdleStrategy::default(),
            max_message_size: 1024 * 1024,
            max_concurrent_session_replays: 2,
            gapfill_on_replay_message_types: DEFAULT_GAPFILL_ON_REPLAY.to_vec(),
            sessions: Vec::new(),
            clock: Arc::new(SystemClock::new()),
            error_handler: Arc::new(LoggingErrorHandler),
        }
    }

    /// Adds a session configuration. Session ids are assigned in
    /// registration order, starting at 1, and stay stable across restarts.
    #[must_use]
    pub fn add_session(mut self, config: SessionConfig) -> Self {
        self.sessions.push(config);
        self
    }

    /// Sets the index file's session capacity.
    #[must_use]
    pub const fn with_index_capacity(mut self, capacity: usize) -> Self {
        self.index_capacity = capacity;
        self
    }

    /// Sets the index flush timeout.
    #[must_use]
    pub const fn with_index_flush_timeout(mut self, timeout: Duration) -> Self {
        self.index_flush_timeout = timeout;
        self
    }

    /// Sets the idle strategy for worker threads.
    #[must_use]
    pub const fn with_idle_strategy(mut self, idle: IdleStrategy) -> Self {
        self.idle_strategy = idle;
        self
    }

    /// Sets the maximum framed message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets the bound on concurrently replaying sessions.
    #[must_use]
    pub const fn with_max_concurrent_session_replays(mut self, max: usize) -> Self {
        self.max_concurrent_session_replays = max;
        self
    }

    /// Sets the message types gap-filled on replay.
    #[must_use]
    pub fn with_gapfill_on_replay_message_types(mut self, types: Vec<u8>) -> Self {
        self.gapfill_on_replay_message_types = types;
        self
    }

    /// Substitutes the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Substitutes the error handler.
    #[must_use]
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Wires up the engine.
    ///
    /// # Errors
    /// Returns a fatal error when the index file cannot be opened or
    /// recovered; startup stops there.
    pub fn build(self) -> fixgate_core::error::Result<crate::context::EngineContext> {
        crate::context::EngineContext::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_core::types::CompId;

    #[test]
    fn test_builder_defaults() {
        let builder = EngineBuilder::new("/tmp/fixgate");
        assert_eq!(builder.index_capacity, 1024);
        assert_eq!(builder.index_flush_timeout, Duration::from_millis(500));
        assert_eq!(builder.max_concurrent_session_replays, 2);
        assert!(builder.sessions.is_empty());
    }

    #[test]
    fn test_builder_accumulates_sessions() {
        let builder = EngineBuilder::new("/tmp/fixgate")
            .add_session(SessionConfig::new(
                CompId::new("GW").unwrap(),
                CompId::new("A").unwrap(),
            ))
            .add_session(SessionConfig::new(
                CompId::new("GW").unwrap(),
                CompId::new("B").unwrap(),
            ))
            .with_index_capacity(64)
            .with_max_concurrent_session_replays(8);

        assert_eq!(builder.sessions.len(), 2);
        assert_eq!(builder.index_capacity, 64);
        assert_eq!(builder.max_concurrent_session_replays, 8);
    }
}
