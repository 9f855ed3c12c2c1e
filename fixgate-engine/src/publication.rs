/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The transport handle sessions write through.
//!
//! [`StreamPublication`] publishes outbound messages onto the archive stream
//! and routes disconnect requests back to the framer's command queue. It is
//! a weak handle: the session holds it without owning the stream, and a
//! disconnect flips a shared flag so in-flight replays for the connection
//! fail fast with `Disconnected`.

use crate::command::FramerCommand;
use bytes::Bytes;
use crossbeam_channel::Sender;
use fixgate_core::types::{Direction, DisconnectReason, SessionId};
use fixgate_session::proxy::{OutboundMessage, Publication, SendOutcome};
use fixgate_transport::stream::{ArchivedMessage, PublishOutcome, StreamBuffer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Publication onto the outbound side of the archive stream.
#[derive(Debug, Clone)]
pub struct StreamPublication {
    stream: Arc<StreamBuffer>,
    connected: Arc<AtomicBool>,
    framer: Sender<FramerCommand>,
}

impl StreamPublication {
    /// Creates a publication for one connection.
    #[must_use]
    pub fn new(stream: Arc<StreamBuffer>, framer: Sender<FramerCommand>) -> Self {
        Self {
            stream,
            connected: Arc::new(AtomicBool::new(true)),
            framer,
        }
    }

    /// Returns whether the connection is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Marks the connection dead, failing subsequent offers.
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

impl Publication for StreamPublication {
    fn offer(&mut self, message: &OutboundMessage<'_>) -> SendOutcome {
        if !self.is_connected() {
            return SendOutcome::Disconnected;
        }

        match self.stream.publish(ArchivedMessage {
            session_id: message.session_id,
            seq_num: message.seq_num,
            msg_type: message.msg_type,
            direction: Direction::Outbound,
            bytes: Bytes::copy_from_slice(message.bytes),
        }) {
            PublishOutcome::Published(position) => SendOutcome::Ok(position),
            PublishOutcome::BackPressure => SendOutcome::BackPressure,
        }
    }

    fn request_disconnect(&mut self, session_id: SessionId, reason: DisconnectReason) {
        self.mark_disconnected();
        let _ = self.framer.send(FramerCommand::Disconnect { session_id, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_core::types::MsgType;

    fn publication() -> (
        StreamPublication,
        Arc<StreamBuffer>,
        crossbeam_channel::Receiver<FramerCommand>,
    ) {
        let stream = Arc::new(StreamBuffer::new());
        let (tx, rx) = crossbeam_channel::bounded(8);
        (
            StreamPublication::new(Arc::clone(&stream), tx),
            stream,
            rx,
        )
    }

    fn message(bytes: &[u8]) -> OutboundMessage<'_> {
        OutboundMessage {
            session_id: SessionId::new(1),
            seq_num: 1,
            msg_type: MsgType::Heartbeat,
            bytes,
        }
    }

    #[test]
    fn test_offer_publishes_outbound() {
        let (mut publication, stream, _rx) = publication();

        let outcome = publication.offer(&message(b"8=FIX.4.4\x01"));
        assert!(matches!(outcome, SendOutcome::Ok(_)));
        assert_eq!(stream.record_count(), 1);
    }

    #[test]
    fn test_disconnect_flips_flag_and_notifies_framer() {
        let (mut publication, _stream, rx) = publication();

        publication.request_disconnect(SessionId::new(1), DisconnectReason::HeartbeatTimeout);

        assert!(!publication.is_connected());
        assert!(matches!(
            rx.try_recv(),
            Ok(FramerCommand::Disconnect {
                reason: DisconnectReason::HeartbeatTimeout,
                ..
            })
        ));
        assert_eq!(
            publication.offer(&message(b"x")),
            SendOutcome::Disconnected
        );
    }

    #[test]
    fn test_clone_shares_connected_flag() {
        let (publication, _stream, _rx) = publication();
        let mut clone = publication.clone();

        publication.mark_disconnected();
        assert_eq!(clone.offer(&message(b"x")), SendOutcome::Disconnected);
    }
}
