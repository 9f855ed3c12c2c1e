/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The framer worker.
//!
//! Owns every session. One duty cycle applies pending commands (disconnects
//! and replay completions reported by the replayer), frames and dispatches
//! the inbound byte stream, and drives each session's timers. All session
//! mutation happens on this worker's thread; the replayer is reached only
//! through its command queue.

use crate::command::{FramerCommand, ReplayCommand};
use crate::publication::StreamPublication;
use crate::worker::Worker;
use bytes::{Bytes, BytesMut};
use crossbeam_channel::{Receiver, Sender};
use fixgate_core::clock::Clock;
use fixgate_core::error::{ErrorHandler, GatewayError};
use fixgate_core::tags;
use fixgate_core::types::{Direction, MsgType, SessionId};
use fixgate_replay::replayer::ReplaySessionInfo;
use fixgate_session::config::SessionConfig;
use fixgate_session::session::{InboundHeader, MessageAction, Session};
use fixgate_session::state::SessionState;
use fixgate_tagvalue::decoder::{Decoder, ParsedMessage};
use fixgate_transport::codec::FixCodec;
use fixgate_transport::stream::{ArchivedMessage, PublishOutcome, StreamBuffer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::codec::Decoder as FrameDecoder;
use tracing::{debug, info, warn};

/// Max inbound messages handled per session per duty cycle.
const FRAMES_PER_CYCLE: usize = 16;

/// One connection's framer-side state.
struct SessionHandle {
    session: Session<StreamPublication>,
    publication: StreamPublication,
    info: ReplaySessionInfo,
    rx_buffer: BytesMut,
}

/// The framer worker: inbound framing, dispatch, and session timers.
pub struct Framer {
    codec: FixCodec,
    clock: Arc<dyn Clock>,
    error_handler: Arc<dyn ErrorHandler>,
    archive: Arc<StreamBuffer>,
    inbound: Receiver<(SessionId, Bytes)>,
    commands: Receiver<FramerCommand>,
    replay_commands: Sender<ReplayCommand>,
    sessions: HashMap<u64, SessionHandle>,
}

impl Framer {
    /// Creates a framer with no sessions yet.
    #[must_use]
    pub fn new(
        codec: FixCodec,
        clock: Arc<dyn Clock>,
        error_handler: Arc<dyn ErrorHandler>,
        archive: Arc<StreamBuffer>,
        inbound: Receiver<(SessionId, Bytes)>,
        commands: Receiver<FramerCommand>,
        replay_commands: Sender<ReplayCommand>,
    ) -> Self {
        Self {
            codec,
            clock,
            error_handler,
            archive,
            inbound,
            commands,
            replay_commands,
            sessions: HashMap::new(),
        }
    }

    /// Registers a session for an accepted connection, seeding counters
    /// recovered from the durable index when present.
    pub fn add_session(
        &mut self,
        id: SessionId,
        config: &SessionConfig,
        publication: StreamPublication,
        restored: Option<(u64, u64)>,
    ) {
        let mut session = Session::new(
            id,
            config,
            SessionState::Connected,
            Arc::clone(&self.clock),
            publication.clone(),
        );
        if let Some((last_sent, last_recv)) = restored {
            info!(session_id = %id, last_sent, last_recv, "restored sequence numbers");
            session.restore_sequence_numbers(last_sent, last_recv);
        }

        self.sessions.insert(
            id.value(),
            SessionHandle {
                session,
                publication,
                info: ReplaySessionInfo {
                    sender_comp_id: config.sender_comp_id.clone(),
                    target_comp_id: config.target_comp_id.clone(),
                    begin_string: config.begin_string,
                    precision: config.sending_time_precision,
                },
                rx_buffer: BytesMut::new(),
            },
        );
    }

    /// Runs `f` against a session, e.g. to send application messages.
    pub fn with_session<R>(
        &mut self,
        id: SessionId,
        f: impl FnOnce(&mut Session<StreamPublication>) -> R,
    ) -> Option<R> {
        self.sessions.get_mut(&id.value()).map(|h| f(&mut h.session))
    }

    fn drain_commands(&mut self) -> usize {
        let mut work = 0;
        while let Ok(command) = self.commands.try_recv() {
            match command {
                FramerCommand::Disconnect { session_id, reason } => {
                    info!(%session_id, %reason, "tearing down connection");
                    if let Some(handle) = self.sessions.get_mut(&session_id.value()) {
                        handle.publication.mark_disconnected();
                        handle.session.on_disconnect();
                        handle.rx_buffer.clear();
                    }
                    let _ = self
                        .replay_commands
                        .send(ReplayCommand::AbortSession { session_id });
                    work += 1;
                }
                FramerCommand::ReplayComplete { session_id } => {
                    // The counterparty has the full range; normal traffic
                    // resumes from here.
                    info!(%session_id, "resend request fully serviced");
                    work += 1;
                }
            }
        }
        work
    }

    fn drain_inbound(&mut self) -> usize {
        let mut work = 0;
        while let Ok((session_id, bytes)) = self.inbound.try_recv() {
            let Some(handle) = self.sessions.get_mut(&session_id.value()) else {
                warn!(%session_id, "bytes for unknown session");
                continue;
            };
            handle.rx_buffer.extend_from_slice(&bytes);
            work += 1;
        }

        for handle in self.sessions.values_mut() {
            for _ in 0..FRAMES_PER_CYCLE {
                match self.codec.decode(&mut handle.rx_buffer) {
                    Ok(Some(frame)) => {
                        work += 1;
                        Self::on_frame(
                            handle,
                            &frame,
                            &self.archive,
                            self.error_handler.as_ref(),
                            &self.replay_commands,
                        );
                    }
                    Ok(None) => break,
                    Err(err) => {
                        // The byte stream is unframeable; nothing downstream
                        // of this point can be trusted.
                        self.error_handler.on_error(&err);
                        handle.rx_buffer.clear();
                        handle.session.start_logout();
                        work += 1;
                        break;
                    }
                }
            }
        }
        work
    }

    /// Parses and dispatches one framed message.
    fn on_frame(
        handle: &mut SessionHandle,
        frame: &[u8],
        archive: &StreamBuffer,
        error_handler: &dyn ErrorHandler,
        replay_commands: &Sender<ReplayCommand>,
    ) {
        // The codec already validated the checksum.
        let parsed = match Decoder::new(frame).with_checksum_validation(false).decode() {
            Ok(parsed) => parsed,
            Err(err) => {
                error_handler.on_error(&err.into());
                handle.session.start_logout();
                return;
            }
        };

        let msg_seq_num = match parsed.msg_seq_num() {
            Ok(seq) => seq,
            Err(err) => {
                error_handler.on_error(&err.into());
                handle.session.start_logout();
                return;
            }
        };
        let poss_dup = parsed.poss_dup();

        // Everything that arrives is archived, in arrival order.
        let outcome = archive.publish(ArchivedMessage {
            session_id: handle.session.id(),
            seq_num: msg_seq_num,
            msg_type: parsed.msg_type(),
            direction: Direction::Inbound,
            bytes: Bytes::copy_from_slice(frame),
        });
        if outcome == PublishOutcome::BackPressure {
            error_handler.on_error(&GatewayError::Io(std::io::Error::other(
                "archive stream back-pressured an inbound message",
            )));
        }

        let header = InboundHeader {
            msg_seq_num,
            sender_comp_id: field_str(&parsed, tags::SENDER_COMP_ID),
            target_comp_id: field_str(&parsed, tags::TARGET_COMP_ID),
            sending_time: parsed
                .find(tags::SENDING_TIME)
                .map_or(&b""[..], |f| f.value),
        };
        if !handle.session.validate_header(&header) {
            return;
        }

        match parsed.msg_type() {
            MsgType::Logon => {
                let heartbeat_secs = parsed
                    .find(tags::HEART_BT_INT)
                    .and_then(|f| f.as_u64().ok())
                    .unwrap_or(0);
                let reset = parsed
                    .find(tags::RESET_SEQ_NUM_FLAG)
                    .and_then(|f| f.as_bool().ok())
                    .unwrap_or(false);
                handle.session.on_logon(msg_seq_num, heartbeat_secs, reset);
            }
            MsgType::Logout => handle.session.on_logout(msg_seq_num),
            MsgType::Heartbeat => handle.session.on_heartbeat(msg_seq_num, poss_dup),
            MsgType::TestRequest => {
                let id = field_str(&parsed, tags::TEST_REQ_ID);
                handle.session.on_test_request(msg_seq_num, id, poss_dup);
            }
            MsgType::ResendRequest => {
                let begin = parsed
                    .find(tags::BEGIN_SEQ_NO)
                    .and_then(|f| f.as_u64().ok())
                    .unwrap_or(0);
                let end = parsed
                    .find(tags::END_SEQ_NO)
                    .and_then(|f| f.as_u64().ok())
                    .unwrap_or(0);
                if let Some(range) =
                    handle
                        .session
                        .on_resend_request(msg_seq_num, begin, end, poss_dup)
                {
                    let _ = replay_commands.send(ReplayCommand::StartReplay {
                        range,
                        info: handle.info.clone(),
                        publication: handle.publication.clone(),
                    });
                }
            }
            MsgType::SequenceReset => {
                let new_seq_no = parsed
                    .find(tags::NEW_SEQ_NO)
                    .and_then(|f| f.as_u64().ok())
                    .unwrap_or(0);
                let gap_fill = parsed
                    .find(tags::GAP_FILL_FLAG)
                    .and_then(|f| f.as_bool().ok())
                    .unwrap_or(false);
                handle
                    .session
                    .on_sequence_reset(msg_seq_num, new_seq_no, gap_fill, poss_dup);
            }
            MsgType::Reject => {
                warn!(
                    session_id = %handle.session.id(),
                    seq_num = msg_seq_num,
                    "counterparty rejected a message"
                );
                handle.session.on_message(msg_seq_num, poss_dup);
            }
            MsgType::Application(_) => {
                if handle.session.on_message(msg_seq_num, poss_dup) == MessageAction::Process {
                    // Application delivery happens downstream of the archive.
                    debug!(
                        session_id = %handle.session.id(),
                        seq_num = msg_seq_num,
                        msg_type = %parsed.msg_type(),
                        "application message accepted"
                    );
                }
            }
        }
    }

    fn poll_sessions(&mut self) -> usize {
        let now_ns = self.clock.monotonic_nanos();
        self.sessions
            .values_mut()
            .map(|handle| handle.session.poll(now_ns))
            .sum()
    }
}

fn field_str<'a>(parsed: &ParsedMessage<'a>, tag: u32) -> &'a str {
    parsed.find(tag).and_then(|f| f.as_str().ok()).unwrap_or("")
}

impl Worker for Framer {
    fn do_work(&mut self) -> usize {
        self.drain_commands() + self.drain_inbound() + self.poll_sessions()
    }

    fn name(&self) -> &'static str {
        "framer"
    }
}
