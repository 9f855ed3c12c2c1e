/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Engine wiring.
//!
//! [`EngineContext`] is the explicit process-wide context: it owns the
//! archive stream, the three workers, and the channels between them. There
//! are no singletons; everything reaches its collaborators through what was
//! passed in here. `launch` moves the workers onto their threads; tests
//! drive the same workers single-threaded through [`EngineContext::do_work`].

use crate::builder::EngineBuilder;
use crate::framer::Framer;
use crate::indexer::Indexer;
use crate::publication::StreamPublication;
use crate::replay_worker::ReplayWorker;
use crate::worker::{IdleStrategy, Worker, WorkerRunner};
use bytes::Bytes;
use crossbeam_channel::Sender;
use fixgate_core::error::Result;
use fixgate_core::types::SessionId;
use fixgate_index::writer::SequenceNumberIndexWriter;
use fixgate_replay::query::ReplayQuery;
use fixgate_replay::replayer::Replayer;
use fixgate_session::config::SessionConfig;
use fixgate_transport::codec::FixCodec;
use fixgate_transport::stream::StreamBuffer;
use std::sync::Arc;
use tracing::info;

/// Index file name under the data directory.
const INDEX_FILE_NAME: &str = "sequence-numbers.idx";

/// A fully wired gateway engine, not yet running.
pub struct EngineContext {
    framer: Framer,
    indexer: Indexer,
    replay: ReplayWorker,
    archive: Arc<StreamBuffer>,
    inbound_tx: Sender<(SessionId, Bytes)>,
    idle_strategy: IdleStrategy,
    session_ids: Vec<(SessionId, SessionConfig)>,
}

impl EngineContext {
    /// Wires streams, index, and workers from the builder's configuration.
    ///
    /// When sessions are persistent, their counters are recovered from the
    /// index file here, before any traffic flows.
    ///
    /// # Errors
    /// Fatal startup errors (index file unusable) are returned; nothing is
    /// partially started.
    pub fn new(builder: EngineBuilder) -> Result<Self> {
        std::fs::create_dir_all(&builder.data_dir)?;
        let index_path = builder.data_dir.join(INDEX_FILE_NAME);
        let writer = SequenceNumberIndexWriter::open(
            &index_path,
            builder.index_capacity,
            builder.index_flush_timeout,
        )?;

        // Fresh positions must land past everything the index already knows.
        let archive = Arc::new(StreamBuffer::starting_at(writer.last_position() + 1));

        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let (framer_tx, framer_rx) = crossbeam_channel::unbounded();
        let (replay_tx, replay_rx) = crossbeam_channel::unbounded();

        let mut framer = Framer::new(
            FixCodec::new().with_max_message_size(builder.max_message_size),
            Arc::clone(&builder.clock),
            Arc::clone(&builder.error_handler),
            Arc::clone(&archive),
            inbound_rx,
            framer_rx,
            replay_tx,
        );

        let mut session_ids = Vec::with_capacity(builder.sessions.len());
        for (offset, config) in builder.sessions.iter().enumerate() {
            let id = SessionId::new(offset as u64 + 1);
            let restored = if config.sequence_numbers_persistent {
                writer.lookup(id).map(|record| {
                    (
                        record.last_sent_seq_num.max(0) as u64,
                        record.last_recv_seq_num.max(0) as u64,
                    )
                })
            } else {
                None
            };

            let publication = StreamPublication::new(Arc::clone(&archive), framer_tx.clone());
            framer.add_session(id, config, publication, restored);
            session_ids.push((id, config.clone()));
        }

        let indexer = Indexer::new(
            archive.subscribe(),
            writer,
            Arc::clone(&builder.clock),
            Arc::clone(&builder.error_handler),
        );

        let replayer = Replayer::new(
            ReplayQuery::new(Arc::clone(&archive)),
            Arc::clone(&builder.clock),
            builder.gapfill_on_replay_message_types.clone(),
            builder.max_concurrent_session_replays,
        );
        let replay = ReplayWorker::new(archive.subscribe(), replayer, replay_rx, framer_tx.clone());

        info!(
            sessions = session_ids.len(),
            index = %index_path.display(),
            "engine context ready"
        );

        Ok(Self {
            framer,
            indexer,
            replay,
            archive,
            inbound_tx,
            idle_strategy: builder.idle_strategy,
            session_ids,
        })
    }

    /// Returns the sender the socket layer feeds raw inbound bytes into.
    #[must_use]
    pub fn inbound_sender(&self) -> Sender<(SessionId, Bytes)> {
        self.inbound_tx.clone()
    }

    /// Returns the archive stream.
    #[must_use]
    pub fn archive(&self) -> Arc<StreamBuffer> {
        Arc::clone(&self.archive)
    }

    /// Returns the id assigned to the session with these comp ids.
    #[must_use]
    pub fn session_id(&self, sender_comp_id: &str, target_comp_id: &str) -> Option<SessionId> {
        self.session_ids
            .iter()
            .find(|(_, config)| {
                config.sender_comp_id.as_str() == sender_comp_id
                    && config.target_comp_id.as_str() == target_comp_id
            })
            .map(|(id, _)| *id)
    }

    /// Framer access for embedding and tests.
    pub fn framer_mut(&mut self) -> &mut Framer {
        &mut self.framer
    }

    /// Indexer access for embedding and tests.
    pub fn indexer_mut(&mut self) -> &mut Indexer {
        &mut self.indexer
    }

    /// Replay worker access for embedding and tests.
    pub fn replay_mut(&mut self) -> &mut ReplayWorker {
        &mut self.replay
    }

    /// Drives all three workers one duty cycle on the calling thread.
    pub fn do_work(&mut self) -> usize {
        self.framer.do_work() + self.indexer.do_work() + self.replay.do_work()
    }

    /// Moves each worker onto its own thread.
    #[must_use]
    pub fn launch(self) -> Engine {
        let idle = self.idle_strategy;
        Engine {
            runners: vec![
                WorkerRunner::start(self.framer, idle),
                WorkerRunner::start(self.indexer, idle),
                WorkerRunner::start(self.replay, idle),
            ],
        }
    }
}

/// A running engine: one thread per worker.
pub struct Engine {
    runners: Vec<WorkerRunner>,
}

impl Engine {
    /// Stops all workers and joins their threads. The indexer flushes on
    /// close, so durable counters survive an orderly shutdown.
    pub fn close(self) {
        for runner in self.runners {
            runner.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_core::clock::FakeClock;
    use fixgate_core::tags;
    use fixgate_core::types::{CompId, Direction, MsgType};
    use fixgate_session::state::SessionState;
    use fixgate_tagvalue::encoder::Encoder;
    use fixgate_transport::stream::PollAction;
    use std::time::Duration;
    use tempfile::TempDir;

    fn builder(dir: &TempDir, clock: &FakeClock) -> EngineBuilder {
        EngineBuilder::new(dir.path())
            .with_clock(Arc::new(clock.clone()))
            .with_index_flush_timeout(Duration::from_millis(100))
            .add_session(SessionConfig::new(
                CompId::new("GATEWAY").unwrap(),
                CompId::new("BANK").unwrap(),
            ))
    }

    fn inbound(msg_type: u8, seq_num: u64, body: impl FnOnce(&mut Encoder)) -> Bytes {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_char(tags::MSG_TYPE, msg_type);
        encoder.put_str(tags::SENDER_COMP_ID, "BANK");
        encoder.put_str(tags::TARGET_COMP_ID, "GATEWAY");
        encoder.put_uint(tags::MSG_SEQ_NUM, seq_num);
        encoder.put_str(tags::SENDING_TIME, "20260127-10:00:00.000");
        body(&mut encoder);
        encoder.finish().freeze()
    }

    fn drive(ctx: &mut EngineContext) {
        for _ in 0..100 {
            if ctx.do_work() == 0 {
                return;
            }
        }
        panic!("engine did not quiesce");
    }

    fn outbound_frames(ctx: &EngineContext) -> Vec<(u64, MsgType, String)> {
        let archive = ctx.archive();
        let mut cursor = archive.subscribe();
        let mut frames = Vec::new();
        cursor.poll(
            |_, message| {
                if message.direction == Direction::Outbound {
                    frames.push((
                        message.seq_num,
                        message.msg_type,
                        String::from_utf8_lossy(&message.bytes).replace('\x01', "|"),
                    ));
                }
                PollAction::Continue
            },
            usize::MAX,
        );
        frames
    }

    #[test]
    fn test_session_ids_are_stable_by_registration_order() {
        let dir = TempDir::new().unwrap();
        let clock = FakeClock::new();
        let ctx = builder(&dir, &clock).build().unwrap();

        assert_eq!(ctx.session_id("GATEWAY", "BANK"), Some(SessionId::new(1)));
        assert_eq!(ctx.session_id("GATEWAY", "NOBODY"), None);
    }

    #[test]
    fn test_logon_heartbeat_round_trip() {
        let dir = TempDir::new().unwrap();
        let clock = FakeClock::at(86_400_000_000_000, 0);
        let mut ctx = builder(&dir, &clock).build().unwrap();
        let id = ctx.session_id("GATEWAY", "BANK").unwrap();

        ctx.inbound_sender()
            .send((
                id,
                inbound(b'A', 1, |e| {
                    e.put_uint(tags::HEART_BT_INT, 30);
                }),
            ))
            .unwrap();
        drive(&mut ctx);

        assert_eq!(
            ctx.framer_mut().with_session(id, |s| s.state()).unwrap(),
            SessionState::Active
        );
        assert_eq!(outbound_frames(&ctx)[0].1, MsgType::Logon);

        clock.advance_seconds(30);
        ctx.inbound_sender()
            .send((id, inbound(b'0', 2, |_| {})))
            .unwrap();
        drive(&mut ctx);

        let frames = outbound_frames(&ctx);
        assert_eq!(frames.last().map(|(s, t, _)| (*s, *t)), Some((2, MsgType::Heartbeat)));
    }

    #[test]
    fn test_persistent_reconnect_resumes_counters() {
        let dir = TempDir::new().unwrap();
        let clock = FakeClock::at(86_400_000_000_000, 0);

        // First run: logon plus two application messages each way.
        {
            let mut ctx = builder(&dir, &clock).build().unwrap();
            let id = ctx.session_id("GATEWAY", "BANK").unwrap();

            ctx.inbound_sender()
                .send((
                    id,
                    inbound(b'A', 1, |e| {
                        e.put_uint(tags::HEART_BT_INT, 30);
                    }),
                ))
                .unwrap();
            drive(&mut ctx);

            for seq in 2..=3 {
                ctx.inbound_sender()
                    .send((
                        id,
                        inbound(b'D', seq, |e| {
                            e.put_str(11, "ORDER");
                        }),
                    ))
                    .unwrap();
                ctx.framer_mut().with_session(id, |s| {
                    s.send(MsgType::Application(b'8'), |e| {
                        e.put_str(17, "EXEC");
                    })
                });
            }
            drive(&mut ctx);

            let (last_sent, expected) = ctx
                .framer_mut()
                .with_session(id, |s| (s.last_sent_msg_seq_num(), s.expected_seq_no()))
                .unwrap();
            assert_eq!(last_sent, 3);
            assert_eq!(expected, 4);

            ctx.indexer_mut().flush_now();
        }

        // Second run against the same data directory.
        let mut ctx = builder(&dir, &clock).build().unwrap();
        let id = ctx.session_id("GATEWAY", "BANK").unwrap();
        assert_eq!(id, SessionId::new(1));

        let (last_sent, expected) = ctx
            .framer_mut()
            .with_session(id, |s| (s.last_sent_msg_seq_num(), s.expected_seq_no()))
            .unwrap();
        assert_eq!(last_sent, 3);
        assert_eq!(expected, 4);

        // The next outbound message continues the sequence.
        ctx.framer_mut()
            .with_session(id, |s| s.send_test_request("RESUME"));
        drive(&mut ctx);

        let frames = outbound_frames(&ctx);
        let (seq, msg_type, text) = frames.last().unwrap();
        assert_eq!((*seq, *msg_type), (4, MsgType::TestRequest));
        assert!(text.contains("|34=4|"));
    }

    #[test]
    fn test_resend_request_serviced_end_to_end() {
        let dir = TempDir::new().unwrap();
        let clock = FakeClock::at(86_400_000_000_000, 0);
        let mut ctx = builder(&dir, &clock).build().unwrap();
        let id = ctx.session_id("GATEWAY", "BANK").unwrap();

        ctx.inbound_sender()
            .send((
                id,
                inbound(b'A', 1, |e| {
                    e.put_uint(tags::HEART_BT_INT, 30);
                }),
            ))
            .unwrap();
        drive(&mut ctx);
        ctx.framer_mut().with_session(id, |s| {
            s.send(MsgType::Application(b'D'), |e| {
                e.put_str(11, "ORDER-9");
            })
        });
        drive(&mut ctx);

        let history = outbound_frames(&ctx).len();

        ctx.inbound_sender()
            .send((
                id,
                inbound(b'2', 2, |e| {
                    e.put_uint(tags::BEGIN_SEQ_NO, 1);
                    e.put_uint(tags::END_SEQ_NO, 0);
                }),
            ))
            .unwrap();
        drive(&mut ctx);

        let frames = outbound_frames(&ctx);
        let replayed: Vec<_> = frames[history..].to_vec();
        assert_eq!(replayed.len(), 2);

        let (seq0, type0, text0) = &replayed[0];
        assert_eq!((*seq0, *type0), (1, MsgType::SequenceReset));
        assert!(text0.contains("|123=Y|"));
        assert!(text0.contains("|36=2|"));

        let (seq1, type1, text1) = &replayed[1];
        assert_eq!((*seq1, *type1), (2, MsgType::Application(b'D')));
        assert!(text1.contains("|43=Y|"));
        assert!(text1.contains("|122="));
        assert!(text1.contains("|11=ORDER-9|"));
    }

    #[test]
    fn test_comp_id_mismatch_tears_session_down() {
        let dir = TempDir::new().unwrap();
        let clock = FakeClock::at(86_400_000_000_000, 0);
        let mut ctx = builder(&dir, &clock).build().unwrap();
        let id = ctx.session_id("GATEWAY", "BANK").unwrap();

        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_char(tags::MSG_TYPE, b'A');
        encoder.put_str(tags::SENDER_COMP_ID, "INTRUDER");
        encoder.put_str(tags::TARGET_COMP_ID, "GATEWAY");
        encoder.put_uint(tags::MSG_SEQ_NUM, 1);
        encoder.put_str(tags::SENDING_TIME, "20260127-10:00:00.000");
        ctx.inbound_sender()
            .send((id, encoder.finish().freeze()))
            .unwrap();
        drive(&mut ctx);

        assert_eq!(
            ctx.framer_mut().with_session(id, |s| s.state()).unwrap(),
            SessionState::Disconnected
        );

        let frames = outbound_frames(&ctx);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].1, MsgType::Reject);
        assert!(frames[0].2.contains("|373=9|"));
        assert_eq!(frames[1].1, MsgType::Logout);
    }

    #[test]
    fn test_launch_and_close() {
        let dir = TempDir::new().unwrap();
        let clock = FakeClock::new();
        let ctx = builder(&dir, &clock)
            .with_idle_strategy(IdleStrategy::Park(Duration::from_millis(1)))
            .build()
            .unwrap();

        let engine = ctx.launch();
        engine.close();
    }
}
