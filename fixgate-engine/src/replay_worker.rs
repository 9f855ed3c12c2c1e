/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The replay worker.
//!
//! Maintains its own replay index by tailing the archive stream (no state is
//! shared with the indexer), takes resend commands from the framer's queue,
//! and steps the replayer's channels one unit of work per duty cycle. Each
//! replay that runs to completion is reported back to the framer as a
//! `ReplayComplete` command.

use crate::command::{FramerCommand, ReplayCommand};
use crate::publication::StreamPublication;
use crate::worker::Worker;
use crossbeam_channel::{Receiver, Sender};
use fixgate_replay::index::ReplayIndex;
use fixgate_replay::replayer::Replayer;
use fixgate_transport::stream::{PollAction, StreamCursor};

/// Max archived messages indexed per duty cycle.
const MESSAGES_PER_CYCLE: usize = 64;

/// The replay worker: resend servicing.
pub struct ReplayWorker {
    archive_cursor: StreamCursor,
    index: ReplayIndex,
    replayer: Replayer<StreamPublication>,
    commands: Receiver<ReplayCommand>,
    framer: Sender<FramerCommand>,
}

impl ReplayWorker {
    /// Creates the replay worker.
    ///
    /// # Arguments
    /// * `archive_cursor` - Private tail over the archive stream
    /// * `replayer` - The channel manager
    /// * `commands` - Command queue fed by the framer
    /// * `framer` - Where replay completions are reported
    #[must_use]
    pub fn new(
        archive_cursor: StreamCursor,
        replayer: Replayer<StreamPublication>,
        commands: Receiver<ReplayCommand>,
        framer: Sender<FramerCommand>,
    ) -> Self {
        Self {
            archive_cursor,
            index: ReplayIndex::new(),
            replayer,
            commands,
            framer,
        }
    }

    /// Returns the replayer's live/queued counts, for observability.
    #[must_use]
    pub fn load(&self) -> (usize, usize) {
        (self.replayer.active_count(), self.replayer.queued_count())
    }

    fn drain_archive(&mut self) -> usize {
        let Self {
            archive_cursor,
            index,
            ..
        } = self;
        archive_cursor.poll(
            |position, message| {
                index.on_message(message.session_id, message.seq_num, position, message.direction);
                PollAction::Continue
            },
            MESSAGES_PER_CYCLE,
        )
    }

    fn drain_commands(&mut self) -> usize {
        let mut work = 0;
        while let Ok(command) = self.commands.try_recv() {
            match command {
                ReplayCommand::StartReplay {
                    range,
                    info,
                    publication,
                } => {
                    self.replayer
                        .on_resend_request(range, info, publication, &self.index);
                }
                ReplayCommand::AbortSession { session_id } => {
                    self.replayer.abort_session(session_id);
                }
            }
            work += 1;
        }
        work
    }
}

impl Worker for ReplayWorker {
    fn do_work(&mut self) -> usize {
        let mut work =
            self.drain_archive() + self.drain_commands() + self.replayer.do_work(&self.index);

        for session_id in self.replayer.drain_completed() {
            let _ = self
                .framer
                .send(FramerCommand::ReplayComplete { session_id });
            work += 1;
        }

        work
    }

    fn name(&self) -> &'static str {
        "replayer"
    }
}
