/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Cooperative workers and idle strategies.
//!
//! Each long-lived role (framer, indexer, replayer) is a [`Worker`] driven
//! by a dedicated thread: call `do_work`, apply the [`IdleStrategy`] when a
//! tick produced nothing, repeat until asked to stop. Workers never block on
//! I/O inside `do_work`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::info;

/// A unit of cooperatively scheduled work.
pub trait Worker: Send {
    /// Performs one duty cycle.
    ///
    /// # Returns
    /// Amount of work done; zero lets the runner idle.
    fn do_work(&mut self) -> usize;

    /// Called once when the runner shuts down.
    fn on_close(&mut self) {}

    /// Name used for the thread and logging.
    fn name(&self) -> &'static str {
        "worker"
    }
}

/// What a worker thread does when a duty cycle produced no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleStrategy {
    /// Spin on the CPU; lowest latency, one core burned.
    BusySpin,
    /// Yield the time slice to the scheduler.
    Yield,
    /// Park the thread for a fixed duration.
    Park(Duration),
}

impl IdleStrategy {
    /// Applies the strategy after a duty cycle.
    pub fn idle(self, work_count: usize) {
        if work_count > 0 {
            return;
        }
        match self {
            Self::BusySpin => std::hint::spin_loop(),
            Self::Yield => std::thread::yield_now(),
            Self::Park(duration) => std::thread::sleep(duration),
        }
    }
}

impl Default for IdleStrategy {
    fn default() -> Self {
        Self::Park(Duration::from_millis(1))
    }
}

/// Owns a worker's thread.
#[derive(Debug)]
pub struct WorkerRunner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    name: &'static str,
}

impl WorkerRunner {
    /// Spawns a thread driving `worker` until [`WorkerRunner::stop`].
    #[must_use]
    pub fn start<W: Worker + 'static>(mut worker: W, idle: IdleStrategy) -> Self {
        let name = worker.name();
        let running = Arc::new(AtomicBool::new(true));
        let thread_flag = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                info!(worker = name, "worker started");
                while thread_flag.load(Ordering::Acquire) {
                    let work = worker.do_work();
                    idle.idle(work);
                }
                worker.on_close();
                info!(worker = name, "worker stopped");
            })
            .expect("failed to spawn worker thread");

        Self {
            running,
            handle: Some(handle),
            name,
        }
    }

    /// Signals the worker to stop and joins its thread.
    pub fn stop(mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Returns the worker's name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for WorkerRunner {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
