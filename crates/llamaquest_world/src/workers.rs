//! # Worker Pool
//!
//! Fixed set of threads draining a bounded job queue. Submissions never
//! block the game loop: a full queue refuses the job and the caller decides
//! what to do (usually retry next tick).

use std::io;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, warn};

/// A unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded background pool.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `threads` workers sharing a queue of `queue` jobs.
    ///
    /// With zero threads every job runs inline in `try_submit`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if a thread cannot be spawned.
    pub fn new(threads: usize, queue: usize) -> io::Result<Self> {
        if threads == 0 {
            return Ok(Self {
                sender: None,
                handles: Vec::new(),
            });
        }

        let (sender, receiver) = bounded::<Job>(queue.max(1));
        let handles = (0..threads)
            .map(|index| {
                let receiver = receiver.clone();
                thread::Builder::new()
                    .name(format!("llamaquest-worker-{index}"))
                    .spawn(move || Self::worker_loop(&receiver))
            })
            .collect::<io::Result<Vec<_>>>()?;

        debug!(threads, queue, "worker pool started");
        Ok(Self {
            sender: Some(sender),
            handles,
        })
    }

    fn worker_loop(receiver: &Receiver<Job>) {
        // Ends when every sender is gone and the queue is drained.
        while let Ok(job) = receiver.recv() {
            job();
        }
    }

    /// Number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    /// Queues a job without blocking.
    ///
    /// Returns `false` if the queue is full.
    pub fn try_submit(&self, job: Job) -> bool {
        let Some(sender) = &self.sender else {
            job();
            return true;
        };
        match sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => {
                warn!("worker queue disconnected");
                false
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers finish queued jobs and exit.
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
