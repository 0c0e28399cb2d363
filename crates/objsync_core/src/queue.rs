//! Serial work queues backing contexts.
//!
//! Each queue owns one worker thread fed through a channel. Jobs run in
//! submission order. [`SerialQueue::perform_and_wait`] blocks the caller
//! until its job finishes and runs inline when called from the worker, so
//! a job may call back into its own queue.

use crate::error::CoreResult;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, SendError, Sender};
use std::thread::{self, ThreadId};
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A single worker thread executing jobs one at a time.
///
/// The worker exits once the queue is dropped and its pending jobs drain.
pub struct SerialQueue {
    label: String,
    sender: Sender<Job>,
    worker: ThreadId,
}

impl SerialQueue {
    /// Spawns the worker thread.
    ///
    /// # Errors
    ///
    /// Fails if the operating system refuses to spawn a thread.
    pub fn new(label: impl Into<String>) -> CoreResult<Self> {
        let label = label.into();
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new().name(label.clone()).spawn(move || {
            for job in receiver {
                job();
            }
        })?;
        let worker = handle.thread().id();
        debug!(queue = %label, "serial queue started");
        Ok(Self {
            label,
            sender,
            worker,
        })
    }

    /// Returns the queue label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the worker thread id.
    #[must_use]
    pub fn worker_id(&self) -> ThreadId {
        self.worker
    }

    /// Returns true when called from the worker thread.
    #[must_use]
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker
    }

    /// Runs `job` on the worker and waits for its result.
    ///
    /// A panic inside the job is re-raised on the caller.
    pub fn perform_and_wait<R, F>(&self, job: F) -> R
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            return job();
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let wrapped: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job));
            let _ = tx.send(outcome);
        });
        if let Err(SendError(wrapped)) = self.sender.send(wrapped) {
            wrapped();
        }

        match rx.recv() {
            Ok(Ok(value)) => value,
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => unreachable!("queue {} dropped a pending job", self.label),
        }
    }

    /// Schedules `job` on the worker without waiting.
    ///
    /// Panics inside the job are caught and logged so the worker survives.
    pub fn perform<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let label = self.label.clone();
        let wrapped: Job = Box::new(move || {
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!(queue = %label, "queued job panicked");
            }
        });
        if let Err(SendError(wrapped)) = self.sender.send(wrapped) {
            wrapped();
        }
    }
}

impl std::fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.label)
            .field("worker", &self.worker)
            .finish()
    }
}
