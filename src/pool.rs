//! Fixed-size worker pool with a bounded job queue.
//!
//! # Overview
//!
//! [`WorkerPool`] runs a fixed number of named worker threads that pull
//! [`Job`]s from a bounded crossbeam channel. Submission blocks while the
//! queue is full, which keeps producers from outrunning the workers.
//!
//! Each job runs inside a fault boundary: a job that returns an error or
//! panics is counted as failed and recorded, and the worker moves on to the
//! next job. Recorded failures are returned by [`WorkerPool::wait`].
//!
//! # Cancellation
//!
//! The pool shares the caller's shutdown flag. Once it is set, submission
//! fails with [`PoolError::Cancelled`], workers stop taking new jobs, and
//! jobs still queued are dropped without running.
//!
//! # Example
//!
//! ```
//! use dupescan::pool::{Job, PoolConfig, WorkerPool};
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! struct Square(u64);
//!
//! impl Job for Square {
//!     type Error = std::io::Error;
//!
//!     fn id(&self) -> String {
//!         format!("square-{}", self.0)
//!     }
//!
//!     fn process(self, _shutdown: &AtomicBool) -> Result<(), Self::Error> {
//!         let _ = self.0 * self.0;
//!         Ok(())
//!     }
//! }
//!
//! let shutdown = Arc::new(AtomicBool::new(false));
//! let pool = WorkerPool::new(PoolConfig::with_workers(2), shutdown).unwrap();
//! for i in 0..10 {
//!     pool.submit(Square(i)).unwrap();
//! }
//! let report = pool.wait();
//! assert_eq!(report.metrics.completed, 10);
//! assert!(report.errors.is_empty());
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use serde::Serialize;

/// How long a blocked submit or idle worker waits before re-checking the
/// shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default queue slots per worker.
pub const DEFAULT_QUEUE_DEPTH_FACTOR: usize = 10;

/// A unit of work executed by the pool.
pub trait Job: Send + 'static {
    /// Error returned by a failed job.
    type Error: std::fmt::Display + Send + 'static;

    /// Identifier used when recording failures.
    fn id(&self) -> String;

    /// Execute the job. Long-running jobs should poll `shutdown`.
    ///
    /// # Errors
    ///
    /// Any error is recorded against the job's id and counted as a failure.
    fn process(self, shutdown: &AtomicBool) -> Result<(), Self::Error>;
}

/// Pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads (at least 1)
    pub workers: usize,
    /// Queue capacity is `workers * queue_depth_factor`
    pub queue_depth_factor: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth_factor: DEFAULT_QUEUE_DEPTH_FACTOR,
        }
    }
}

impl PoolConfig {
    /// Configuration with an explicit worker count. `0` means one per CPU.
    #[must_use]
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: if workers == 0 { default_workers() } else { workers },
            ..Self::default()
        }
    }

    /// Set the queue depth factor.
    #[must_use]
    pub fn with_queue_depth_factor(mut self, factor: usize) -> Self {
        self.queue_depth_factor = factor.max(1);
        self
    }

    /// Capacity of the job queue.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.workers.max(1) * self.queue_depth_factor.max(1)
    }
}

/// Number of logical CPUs, falling back to 1.
#[must_use]
pub fn default_workers() -> usize {
    thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// Errors from pool construction and submission.
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    /// A worker thread could not be started.
    #[error("Failed to spawn worker {id}: {source}")]
    Spawn {
        /// Worker index
        id: usize,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The shutdown flag was set; the job was not queued.
    #[error("Worker pool cancelled")]
    Cancelled,

    /// The pool no longer accepts jobs.
    #[error("Worker pool closed")]
    Closed,
}

/// A recorded job failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobFailure {
    /// The failing job's id
    pub job_id: String,
    /// Error or panic message
    pub message: String,
    /// Whether the job panicked rather than returning an error
    pub panicked: bool,
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolMetrics {
    /// Jobs that ran to completion
    pub completed: u64,
    /// Jobs that returned an error or panicked
    pub failed: u64,
    /// Jobs waiting in the queue
    pub queued: u64,
    /// Workers currently executing a job
    pub busy: usize,
}

/// Result of draining the pool.
#[derive(Debug, Default)]
pub struct PoolReport {
    /// Final counters
    pub metrics: PoolMetrics,
    /// Recorded failures, oldest first, capped at the queue capacity
    pub errors: Vec<JobFailure>,
    /// Jobs dropped unrun because of cancellation
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    queued: AtomicU64,
    busy: AtomicUsize,
}

/// Fixed-size pool of worker threads.
pub struct WorkerPool<J: Job> {
    sender: Option<Sender<J>>,
    receiver: Receiver<J>,
    errors_rx: Receiver<JobFailure>,
    handles: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
    shutdown: Arc<AtomicBool>,
}

impl<J: Job> WorkerPool<J> {
    /// Start the workers.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a thread cannot be created. Workers
    /// already started are shut down before returning.
    pub fn new(config: PoolConfig, shutdown: Arc<AtomicBool>) -> Result<Self, PoolError> {
        let workers = config.workers.max(1);
        let capacity = config.queue_capacity();
        let (sender, receiver) = bounded::<J>(capacity);
        let (errors_tx, errors_rx) = bounded::<JobFailure>(capacity);
        let counters = Arc::new(Counters::default());

        let mut pool = Self {
            sender: Some(sender),
            receiver,
            errors_rx,
            handles: Vec::with_capacity(workers),
            counters,
            shutdown,
        };

        for id in 0..workers {
            let rx = pool.receiver.clone();
            let errors_tx = errors_tx.clone();
            let counters = Arc::clone(&pool.counters);
            let shutdown = Arc::clone(&pool.shutdown);

            let handle = thread::Builder::new()
                .name(format!("hash-worker-{id}"))
                .spawn(move || worker_loop(id, &rx, &errors_tx, &counters, &shutdown))
                .map_err(|source| PoolError::Spawn { id, source })?;
            pool.handles.push(handle);
        }

        log::debug!("Worker pool started: {} workers, queue capacity {}", workers, capacity);
        Ok(pool)
    }

    /// Queue a job, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Cancelled`] once the shutdown flag is set
    /// - [`PoolError::Closed`] after [`WorkerPool::wait`] has begun
    pub fn submit(&self, job: J) -> Result<(), PoolError> {
        let sender = self.sender.as_ref().ok_or(PoolError::Closed)?;
        let mut job = job;

        // Counted before the send so a fast worker never decrements first.
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        let result = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break Err(PoolError::Cancelled);
            }
            match sender.send_timeout(job, POLL_INTERVAL) {
                Ok(()) => break Ok(()),
                Err(SendTimeoutError::Timeout(returned)) => job = returned,
                Err(SendTimeoutError::Disconnected(_)) => break Err(PoolError::Closed),
            }
        };
        if result.is_err() {
            self.counters.queued.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }

    /// Snapshot of the pool counters.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
            queued: self.counters.queued.load(Ordering::SeqCst),
            busy: self.counters.busy.load(Ordering::SeqCst),
        }
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Stop accepting jobs, let the workers drain the queue, and collect
    /// every recorded failure.
    ///
    /// If shutdown was requested, queued jobs are dropped instead of run.
    #[must_use]
    pub fn wait(mut self) -> PoolReport {
        self.finish()
    }

    fn finish(&mut self) -> PoolReport {
        self.sender = None;

        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("Hash worker thread exited abnormally");
            }
        }

        let dropped = self.receiver.try_iter().count() as u64;
        if dropped > 0 {
            log::info!("Dropped {} queued jobs after cancellation", dropped);
            self.counters.queued.fetch_sub(dropped, Ordering::SeqCst);
        }

        PoolReport {
            metrics: self.metrics(),
            errors: self.errors_rx.try_iter().collect(),
            dropped,
        }
    }
}

impl<J: Job> Drop for WorkerPool<J> {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            let _ = self.finish();
        }
    }
}

fn worker_loop<J: Job>(
    id: usize,
    rx: &Receiver<J>,
    errors_tx: &Sender<JobFailure>,
    counters: &Counters,
    shutdown: &AtomicBool,
) {
    log::trace!("Hash worker {} starting", id);

    while !shutdown.load(Ordering::SeqCst) {
        let job = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        counters.queued.fetch_sub(1, Ordering::SeqCst);
        counters.busy.fetch_add(1, Ordering::SeqCst);

        let job_id = job.id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| job.process(shutdown)));

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(JobFailure {
                job_id,
                message: e.to_string(),
                panicked: false,
            }),
            Err(payload) => Some(JobFailure {
                job_id,
                message: panic_message(payload.as_ref()),
                panicked: true,
            }),
        };

        match failure {
            None => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
            }
            Some(failure) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                log::warn!(
                    "Job {} failed{}: {}",
                    failure.job_id,
                    if failure.panicked { " (panic)" } else { "" },
                    failure.message
                );
                if errors_tx.try_send(failure).is_err() {
                    log::error!("Failure buffer full, dropping error record");
                }
            }
        }

        counters.busy.fetch_sub(1, Ordering::SeqCst);
    }

    log::trace!("Hash worker {} exiting", id);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}
