//! Cooperative background workers.
//!
//! Work that cannot run in the block path (sensor polling, decoding, editor
//! rebuilds) runs on a [`Worker`]: a named thread that calls a
//! [`WorkerTask`] repeatedly, waits a bounded interval between calls, and
//! checks an atomic stop flag every iteration. The task hands results to the
//! block path only through a [`ring`](crate::ring) channel or a
//! [`SnapshotSwap`](crate::SnapshotSwap).
//!
//! A failing step is logged and the worker backs off and retries; the error
//! never leaves the worker thread. A panicking step stops the worker.
//! [`Worker::shutdown`] joins with a timeout and reports a worker that did
//! not exit as [`Error::WorkerTimeout`].
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use patchwire_core::{Worker, ring};
//!
//! let (mut tx, mut rx) = ring::channel::<u32>(64)?;
//! let mut n = 0;
//! let worker = Worker::spawn("counter", Duration::from_millis(1), move || {
//!     n += 1;
//!     tx.push(n);
//!     Ok::<(), std::io::Error>(())
//! })?;
//!
//! while rx.is_empty() {
//!     std::thread::yield_now();
//! }
//! worker.shutdown(Duration::from_secs(1))?;
//! assert_eq!(rx.pop(), Some(1));
//! # Ok::<(), patchwire_core::Error>(())
//! ```

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::{Error, Result};

/// How long [`Drop`] waits for a worker that was never shut down explicitly.
const DROP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// One unit of background work.
pub trait WorkerTask: Send + 'static {
    /// Error reported by a failed step.
    type Error: fmt::Display;

    /// Runs one iteration. May block, allocate, and do I/O.
    fn step(&mut self) -> std::result::Result<(), Self::Error>;

    /// Called once on the worker thread after the loop exits.
    fn on_stop(&mut self) {}
}

impl<F, E> WorkerTask for F
where
    F: FnMut() -> std::result::Result<(), E> + Send + 'static,
    E: fmt::Display,
{
    type Error = E;

    fn step(&mut self) -> std::result::Result<(), E> {
        self()
    }
}

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerStatus {
    /// Stepping normally.
    Running = 0,
    /// Last step failed; waiting out a backoff before retrying.
    Retrying = 1,
    /// Exited after a stop request.
    Stopped = 2,
    /// Exited because a step panicked.
    Failed = 3,
}

impl WorkerStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerStatus::Running,
            1 => WorkerStatus::Retrying,
            2 => WorkerStatus::Stopped,
            _ => WorkerStatus::Failed,
        }
    }
}

/// Timing of the worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Wait between successful steps.
    pub poll_interval: Duration,
    /// Upper bound of the doubling backoff after failures.
    pub max_backoff: Duration,
}

impl WorkerConfig {
    /// Polls every `poll_interval` and backs off to at most one second.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            max_backoff: poll_interval.max(Duration::from_secs(1)),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(10))
    }
}

struct Shared {
    stop: AtomicBool,
    status: AtomicU8,
    failures: AtomicU64,
    steps: AtomicU64,
}

impl Shared {
    fn set_status(&self, status: WorkerStatus) {
        self.status.store(status as u8, Ordering::Release);
    }
}

/// Handle to a running background worker.
pub struct Worker {
    name: String,
    shared: Arc<Shared>,
    wake: Sender<()>,
    /// Disconnects when the worker thread exits.
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns `task` on a thread named `name`, stepping every `poll_interval`.
    pub fn spawn<T: WorkerTask>(name: &str, poll_interval: Duration, task: T) -> Result<Self> {
        Self::spawn_with(name, WorkerConfig::new(poll_interval), task)
    }

    /// Spawns with explicit loop timing.
    pub fn spawn_with<T: WorkerTask>(name: &str, config: WorkerConfig, mut task: T) -> Result<Self> {
        let shared = Arc::new(Shared {
            stop: AtomicBool::new(false),
            status: AtomicU8::new(WorkerStatus::Running as u8),
            failures: AtomicU64::new(0),
            steps: AtomicU64::new(0),
        });
        let (wake_tx, wake_rx) = crossbeam_channel::bounded::<()>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);

        let thread_shared = Arc::clone(&shared);
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _done = done_tx;
                run_loop(&thread_name, &thread_shared, &wake_rx, config, &mut task);
            })
            .map_err(|source| Error::WorkerSpawn {
                name: name.to_string(),
                source,
            })?;

        tracing::info!(worker = name, poll_ms = config.poll_interval.as_millis() as u64, "worker started");
        Ok(Self {
            name: name.to_string(),
            shared,
            wake: wake_tx,
            done: done_rx,
            handle: Some(handle),
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.shared.status.load(Ordering::Acquire))
    }

    /// Total failed steps so far.
    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }

    /// Total completed steps, successful or not.
    pub fn steps(&self) -> u64 {
        self.shared.steps.load(Ordering::Relaxed)
    }

    /// Cuts the current wait short so the next step runs immediately.
    pub fn notify(&self) {
        let _ = self.wake.try_send(());
    }

    /// Raises the stop flag without waiting.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.notify();
    }

    /// Stops the worker and joins it, waiting at most `timeout`.
    ///
    /// A worker still running after `timeout` is reported as
    /// [`Error::WorkerTimeout`]; one that died from a panicking step as
    /// [`Error::WorkerPanicked`].
    pub fn shutdown(mut self, timeout: Duration) -> Result<()> {
        self.stop_and_join(timeout)
    }

    fn stop_and_join(&mut self, timeout: Duration) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.request_stop();
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                tracing::error!(worker = %self.name, ?timeout, "worker did not stop in time");
                return Err(Error::WorkerTimeout {
                    name: self.name.clone(),
                    timeout,
                });
            }
        }
        if handle.join().is_err() || self.status() == WorkerStatus::Failed {
            return Err(Error::WorkerPanicked(self.name.clone()));
        }
        tracing::info!(worker = %self.name, steps = self.steps(), failures = self.failures(), "worker stopped");
        Ok(())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(err) = self.stop_and_join(DROP_JOIN_TIMEOUT) {
                tracing::error!(worker = %self.name, error = %err, "worker dropped without clean shutdown");
            }
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("failures", &self.failures())
            .finish()
    }
}

fn run_loop<T: WorkerTask>(
    name: &str,
    shared: &Shared,
    wake: &Receiver<()>,
    config: WorkerConfig,
    task: &mut T,
) {
    let mut backoff = config.poll_interval;
    while !shared.stop.load(Ordering::Acquire) {
        let outcome = catch_unwind(AssertUnwindSafe(|| task.step()));
        shared.steps.fetch_add(1, Ordering::Relaxed);
        let wait = match outcome {
            Ok(Ok(())) => {
                if WorkerStatus::from_u8(shared.status.load(Ordering::Relaxed)) == WorkerStatus::Retrying {
                    tracing::info!(worker = name, "worker recovered");
                }
                shared.set_status(WorkerStatus::Running);
                backoff = config.poll_interval;
                config.poll_interval
            }
            Ok(Err(err)) => {
                let attempt = shared.failures.fetch_add(1, Ordering::Relaxed) + 1;
                backoff = (backoff * 2).min(config.max_backoff);
                tracing::warn!(worker = name, error = %err, attempt, retry_in = ?backoff, "worker step failed");
                shared.set_status(WorkerStatus::Retrying);
                backoff
            }
            Err(_) => {
                tracing::error!(worker = name, "worker step panicked, stopping");
                shared.failures.fetch_add(1, Ordering::Relaxed);
                shared.set_status(WorkerStatus::Failed);
                task.on_stop();
                return;
            }
        };
        if let Err(RecvTimeoutError::Disconnected) = wake.recv_timeout(wait) {
            break;
        }
    }
    task.on_stop();
    shared.set_status(WorkerStatus::Stopped);
}
