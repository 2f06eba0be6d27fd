//! Bounded worker pool with exact-once task accounting
//!
//! A dispatcher is created for a known number of tasks N. Every one of those
//! tasks is either submitted (and later completes, fails or panics) or skipped;
//! each path decrements the remaining-task counter exactly once. `join` waits
//! for the counter to reach zero, bounded by a timeout after which the pool is
//! forcibly terminated.

use super::CompletionCallback;
use crate::error::DispatcherError;
use crate::types::ProcessedImage;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const TERMINATED: u8 = 2;

/// Lifecycle of a [`CallbackDispatcher`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatcherState {
    /// Accepting submissions and skips
    Running,
    /// `join` was called; waiting for outstanding tasks
    Draining,
    /// Workers released; nothing further runs
    Terminated,
}

impl DispatcherState {
    fn from_u8(value: u8) -> Self {
        match value {
            RUNNING => DispatcherState::Running,
            DRAINING => DispatcherState::Draining,
            _ => DispatcherState::Terminated,
        }
    }
}

impl std::fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DispatcherState::Running => "running",
            DispatcherState::Draining => "draining",
            DispatcherState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// How [`CallbackDispatcher::join`] ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JoinOutcome {
    /// Every task was accounted for and the workers exited
    Completed,
    /// The dispatcher was terminated with tasks still outstanding
    ForcedTermination {
        /// Tasks that never completed
        remaining: usize,
    },
}

/// Counters snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    /// Callbacks that returned `Ok`
    pub completed: usize,
    /// Callbacks that returned `Err` or panicked
    pub failed: usize,
    /// Tasks skipped without a callback
    pub skipped: usize,
    /// Tasks not yet accounted for
    pub remaining: usize,
    /// Current lifecycle state
    pub state: DispatcherState,
}

/// One queued callback invocation
#[derive(Clone, Debug)]
pub struct CallbackJob {
    /// The processed image handed to the callback
    pub record: ProcessedImage,
    /// Opaque caller data
    pub extra_params: Option<serde_json::Value>,
}

/// State shared between the dispatcher handle and its worker threads
struct Shared {
    state: AtomicU8,
    remaining: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    drained_tx: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl Shared {
    fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Account for one task
    fn finish_one(&self) {
        // Only the decrement that reaches zero publishes, so the watch value never regresses
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained_tx.send_replace(true);
        }
    }
}

/// Runs a [`CompletionCallback`] on a pool of dedicated threads
///
/// # Examples
///
/// ```
/// use imsearch_dl::callbacks::{CallbackDispatcher, CallbackResult, JoinOutcome};
/// use imsearch_dl::ProcessedImage;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let callback = Arc::new(|_: &ProcessedImage, _: Option<&serde_json::Value>| -> CallbackResult {
///     Ok(())
/// });
/// let dispatcher = CallbackDispatcher::new(callback, 2, 1)?;
///
/// dispatcher.skip()?;
/// dispatcher.skip()?;
/// assert_eq!(dispatcher.join(Duration::from_secs(1)).await, JoinOutcome::Completed);
/// # Ok(())
/// # }
/// ```
pub struct CallbackDispatcher {
    shared: Arc<Shared>,
    capacity: usize,
    reserved: AtomicUsize,
    /// Job queue; `None` once the queue is closed. Lifecycle transitions happen
    /// while holding this lock so a submission never races a state change.
    sender: Mutex<Option<mpsc::Sender<CallbackJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    drained_rx: watch::Receiver<bool>,
}

impl CallbackDispatcher {
    /// Start `worker_count` worker threads for `task_count` tasks
    ///
    /// A worker count of zero is treated as one.
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherError::Spawn`] if a worker thread cannot be started.
    pub fn new(
        callback: Arc<dyn CompletionCallback>,
        task_count: usize,
        worker_count: usize,
    ) -> Result<Self, DispatcherError> {
        let worker_count = worker_count.max(1);
        let (drained_tx, drained_rx) = watch::channel(task_count == 0);
        let shared = Arc::new(Shared {
            state: AtomicU8::new(RUNNING),
            remaining: AtomicUsize::new(task_count),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            drained_tx,
            cancel: CancellationToken::new(),
        });

        let (job_tx, job_rx) = mpsc::channel::<CallbackJob>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut workers = Vec::with_capacity(worker_count);
        for n in 0..worker_count {
            let job_rx = Arc::clone(&job_rx);
            let shared = Arc::clone(&shared);
            let callback = Arc::clone(&callback);
            let handle = std::thread::Builder::new()
                .name(format!("imsearch-callback-{n}"))
                .spawn(move || worker_loop(n, &job_rx, &shared, callback.as_ref()))
                .map_err(DispatcherError::Spawn)?;
            workers.push(handle);
        }

        debug!(task_count, worker_count, "callback dispatcher started");

        Ok(Self {
            shared,
            capacity: task_count,
            reserved: AtomicUsize::new(0),
            sender: Mutex::new(Some(job_tx)),
            workers: Mutex::new(workers),
            drained_rx,
        })
    }

    /// Queue a callback for `record`
    ///
    /// Never blocks on callback execution.
    ///
    /// # Errors
    ///
    /// - [`DispatcherError::Closed`] once `join` or `terminate` has been called
    /// - [`DispatcherError::Exhausted`] if all N tasks were already submitted or skipped
    ///
    /// A rejected submission leaves the counter unchanged.
    pub fn submit(
        &self,
        record: ProcessedImage,
        extra_params: Option<serde_json::Value>,
    ) -> Result<(), DispatcherError> {
        let sender = self.lock_sender();
        self.ensure_running()?;
        let Some(tx) = sender.as_ref() else {
            return Err(DispatcherError::Closed {
                state: self.shared.state(),
            });
        };
        self.reserve_slot()?;

        if tx
            .send(CallbackJob {
                record,
                extra_params,
            })
            .is_err()
        {
            // Every worker is gone; the slot can never run, so account for it here
            error!("callback workers exited unexpectedly, counting task as failed");
            self.shared.failed.fetch_add(1, Ordering::Relaxed);
            self.shared.finish_one();
        }
        Ok(())
    }

    /// Account for a task that produced nothing to call back about
    ///
    /// # Errors
    ///
    /// Same rejection rules as [`submit`](Self::submit).
    pub fn skip(&self) -> Result<(), DispatcherError> {
        let _sender = self.lock_sender();
        self.ensure_running()?;
        self.reserve_slot()?;
        self.shared.skipped.fetch_add(1, Ordering::Relaxed);
        self.shared.finish_one();
        Ok(())
    }

    /// Stop accepting work and wait for every task to be accounted for
    ///
    /// Returns [`JoinOutcome::Completed`] once the counter reaches zero and the
    /// workers have exited. If `timeout` elapses first, or [`terminate`](Self::terminate)
    /// is called meanwhile, the dispatcher is terminated and
    /// [`JoinOutcome::ForcedTermination`] reports the tasks left outstanding.
    pub async fn join(&self, timeout: Duration) -> JoinOutcome {
        {
            let _sender = self.lock_sender();
            // Fails harmlessly if already draining or terminated
            let _ = self.shared.state.compare_exchange(
                RUNNING,
                DRAINING,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }

        if self.shared.state() == DispatcherState::Terminated {
            return self.forced_outcome();
        }

        let deadline = tokio::time::Instant::now() + timeout;
        tokio::select! {
            _ = wait_drained(self.drained_rx.clone()) => {}
            _ = self.shared.cancel.cancelled() => {
                return self.forced_outcome();
            }
            _ = tokio::time::sleep_until(deadline) => {
                let remaining = self.remaining();
                warn!(remaining, timeout = ?timeout, "callback join timed out, terminating workers");
                self.terminate();
                return JoinOutcome::ForcedTermination { remaining };
            }
        }

        self.shutdown_workers().await;
        let stats = self.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            skipped = stats.skipped,
            "callback dispatcher joined"
        );
        JoinOutcome::Completed
    }

    /// Stop immediately
    ///
    /// Queued callbacks are discarded, running callbacks are left to finish on
    /// their detached threads and every later `submit`/`skip` is rejected.
    /// Calling it again has no effect.
    pub fn terminate(&self) {
        let (previous, sender) = {
            let mut guard = self.lock_sender();
            let previous = self.shared.state.swap(TERMINATED, Ordering::AcqRel);
            (previous, guard.take())
        };
        if previous == TERMINATED {
            return;
        }

        self.shared.cancel.cancel();
        drop(sender);
        // Dropping the handles detaches the threads
        self.lock_workers().clear();

        let remaining = self.remaining();
        if remaining > 0 {
            warn!(remaining, "callback dispatcher terminated with tasks outstanding");
        } else {
            debug!("callback dispatcher terminated");
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> DispatcherState {
        self.shared.state()
    }

    /// Number of tasks the dispatcher was created for
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks not yet accounted for
    pub fn remaining(&self) -> usize {
        self.shared.remaining.load(Ordering::Acquire)
    }

    /// Counters snapshot
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            completed: self.shared.completed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            skipped: self.shared.skipped.load(Ordering::Relaxed),
            remaining: self.remaining(),
            state: self.state(),
        }
    }

    fn ensure_running(&self) -> Result<(), DispatcherError> {
        match self.shared.state() {
            DispatcherState::Running => Ok(()),
            state => Err(DispatcherError::Closed { state }),
        }
    }

    fn reserve_slot(&self) -> Result<(), DispatcherError> {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |reserved| {
                (reserved < self.capacity).then_some(reserved + 1)
            })
            .map(|_| ())
            .map_err(|_| DispatcherError::Exhausted {
                capacity: self.capacity,
            })
    }

    fn forced_outcome(&self) -> JoinOutcome {
        JoinOutcome::ForcedTermination {
            remaining: self.remaining(),
        }
    }

    /// Close the queue and join the (idle) worker threads
    async fn shutdown_workers(&self) {
        drop(self.lock_sender().take());
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.lock_workers());

        let joined = tokio::task::spawn_blocking(move || {
            for handle in workers {
                if handle.join().is_err() {
                    warn!("callback worker thread panicked");
                }
            }
        })
        .await;
        if let Err(e) = joined {
            warn!(error = %e, "failed to join callback workers");
        }

        self.shared.state.store(TERMINATED, Ordering::Release);
    }

    fn lock_sender(&self) -> MutexGuard<'_, Option<mpsc::Sender<CallbackJob>>> {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CallbackDispatcher {
    fn drop(&mut self) {
        if self.shared.state() != DispatcherState::Terminated {
            self.terminate();
        }
    }
}

async fn wait_drained(mut drained: watch::Receiver<bool>) {
    while !*drained.borrow_and_update() {
        if drained.changed().await.is_err() {
            return;
        }
    }
}

fn worker_loop(
    worker: usize,
    jobs: &Mutex<mpsc::Receiver<CallbackJob>>,
    shared: &Shared,
    callback: &dyn CompletionCallback,
) {
    loop {
        let job = {
            let receiver = jobs.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv()
        };
        let Ok(job) = job else {
            break;
        };

        if shared.state() == DispatcherState::Terminated {
            debug!(worker, image_id = %job.record.record.image_id, "discarding queued callback");
            continue;
        }

        let image_id = &job.record.record.image_id;
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            callback.call(&job.record, job.extra_params.as_ref())
        }));

        match outcome {
            Ok(Ok(())) => {
                shared.completed.fetch_add(1, Ordering::Relaxed);
                debug!(worker, image_id = %image_id, "callback completed");
            }
            Ok(Err(e)) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker, image_id = %image_id, error = %e, "callback failed");
            }
            Err(payload) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    worker,
                    image_id = %image_id,
                    panic = panic_message(payload.as_ref()),
                    "callback panicked"
                );
            }
        }
        shared.finish_one();
    }
    debug!(worker, "callback worker exiting");
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
