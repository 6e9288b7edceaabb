//! Fixed-size worker pool with graceful shutdown

use crate::interrupt::Interrupt;
use cleaners_core::constants::INTERRUPT_POLL_INTERVAL;
use cleaners_core::{Error, Result};
use cleaners_utils::panic_message;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a pool of named worker threads.
///
/// Clones share the pool. Shutdown stops new submissions while queued and
/// running tasks finish; workers exit once the queue is empty. Dropping the
/// last handle without shutting down has the same effect.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    name: String,
    size: usize,
    // `None` once shut down; submissions take this lock so none slip past shutdown
    jobs: Mutex<Option<Sender<Job>>>,
    lifecycle: Arc<Lifecycle>,
    seq: AtomicU64,
}

// Shared with the workers, which must not hold the sender
struct Lifecycle {
    shutdown: AtomicBool,
    live_workers: Mutex<usize>,
    drained: Condvar,
    pending: AtomicUsize,
}

struct WorkerExit(Arc<Lifecycle>);

impl Drop for WorkerExit {
    fn drop(&mut self) {
        let mut live = self.0.live_workers.lock();
        *live = live.saturating_sub(1);
        self.0.drained.notify_all();
    }
}

impl WorkerPool {
    /// Start `size` workers named `{name}-{index}`
    pub fn new(name: impl Into<String>, size: usize) -> Result<Self> {
        let name = name.into();
        if size == 0 {
            return Err(Error::usage(
                "WorkerPool::new",
                format!("pool {name} needs at least one worker"),
            ));
        }

        let (sender, receiver) = channel::unbounded::<Job>();
        let lifecycle = Arc::new(Lifecycle {
            shutdown: AtomicBool::new(false),
            live_workers: Mutex::new(size),
            drained: Condvar::new(),
            pending: AtomicUsize::new(0),
        });

        for index in 0..size {
            let receiver = receiver.clone();
            let lifecycle = Arc::clone(&lifecycle);
            thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || work(receiver, lifecycle))
                .map_err(|e| {
                    Error::configuration(format!("failed to spawn worker {index} of {name}: {e}"))
                })?;
        }

        tracing::debug!(pool = %name, size, "worker pool started");
        Ok(Self {
            shared: Arc::new(PoolShared {
                name,
                size,
                jobs: Mutex::new(Some(sender)),
                lifecycle,
                seq: AtomicU64::new(0),
            }),
        })
    }

    /// Queue `task` for execution.
    ///
    /// Fails with `Error::Rejected` once the pool has been shut down. A
    /// panic inside the task is caught and reported through the handle.
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self.shared.jobs.lock();
        let sender = jobs
            .as_ref()
            .ok_or_else(|| Error::rejected(&self.shared.name, "pool is shut down"))?;

        let seq = self.shared.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let label = format!("{}/task-{seq}", self.shared.name);
        let (result_tx, result_rx) = channel::bounded(1);

        let job: Job = Box::new(move || {
            let result =
                panic::catch_unwind(AssertUnwindSafe(task)).map_err(|p| panic_message(p.as_ref()));
            // The handle may already be gone; the result is simply discarded
            let _ = result_tx.send(result);
        });

        self.shared.lifecycle.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(job).is_err() {
            self.shared.lifecycle.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::rejected(&self.shared.name, "no workers left"));
        }

        Ok(TaskHandle {
            label,
            result: result_rx,
        })
    }

    /// Stop accepting work. Returns whether this call initiated the shutdown.
    pub fn shutdown(&self) -> bool {
        let mut jobs = self.shared.jobs.lock();
        let sender = jobs.take();
        self.shared.lifecycle.shutdown.store(true, Ordering::SeqCst);
        drop(jobs);

        let initiated = sender.is_some();
        if initiated {
            tracing::debug!(
                pool = %self.shared.name,
                pending = self.pending(),
                "worker pool shutting down"
            );
        }
        initiated
    }

    /// Whether shutdown has been initiated
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.lifecycle.shutdown.load(Ordering::SeqCst)
    }

    /// Whether shutdown has completed and every worker has exited
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.is_shutdown() && *self.shared.lifecycle.live_workers.lock() == 0
    }

    /// Tasks queued or running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.lifecycle.pending.load(Ordering::SeqCst)
    }

    /// Number of worker threads started
    #[must_use]
    pub fn size(&self) -> usize {
        self.shared.size
    }

    /// Pool name, also the worker thread name prefix
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Block until every worker has exited, for at most `timeout`.
    ///
    /// Returns `Ok(false)` on timeout and `Error::Interrupted` if `interrupt`
    /// is raised while waiting. Without a prior [`shutdown`](Self::shutdown)
    /// the workers stay alive and this waits out the full timeout.
    pub fn await_termination(&self, timeout: Duration, interrupt: &Interrupt) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let lifecycle = &self.shared.lifecycle;
        let mut live = lifecycle.live_workers.lock();
        loop {
            if *live == 0 {
                return Ok(true);
            }
            interrupt.check("WorkerPool::await_termination")?;

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let slice = (deadline - now).min(INTERRUPT_POLL_INTERVAL);
            lifecycle.drained.wait_for(&mut live, slice);
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.shared.name)
            .field("size", &self.shared.size)
            .field("pending", &self.pending())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

fn work(receiver: Receiver<Job>, lifecycle: Arc<Lifecycle>) {
    let _exit = WorkerExit(Arc::clone(&lifecycle));
    while let Ok(job) = receiver.recv() {
        job();
        lifecycle.pending.fetch_sub(1, Ordering::SeqCst);
    }
    tracing::trace!("worker exiting");
}

/// Pending result of a submitted task
pub struct TaskHandle<T> {
    label: String,
    result: Receiver<std::result::Result<T, String>>,
}

impl<T> TaskHandle<T> {
    /// Label used in errors and logs
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait for the task's value, giving up if `interrupt` is raised
    pub fn wait(self, interrupt: &Interrupt) -> Result<T> {
        loop {
            interrupt.check(&self.label)?;
            match self.result.recv_timeout(INTERRUPT_POLL_INTERVAL) {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(message)) => return Err(Error::task_failure(self.label, message)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::task_failure(
                        self.label,
                        "task was dropped before it completed",
                    ))
                }
            }
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("label", &self.label)
            .finish()
    }
}
