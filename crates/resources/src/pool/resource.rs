//! Worker pool owner whose shutdown is tracked by the cleanup registry

use super::executor::WorkerPool;
use crate::interrupt::Interrupt;
use crate::owner::OwnerSlot;
use cleaners_config::PoolConfig;
use cleaners_core::{Error, Result};
use cleaners_registry::{Cleanable, CleanupAction, CleanupRegistry, ReleaseOutcome};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static POOL_SEQ: AtomicU64 = AtomicU64::new(0);

/// How a pool shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every worker exited within the drain timeout
    Terminated { elapsed: Duration },
    /// Workers were still busy when the drain timeout elapsed; they were left running
    Degraded { timeout: Duration, pending: usize },
    /// The wait was interrupted; shutdown stays initiated
    Interrupted,
    /// Some earlier call already shut the pool down
    AlreadyShutDown,
}

impl ShutdownOutcome {
    /// Whether the pool is known to have stopped cleanly
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            ShutdownOutcome::Terminated { .. } | ShutdownOutcome::AlreadyShutDown
        )
    }

    /// Turn a degraded or interrupted shutdown into an error
    pub fn into_result(self, resource: &str) -> Result<Self> {
        match self {
            ShutdownOutcome::Degraded { timeout, .. } => {
                Err(Error::cleanup_timeout(resource, timeout))
            }
            ShutdownOutcome::Interrupted => {
                Err(Error::interrupted(format!("shutdown of {resource}")))
            }
            outcome => Ok(outcome),
        }
    }
}

impl fmt::Display for ShutdownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownOutcome::Terminated { elapsed } => write!(f, "terminated after {elapsed:?}"),
            ShutdownOutcome::Degraded { timeout, pending } => write!(
                f,
                "degraded: {pending} task(s) still running after {timeout:?}"
            ),
            ShutdownOutcome::Interrupted => write!(f, "interrupted while draining"),
            ShutdownOutcome::AlreadyShutDown => write!(f, "already shut down"),
        }
    }
}

/// Cleanup action of a [`WorkerPoolResource`].
///
/// Holds the pool handle, the drain timeout and the interrupt flag; never the
/// owner.
pub struct PoolShutdown {
    pool: WorkerPool,
    drain_timeout: Duration,
    interrupt: Interrupt,
    outcome: Mutex<Option<ShutdownOutcome>>,
}

impl PoolShutdown {
    fn new(pool: WorkerPool, drain_timeout: Duration, interrupt: Interrupt) -> Self {
        Self {
            pool,
            drain_timeout,
            interrupt,
            outcome: Mutex::new(None),
        }
    }

    /// The pool this action shuts down
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Result of the shutdown, once it has run
    pub fn outcome(&self) -> Option<ShutdownOutcome> {
        *self.outcome.lock()
    }

    fn drain(&self) -> ShutdownOutcome {
        if !self.pool.shutdown() {
            return ShutdownOutcome::AlreadyShutDown;
        }

        let started = Instant::now();
        if self.pool.is_terminated() {
            return ShutdownOutcome::Terminated {
                elapsed: started.elapsed(),
            };
        }

        match self
            .pool
            .await_termination(self.drain_timeout, &self.interrupt)
        {
            Ok(true) => ShutdownOutcome::Terminated {
                elapsed: started.elapsed(),
            },
            Ok(false) => ShutdownOutcome::Degraded {
                timeout: self.drain_timeout,
                pending: self.pool.pending(),
            },
            Err(_) => ShutdownOutcome::Interrupted,
        }
    }
}

impl CleanupAction for PoolShutdown {
    fn run(&self) {
        let outcome = self.drain();
        match outcome {
            ShutdownOutcome::Terminated { .. } | ShutdownOutcome::AlreadyShutDown => {
                tracing::info!(pool = %self.pool.name(), outcome = %outcome, "pool shutdown")
            }
            ShutdownOutcome::Degraded { .. } | ShutdownOutcome::Interrupted => {
                tracing::warn!(pool = %self.pool.name(), outcome = %outcome, "pool shutdown")
            }
        }
        *self.outcome.lock() = Some(outcome);
    }

    fn describe(&self) -> String {
        format!("shutdown of {}", self.pool.name())
    }
}

impl fmt::Debug for PoolShutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolShutdown")
            .field("pool", &self.pool)
            .field("drain_timeout", &self.drain_timeout)
            .field("outcome", &self.outcome())
            .finish()
    }
}

/// Owner of a worker pool.
///
/// The pool is shut down exactly once: by [`release`](Self::release), or by
/// the registry watcher after the owner is dropped.
pub struct WorkerPoolResource {
    registry: CleanupRegistry,
    config: PoolConfig,
    interrupt: Interrupt,
    slot: OwnerSlot<PoolShutdown>,
}

impl WorkerPoolResource {
    /// Construct with default pool settings
    pub fn new(registry: &CleanupRegistry) -> Self {
        Self::with_config(registry, PoolConfig::default())
    }

    /// Construct with explicit pool settings
    pub fn with_config(registry: &CleanupRegistry, config: PoolConfig) -> Self {
        Self {
            registry: registry.clone(),
            config,
            interrupt: Interrupt::new(),
            slot: OwnerSlot::new(),
        }
    }

    /// Start the pool and register its shutdown. Must be called exactly once.
    pub fn setup(self: &Arc<Self>) -> Result<()> {
        const OPERATION: &str = "WorkerPoolResource::setup";
        self.slot.ensure_empty(OPERATION)?;
        self.config.validate()?;

        let seq = POOL_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
        let name = format!("{}-{seq}", self.config.thread_name_prefix);
        let pool = WorkerPool::new(name, self.config.worker_count())?;
        let action = Arc::new(PoolShutdown::new(
            pool.clone(),
            self.config.drain_timeout(),
            self.interrupt.clone(),
        ));

        if let Err(e) = self.slot.arm(OPERATION, &self.registry, self, action) {
            pool.shutdown();
            return Err(e);
        }

        tracing::info!(
            pool = %pool.name(),
            threads = pool.size(),
            drain_timeout = ?self.config.drain_timeout(),
            "pool started"
        );
        Ok(())
    }

    /// The underlying pool
    pub fn pool(&self) -> Result<&WorkerPool> {
        Ok(self.slot.armed("WorkerPoolResource::pool")?.action.pool())
    }

    /// Run every task on the pool and collect one result per task, in order.
    ///
    /// The outer error only reports use before `setup`. Per task, a panic
    /// becomes `Error::TaskFailure`, a shut-down pool `Error::Rejected`, and
    /// a raised interrupt `Error::Interrupted`.
    pub fn submit_work<I, F, T>(&self, tasks: I) -> Result<Vec<Result<T>>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool()?;
        let handles: Vec<_> = tasks.into_iter().map(|task| pool.submit(task)).collect();

        let results: Vec<Result<T>> = handles
            .into_iter()
            .map(|handle| handle.and_then(|h| h.wait(&self.interrupt)))
            .collect();

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(pool = %pool.name(), failed, total = results.len(), "tasks failed");
        } else {
            tracing::debug!(pool = %pool.name(), total = results.len(), "tasks completed");
        }
        Ok(results)
    }

    /// Shut the pool down now.
    ///
    /// A call that finds the pool already released reports
    /// [`ShutdownOutcome::AlreadyShutDown`] without touching it.
    pub fn release(&self) -> Result<ShutdownOutcome> {
        let armed = self.slot.armed("WorkerPoolResource::release")?;
        match armed.cleanable.release() {
            ReleaseOutcome::Released => armed.action.outcome().ok_or_else(|| {
                Error::task_failure(
                    armed.cleanable.label(),
                    "shutdown finished without an outcome",
                )
            }),
            ReleaseOutcome::AlreadyReleased => Ok(ShutdownOutcome::AlreadyShutDown),
            ReleaseOutcome::Failed(message) => {
                Err(Error::task_failure(armed.cleanable.label(), message))
            }
        }
    }

    /// Outcome of the shutdown, on whichever path it ran
    pub fn shutdown_outcome(&self) -> Option<ShutdownOutcome> {
        self.slot.get().and_then(|armed| armed.action.outcome())
    }

    /// The shutdown action, which outlives this owner
    pub fn shutdown_action(&self) -> Result<Arc<PoolShutdown>> {
        Ok(Arc::clone(
            &self.slot.armed("WorkerPoolResource::shutdown_action")?.action,
        ))
    }

    /// Ask blocked waits on this resource to give up
    pub fn interrupt(&self) {
        self.interrupt.raise();
    }

    /// A handle to the interrupt flag, for raising it from another thread
    pub fn interrupt_handle(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Whether the interrupt flag is raised
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.is_raised()
    }

    /// Lower the interrupt flag, returning whether it was raised
    pub fn clear_interrupt(&self) -> bool {
        self.interrupt.clear()
    }

    /// The registered release handle
    pub fn cleanable(&self) -> Result<Cleanable> {
        Ok(self
            .slot
            .armed("WorkerPoolResource::cleanable")?
            .cleanable
            .clone())
    }

    /// Whether the shutdown has run
    pub fn is_released(&self) -> bool {
        self.slot
            .get()
            .is_some_and(|armed| armed.cleanable.is_released())
    }
}

impl Drop for WorkerPoolResource {
    fn drop(&mut self) {
        self.slot.notify_dropped(&self.registry);
    }
}

impl fmt::Debug for WorkerPoolResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("WorkerPoolResource");
        match self.slot.get() {
            Some(armed) => debug
                .field("pool", armed.action.pool())
                .field("cleanable", &armed.cleanable),
            None => debug.field("state", &"not set up"),
        };
        debug.field("interrupted", &self.is_interrupted()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cleaners_config::RegistryConfig;
    use std::thread;

    fn config(threads: usize, drain_timeout_ms: u64) -> PoolConfig {
        PoolConfig {
            threads: Some(threads),
            drain_timeout_ms,
            ..PoolConfig::default()
        }
    }

    fn started(registry: &CleanupRegistry, pool: PoolConfig) -> Arc<WorkerPoolResource> {
        let resource = Arc::new(WorkerPoolResource::with_config(registry, pool));
        resource.setup().unwrap();
        resource
    }

    #[test]
    fn test_four_tasks_then_clean_release() {
        let registry = CleanupRegistry::new();
        let resource = started(&registry, config(2, 2_000));

        let results = resource
            .submit_work((1..=4u64).map(|i| move || i * i))
            .unwrap();
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![1, 4, 9, 16]);

        let outcome = resource.release().unwrap();
        assert!(matches!(outcome, ShutdownOutcome::Terminated { .. }));
        assert!(outcome.is_clean());
        assert_eq!(resource.shutdown_outcome(), Some(outcome));
        assert!(resource.pool().unwrap().is_terminated());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_second_release_reports_already_shut_down() {
        let registry = CleanupRegistry::new();
        let resource = started(&registry, config(1, 2_000));

        let first = resource.release().unwrap();
        assert!(matches!(first, ShutdownOutcome::Terminated { .. }));
        assert_eq!(resource.release().unwrap(), ShutdownOutcome::AlreadyShutDown);
        // The retained outcome belongs to the call that ran
        assert_eq!(resource.shutdown_outcome(), Some(first));
    }

    #[test]
    fn test_degraded_release_is_bounded_by_timeout() {
        let registry = CleanupRegistry::new();
        let resource = started(&registry, config(1, 50));
        resource
            .pool()
            .unwrap()
            .submit(|| thread::sleep(Duration::from_millis(600)))
            .unwrap();

        let started_at = Instant::now();
        let outcome = resource.release().unwrap();
        let elapsed = started_at.elapsed();

        assert_eq!(
            outcome,
            ShutdownOutcome::Degraded {
                timeout: Duration::from_millis(50),
                pending: 1
            }
        );
        assert!(!outcome.is_clean());
        assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
        assert!(matches!(
            outcome.into_result("pool"),
            Err(Error::CleanupTimeout { .. })
        ));
    }

    #[test]
    fn test_interrupted_release_keeps_shutdown_initiated() {
        let registry = CleanupRegistry::new();
        let resource = started(&registry, config(1, 5_000));
        resource
            .pool()
            .unwrap()
            .submit(|| thread::sleep(Duration::from_millis(300)))
            .unwrap();
        resource.interrupt();

        let outcome = resource.release().unwrap();

        assert_eq!(outcome, ShutdownOutcome::Interrupted);
        assert!(resource.pool().unwrap().is_shutdown());
        assert!(resource.is_interrupted());
        assert!(outcome.into_result("pool").unwrap_err().is_interrupted());
    }

    #[test]
    fn test_work_after_release_is_rejected() {
        let registry = CleanupRegistry::new();
        let resource = started(&registry, config(1, 2_000));
        resource.release().unwrap();

        let results = resource.submit_work((0..2).map(|i| move || i)).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(Error::Rejected { .. }))));
    }

    #[test]
    fn test_task_panic_does_not_reach_caller() {
        let registry = CleanupRegistry::new();
        let resource = started(&registry, config(2, 2_000));

        let tasks: Vec<Box<dyn FnOnce() -> u32 + Send>> = vec![
            Box::new(|| 1),
            Box::new(|| -> u32 { panic!("worker fault") }),
            Box::new(|| 3),
        ];
        let results = resource.submit_work(tasks).unwrap();

        assert_eq!(results[0].as_ref().unwrap(), &1);
        assert!(matches!(results[1], Err(Error::TaskFailure { .. })));
        assert_eq!(results[2].as_ref().unwrap(), &3);
        resource.release().unwrap();
    }

    #[test]
    fn test_interrupt_stays_raised_after_observed() {
        let registry = CleanupRegistry::new();
        let resource = started(&registry, config(1, 2_000));
        resource.interrupt_handle().raise();

        let results = resource
            .submit_work(vec![|| thread::sleep(Duration::from_millis(50))])
            .unwrap();

        assert!(results[0].as_ref().unwrap_err().is_interrupted());
        assert!(resource.is_interrupted());
        assert!(resource.clear_interrupt());
        assert!(!resource.is_interrupted());
        resource.release().unwrap();
    }

    #[test]
    fn test_dropped_owner_shuts_pool_down_in_background() {
        let registry = CleanupRegistry::with_config(&RegistryConfig {
            sweep_interval_ms: 3_600_000,
            ..RegistryConfig::default()
        });
        let resource = started(&registry, config(2, 2_000));
        let action = resource.shutdown_action().unwrap();

        drop(resource);

        assert!(registry.await_reclaimed(Duration::from_secs(5)));
        assert!(matches!(
            action.outcome(),
            Some(ShutdownOutcome::Terminated { .. })
        ));
        assert!(action.pool().is_terminated());
        assert_eq!(registry.stats().background_releases, 1);
    }

    #[test]
    fn test_use_before_setup_and_setup_twice() {
        let registry = CleanupRegistry::new();
        let resource = Arc::new(WorkerPoolResource::new(&registry));

        assert!(matches!(resource.pool(), Err(Error::Usage { .. })));
        assert!(matches!(resource.release(), Err(Error::Usage { .. })));
        assert_eq!(resource.shutdown_outcome(), None);

        resource.setup().unwrap();
        assert!(matches!(resource.setup(), Err(Error::Usage { .. })));
        assert_eq!(registry.len(), 1);
        resource.release().unwrap();
    }

    #[test]
    fn test_invalid_config_fails_setup() {
        let registry = CleanupRegistry::new();
        let resource = Arc::new(WorkerPoolResource::with_config(&registry, config(0, 100)));

        assert!(matches!(
            resource.setup(),
            Err(Error::Configuration { .. })
        ));
        assert!(registry.is_empty());
    }
}
