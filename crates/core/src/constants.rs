/// Constants used throughout the cleaners workspace
use std::time::Duration;

// Environment variable names
pub const CLEANERS_LOG_VAR: &str = "CLEANERS_LOG";
pub const CLEANERS_SWEEP_INTERVAL_VAR: &str = "CLEANERS_SWEEP_INTERVAL_MS";
pub const CLEANERS_FAILURE_POLICY_VAR: &str = "CLEANERS_FAILURE_POLICY";
pub const CLEANERS_POOL_THREADS_VAR: &str = "CLEANERS_POOL_THREADS";
pub const CLEANERS_DRAIN_TIMEOUT_VAR: &str = "CLEANERS_DRAIN_TIMEOUT_MS";

// Registry watcher
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);
pub const WATCHER_THREAD_NAME: &str = "cleaner-watcher";

// Worker pools
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
pub const WORKER_THREAD_PREFIX: &str = "pool-worker";

// Slice used when a blocking wait has to notice an interrupt
pub const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(10);
