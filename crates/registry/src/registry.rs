//! Process-wide tracking of owners and their cleanup actions

use crate::action::CleanupAction;
use crate::cleanable::{Cleanable, RegistrationId, ReleaseOutcome, ReleaseTrigger};
use crate::watcher::{self, WatchEvent};
use cleaners_config::{FailurePolicy, RegistryConfig};
use crossbeam::channel::{self, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Registry that releases cleanup actions once their owners become unreachable.
///
/// Cloning is cheap and every clone refers to the same table and watcher.
/// Construct one per process (or per test) and hand it to the owner types;
/// nothing here is a hidden global.
///
/// The watcher keeps the table alive after the last handle is dropped and
/// only exits once every tracked action has been released.
pub struct CleanupRegistry {
    shared: Arc<RegistryShared>,
}

/// State shared between registry handles, gates and the watcher thread
pub(crate) struct RegistryShared {
    entries: DashMap<RegistrationId, Registration>,
    next_id: AtomicU64,
    events: Sender<WatchEvent>,
    failure_policy: FailurePolicy,
    sweep_interval: Duration,
    handles: AtomicUsize,
    watcher_running: AtomicBool,
    in_flight: AtomicUsize,
    counters: Counters,
    dead_letters: Mutex<Vec<FailedCleanup>>,
}

struct Registration {
    // Observes reachability only; never upgraded to keep the owner alive
    owner: Weak<dyn Any + Send + Sync>,
    cleanable: Cleanable,
    registered_at: Instant,
}

impl Registration {
    fn owner_reclaimed(&self) -> bool {
        self.owner.strong_count() == 0
    }
}

#[derive(Default)]
struct Counters {
    registered: AtomicU64,
    explicit: AtomicU64,
    background: AtomicU64,
    failed: AtomicU64,
    disarmed: AtomicU64,
}

/// Snapshot of registry activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Registrations ever made
    pub registered: u64,
    /// Registrations still tracked
    pub active: usize,
    /// Actions completed through an explicit release
    pub explicit_releases: u64,
    /// Actions completed by the watcher
    pub background_releases: u64,
    /// Actions that panicked
    pub failures: u64,
    /// Registrations dropped without running their action
    pub disarmed: u64,
}

/// Record of a cleanup action that panicked, kept under `FailurePolicy::DeadLetter`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCleanup {
    pub id: RegistrationId,
    pub label: String,
    pub trigger: ReleaseTrigger,
    pub message: String,
}

impl CleanupRegistry {
    /// Create a registry with default settings and a running watcher
    pub fn new() -> Self {
        Self::with_config(&RegistryConfig::default())
    }

    /// Create a registry with the given settings.
    ///
    /// Invalid settings are logged and replaced by the defaults.
    pub fn with_config(config: &RegistryConfig) -> Self {
        let fallback: RegistryConfig;
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                tracing::warn!(error = %e, "invalid registry configuration; using defaults");
                fallback = RegistryConfig::default();
                &fallback
            }
        };

        let (events, receiver) = channel::unbounded();
        let shared = Arc::new(RegistryShared {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
            events,
            failure_policy: config.failure_policy,
            sweep_interval: config.sweep_interval(),
            handles: AtomicUsize::new(1),
            watcher_running: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            counters: Counters::default(),
            dead_letters: Mutex::new(Vec::new()),
        });

        match watcher::spawn(
            &config.watcher_thread_name,
            Arc::clone(&shared),
            receiver,
            config.sweep_interval(),
        ) {
            Ok(_) => shared.watcher_running.store(true, Ordering::Release),
            Err(e) => tracing::error!(
                error = %e,
                "failed to spawn cleanup watcher; only explicit release will run actions"
            ),
        }

        Self { shared }
    }

    /// Track `owner` and bind `action` to its reachability.
    ///
    /// The returned [`Cleanable`] releases the action explicitly; if it is
    /// never used, the watcher releases the action after the last `Arc` of
    /// `owner` is dropped.
    pub fn register<T, A>(&self, owner: &Arc<T>, action: Arc<A>) -> Cleanable
    where
        T: Send + Sync + 'static,
        A: CleanupAction,
    {
        let id = RegistrationId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let label = action.describe();
        let cleanable =
            Cleanable::registered(id, label.clone(), action, Arc::downgrade(&self.shared));
        let owner: Weak<T> = Arc::downgrade(owner);
        let owner: Weak<dyn Any + Send + Sync> = owner;

        self.shared.entries.insert(
            id,
            Registration {
                owner,
                cleanable: cleanable.clone(),
                registered_at: Instant::now(),
            },
        );
        self.shared.counters.registered.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            id = %id,
            label = %label,
            owner = std::any::type_name::<T>(),
            "registered"
        );
        cleanable
    }

    /// Tell the watcher that the owner of `id` has just been dropped.
    ///
    /// Owners call this from `Drop` so the action runs promptly instead of on
    /// the next periodic sweep. A notice for an owner that is still alive is
    /// ignored.
    pub fn notify_unreachable(&self, id: RegistrationId) {
        if self.shared.events.send(WatchEvent::Unreachable(id)).is_err() {
            tracing::trace!(id = %id, "watcher not running; notice dropped");
        }
    }

    /// Ask the watcher to sweep for unreachable owners now
    pub fn request_sweep(&self) {
        if self.shared.events.send(WatchEvent::Sweep).is_err() {
            tracing::trace!("watcher not running; sweep request dropped");
        }
    }

    /// Wait until every unreachable owner seen so far has been released.
    ///
    /// Returns `false` if owners were still pending when `timeout` elapsed.
    pub fn await_reclaimed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.shared.in_flight.load(Ordering::SeqCst) == 0 && self.pending() == 0 {
                return true;
            }
            if Instant::now() >= deadline || !self.has_watcher() {
                return false;
            }
            self.request_sweep();
            std::thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    /// Number of tracked registrations whose owner is gone but whose action
    /// has not run yet
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared
            .entries
            .iter()
            .filter(|entry| entry.value().owner_reclaimed())
            .count()
    }

    /// Number of tracked registrations
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    /// Whether no registrations are tracked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    /// Whether `id` is still tracked
    #[must_use]
    pub fn is_registered(&self, id: RegistrationId) -> bool {
        self.shared.entries.contains_key(&id)
    }

    /// Idle time between periodic sweeps
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.shared.sweep_interval
    }

    /// Whether the watcher thread is running
    #[must_use]
    pub fn has_watcher(&self) -> bool {
        self.shared.watcher_running.load(Ordering::Acquire)
    }

    /// Snapshot of registry activity
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let counters = &self.shared.counters;
        RegistryStats {
            registered: counters.registered.load(Ordering::Relaxed),
            active: self.shared.entries.len(),
            explicit_releases: counters.explicit.load(Ordering::Relaxed),
            background_releases: counters.background.load(Ordering::Relaxed),
            failures: counters.failed.load(Ordering::Relaxed),
            disarmed: counters.disarmed.load(Ordering::Relaxed),
        }
    }

    /// Drain the records of failed actions kept under the dead-letter policy
    pub fn take_dead_letters(&self) -> Vec<FailedCleanup> {
        std::mem::take(&mut *self.shared.dead_letters.lock())
    }
}

impl Clone for CleanupRegistry {
    fn clone(&self) -> Self {
        self.shared.handles.fetch_add(1, Ordering::SeqCst);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for CleanupRegistry {
    fn drop(&mut self) {
        // Wake the watcher so it can release what is left and then retire
        if self.shared.handles.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.shared.events.send(WatchEvent::Sweep);
        }
    }
}

impl Default for CleanupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("stats", &self.stats())
            .field("watcher", &self.has_watcher())
            .finish()
    }
}

impl RegistryShared {
    /// No handles left and nothing left to release
    pub(crate) fn is_retired(&self) -> bool {
        self.handles.load(Ordering::SeqCst) == 0 && self.entries.is_empty()
    }

    pub(crate) fn watcher_stopped(&self) {
        self.watcher_running.store(false, Ordering::Release);
    }

    /// Release `id` if its owner is gone. Returns whether an entry was taken.
    pub(crate) fn reclaim(&self, id: RegistrationId) -> bool {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let taken = self
            .entries
            .remove_if(&id, |_, registration| registration.owner_reclaimed());

        let reclaimed = match taken {
            Some((_, registration)) => {
                tracing::debug!(
                    id = %id,
                    tracked_for = ?registration.registered_at.elapsed(),
                    "owner unreachable"
                );
                registration.cleanable.fire(ReleaseTrigger::Background);
                true
            }
            None => false,
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reclaimed
    }

    /// Release every entry whose owner is gone
    pub(crate) fn sweep(&self) -> usize {
        // Collect first so no shard lock is held while actions run
        let unreachable: Vec<RegistrationId> = self
            .entries
            .iter()
            .filter(|entry| entry.value().owner_reclaimed())
            .map(|entry| *entry.key())
            .collect();

        unreachable
            .into_iter()
            .filter(|id| self.reclaim(*id))
            .count()
    }

    /// Bookkeeping after a gate has been claimed and its action has run
    pub(crate) fn settle(
        &self,
        id: RegistrationId,
        label: &str,
        trigger: ReleaseTrigger,
        outcome: &ReleaseOutcome,
    ) {
        self.entries.remove(&id);

        match outcome {
            ReleaseOutcome::Released => {
                let counter = match trigger {
                    ReleaseTrigger::Explicit => &self.counters.explicit,
                    ReleaseTrigger::Background => &self.counters.background,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
            ReleaseOutcome::Failed(message) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                if self.failure_policy == FailurePolicy::DeadLetter {
                    self.dead_letters.lock().push(FailedCleanup {
                        id,
                        label: label.to_string(),
                        trigger,
                        message: message.clone(),
                    });
                }
            }
            ReleaseOutcome::AlreadyReleased => {}
        }
    }

    /// Drop a registration whose gate was claimed without running
    pub(crate) fn forget(&self, id: RegistrationId) {
        if self.entries.remove(&id).is_some() {
            self.counters.disarmed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
