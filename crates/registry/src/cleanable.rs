//! One-shot release gate bound to a cleanup action

use crate::action::CleanupAction;
use crate::registry::RegistryShared;
use cleaners_utils::panic_message;
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Identity of one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    /// Id carried by gates that were never registered
    pub const DETACHED: RegistrationId = RegistrationId(0);

    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric id
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cleanable-{}", self.0)
    }
}

/// Gate states; `Fired` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanableState {
    Armed,
    Fired,
}

/// Which path asked for the release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseTrigger {
    /// The owner called `release`
    Explicit,
    /// The watcher found the owner unreachable
    Background,
}

impl fmt::Display for ReleaseTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseTrigger::Explicit => write!(f, "explicit"),
            ReleaseTrigger::Background => write!(f, "background"),
        }
    }
}

/// Result of pulling the trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// This call ran the action to completion
    Released,
    /// Another call already claimed the gate; nothing ran
    AlreadyReleased,
    /// This call ran the action and it panicked; the gate stays fired
    Failed(String),
}

impl ReleaseOutcome {
    /// Whether this call was the one that claimed the gate
    #[must_use]
    pub fn claimed(&self) -> bool {
        !matches!(self, ReleaseOutcome::AlreadyReleased)
    }
}

/// Handle to a registered cleanup action.
///
/// Clones share the same gate. The first [`release`](Cleanable::release),
/// from any clone or from the registry watcher, runs the action; every later
/// call is a no-op returning [`ReleaseOutcome::AlreadyReleased`].
#[derive(Clone)]
pub struct Cleanable {
    inner: Arc<CleanableInner>,
}

struct CleanableInner {
    id: RegistrationId,
    label: String,
    fired: AtomicBool,
    // Taken exactly once by whoever wins the gate, then dropped after running
    action: Mutex<Option<Arc<dyn CleanupAction>>>,
    registry: Weak<RegistryShared>,
}

impl Cleanable {
    pub(crate) fn registered(
        id: RegistrationId,
        label: String,
        action: Arc<dyn CleanupAction>,
        registry: Weak<RegistryShared>,
    ) -> Self {
        Self {
            inner: Arc::new(CleanableInner {
                id,
                label,
                fired: AtomicBool::new(false),
                action: Mutex::new(Some(action)),
                registry,
            }),
        }
    }

    /// Create a gate that is not tracked by any registry
    pub fn detached(action: Arc<dyn CleanupAction>) -> Self {
        let label = action.describe();
        Self::registered(RegistrationId::DETACHED, label, action, Weak::new())
    }

    /// Registration id
    #[must_use]
    pub fn id(&self) -> RegistrationId {
        self.inner.id
    }

    /// Label of the bound action
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Current gate state
    #[must_use]
    pub fn state(&self) -> CleanableState {
        if self.inner.fired.load(Ordering::Acquire) {
            CleanableState::Fired
        } else {
            CleanableState::Armed
        }
    }

    /// Whether the gate has been claimed
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.state() == CleanableState::Fired
    }

    /// Run the action now, unless some other caller already did
    pub fn release(&self) -> ReleaseOutcome {
        self.fire(ReleaseTrigger::Explicit)
    }

    /// Claim the gate without running the action and drop the registration.
    ///
    /// Returns `false` if the gate had already been claimed.
    pub fn disarm(&self) -> bool {
        if !self.claim() {
            return false;
        }
        self.inner.action.lock().take();
        if let Some(registry) = self.inner.registry.upgrade() {
            registry.forget(self.inner.id);
        }
        tracing::debug!(id = %self.inner.id, label = %self.inner.label, "disarmed");
        true
    }

    pub(crate) fn fire(&self, trigger: ReleaseTrigger) -> ReleaseOutcome {
        if !self.claim() {
            tracing::debug!(
                id = %self.inner.id,
                label = %self.inner.label,
                trigger = %trigger,
                "release_skipped"
            );
            return ReleaseOutcome::AlreadyReleased;
        }

        let action = self.inner.action.lock().take();
        let outcome = match action {
            Some(action) => match panic::catch_unwind(AssertUnwindSafe(|| action.run())) {
                Ok(()) => ReleaseOutcome::Released,
                Err(payload) => ReleaseOutcome::Failed(panic_message(payload.as_ref())),
            },
            None => ReleaseOutcome::AlreadyReleased,
        };

        match &outcome {
            ReleaseOutcome::Released => tracing::info!(
                id = %self.inner.id,
                label = %self.inner.label,
                trigger = %trigger,
                "released"
            ),
            ReleaseOutcome::Failed(message) => tracing::error!(
                id = %self.inner.id,
                label = %self.inner.label,
                trigger = %trigger,
                error = %message,
                "cleanup_failed"
            ),
            ReleaseOutcome::AlreadyReleased => {}
        }

        if let Some(registry) = self.inner.registry.upgrade() {
            registry.settle(self.inner.id, &self.inner.label, trigger, &outcome);
        }
        outcome
    }

    // Single atomic claim; a check-then-set pair would let two callers both run
    fn claim(&self) -> bool {
        self.inner
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl fmt::Debug for Cleanable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanable")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::FnAction;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;

    fn counting(runs: &Arc<AtomicUsize>) -> Arc<dyn CleanupAction> {
        let runs = Arc::clone(runs);
        Arc::new(FnAction::new("counter", move || {
            runs.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_release_runs_action_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cleanable = Cleanable::detached(counting(&runs));

        assert_eq!(cleanable.state(), CleanableState::Armed);
        assert_eq!(cleanable.release(), ReleaseOutcome::Released);
        assert_eq!(cleanable.release(), ReleaseOutcome::AlreadyReleased);
        assert_eq!(cleanable.clone().release(), ReleaseOutcome::AlreadyReleased);

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cleanable.state(), CleanableState::Fired);
        assert_eq!(cleanable.id(), RegistrationId::DETACHED);
        assert_eq!(cleanable.label(), "counter");
    }

    #[test]
    fn test_concurrent_release_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cleanable = Cleanable::detached(counting(&runs));
        let barrier = Arc::new(Barrier::new(16));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cleanable = cleanable.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    if i % 2 == 0 {
                        cleanable.release()
                    } else {
                        cleanable.fire(ReleaseTrigger::Background)
                    }
                })
            })
            .collect();

        let claimed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(ReleaseOutcome::claimed)
            .count();

        assert_eq!(claimed, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_action_is_contained() {
        let cleanable = Cleanable::detached(Arc::new(FnAction::new("faulty", || {
            panic!("disk vanished")
        })));

        assert_eq!(
            cleanable.release(),
            ReleaseOutcome::Failed("disk vanished".to_string())
        );
        assert!(cleanable.is_released());
        assert_eq!(cleanable.release(), ReleaseOutcome::AlreadyReleased);
    }

    #[test]
    fn test_disarm_skips_action() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cleanable = Cleanable::detached(counting(&runs));

        assert!(cleanable.disarm());
        assert!(!cleanable.disarm());
        assert_eq!(cleanable.release(), ReleaseOutcome::AlreadyReleased);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_action_dropped_after_running() {
        let action = counting(&Arc::new(AtomicUsize::new(0)));
        let weak = Arc::downgrade(&action);
        let cleanable = Cleanable::detached(action);

        assert!(weak.upgrade().is_some());
        cleanable.release();
        assert!(weak.upgrade().is_none());
    }
}
