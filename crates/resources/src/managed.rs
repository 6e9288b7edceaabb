//! A named counted resource released exactly once

use crate::owner::OwnerSlot;
use cleaners_core::{Error, Result};
use cleaners_registry::{Cleanable, CleanupAction, CleanupRegistry, ReleaseOutcome};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Detached state of a [`ManagedResource`]; doubles as its cleanup action.
///
/// Holds the name and the outstanding unit count, nothing else.
#[derive(Debug)]
pub struct CountedState {
    name: String,
    count: AtomicU64,
    released: OnceCell<u64>,
}

impl CountedState {
    fn new(name: String, count: u64) -> Self {
        Self {
            name,
            count: AtomicU64::new(count),
            released: OnceCell::new(),
        }
    }

    /// Resource name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Units still held; zero once released
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Units that the release zeroed, once it has run
    pub fn released_units(&self) -> Option<u64> {
        self.released.get().copied()
    }
}

impl CleanupAction for CountedState {
    fn run(&self) {
        let units = self.count.swap(0, Ordering::SeqCst);
        let _ = self.released.set(units);
        tracing::info!(
            resource = %self.name,
            units,
            "{} had {} units and now has been released",
            self.name,
            units
        );
    }

    fn describe(&self) -> String {
        format!("release of {}", self.name)
    }
}

/// Owner of a named unit count.
///
/// ```no_run
/// use cleaners_registry::CleanupRegistry;
/// use cleaners_resources::ManagedResource;
/// use std::sync::Arc;
///
/// # fn main() -> cleaners_core::Result<()> {
/// let registry = CleanupRegistry::new();
/// let garage = Arc::new(ManagedResource::new(&registry));
/// garage.setup("Garage", 12)?;
/// garage.release()?;
/// assert_eq!(garage.count()?, 0);
/// # Ok(())
/// # }
/// ```
pub struct ManagedResource {
    registry: CleanupRegistry,
    slot: OwnerSlot<CountedState>,
}

impl ManagedResource {
    /// Construct an owner that still needs [`setup`](ManagedResource::setup)
    pub fn new(registry: &CleanupRegistry) -> Self {
        Self {
            registry: registry.clone(),
            slot: OwnerSlot::new(),
        }
    }

    /// Create the detached state and register it. Must be called exactly once.
    pub fn setup(self: &Arc<Self>, name: impl Into<String>, count: u64) -> Result<()> {
        const OPERATION: &str = "ManagedResource::setup";
        self.slot.ensure_empty(OPERATION)?;

        let state = Arc::new(CountedState::new(name.into(), count));
        self.slot.arm(OPERATION, &self.registry, self, state)?;
        Ok(())
    }

    /// Resource name
    pub fn name(&self) -> Result<&str> {
        Ok(self.slot.armed("ManagedResource::name")?.action.name())
    }

    /// Units still held; reads zero after release on either path
    pub fn count(&self) -> Result<u64> {
        Ok(self.slot.armed("ManagedResource::count")?.action.count())
    }

    /// Units the release zeroed, if it has run
    pub fn released_units(&self) -> Result<Option<u64>> {
        Ok(self
            .slot
            .armed("ManagedResource::released_units")?
            .action
            .released_units())
    }

    /// Release now. Later calls, and the background path, become no-ops.
    pub fn release(&self) -> Result<ReleaseOutcome> {
        let armed = self.slot.armed("ManagedResource::release")?;
        match armed.cleanable.release() {
            ReleaseOutcome::Failed(message) => {
                Err(Error::task_failure(armed.cleanable.label(), message))
            }
            outcome => Ok(outcome),
        }
    }

    /// Whether the release has run
    pub fn is_released(&self) -> bool {
        self.slot
            .get()
            .is_some_and(|armed| armed.cleanable.is_released())
    }

    /// The registered release handle
    pub fn cleanable(&self) -> Result<Cleanable> {
        Ok(self.slot.armed("ManagedResource::cleanable")?.cleanable.clone())
    }

    /// The detached state, which outlives this owner
    pub fn state(&self) -> Result<Arc<CountedState>> {
        Ok(Arc::clone(&self.slot.armed("ManagedResource::state")?.action))
    }
}

impl Drop for ManagedResource {
    fn drop(&mut self) {
        self.slot.notify_dropped(&self.registry);
    }
}

impl std::fmt::Debug for ManagedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("ManagedResource");
        match self.slot.get() {
            Some(armed) => debug
                .field("name", &armed.action.name())
                .field("count", &armed.action.count())
                .field("cleanable", &armed.cleanable),
            None => debug.field("state", &"not set up"),
        };
        debug.finish()
    }
}
