//! Two-phase owner state shared by the resource types

use cleaners_core::{Error, Result};
use cleaners_registry::{Cleanable, CleanupAction, CleanupRegistry};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// What an owner holds once `setup` has run
pub(crate) struct Armed<A> {
    pub(crate) action: Arc<A>,
    pub(crate) cleanable: Cleanable,
}

/// Empty until `setup`, armed afterwards; never re-armed
pub(crate) struct OwnerSlot<A> {
    cell: OnceCell<Armed<A>>,
}

impl<A: CleanupAction> OwnerSlot<A> {
    pub(crate) fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Fail fast if `setup` already ran
    pub(crate) fn ensure_empty(&self, operation: &str) -> Result<()> {
        if self.cell.get().is_some() {
            return Err(Error::usage(operation, "setup has already been called"));
        }
        Ok(())
    }

    /// Register `action` against `owner` and store the result
    pub(crate) fn arm<T>(
        &self,
        operation: &str,
        registry: &CleanupRegistry,
        owner: &Arc<T>,
        action: Arc<A>,
    ) -> Result<&Armed<A>>
    where
        T: Send + Sync + 'static,
    {
        self.ensure_empty(operation)?;
        let cleanable = registry.register(owner, Arc::clone(&action));

        // A concurrent setup won; drop our registration without running it
        if let Err(lost) = self.cell.set(Armed { action, cleanable }) {
            lost.cleanable.disarm();
            return Err(Error::usage(operation, "setup has already been called"));
        }
        self.armed(operation)
    }

    /// The armed state, or a usage error before `setup`
    pub(crate) fn armed(&self, operation: &str) -> Result<&Armed<A>> {
        self.cell
            .get()
            .ok_or_else(|| Error::usage(operation, "setup has not been called"))
    }

    pub(crate) fn get(&self) -> Option<&Armed<A>> {
        self.cell.get()
    }

    /// Forward the owner's drop to the registry watcher
    pub(crate) fn notify_dropped(&self, registry: &CleanupRegistry) {
        if let Some(armed) = self.cell.get() {
            if !armed.cleanable.is_released() {
                registry.notify_unreachable(armed.cleanable.id());
            }
        }
    }
}
