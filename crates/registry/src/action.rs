//! Detached cleanup actions

use std::fmt;

/// Release logic for one external resource.
///
/// Implementations carry only the handles needed to release the resource
/// (a counter, a pool handle, a path). They must never hold the object whose
/// reachability they are registered against: the registry keeps that owner
/// through a weak handle only, and an action that reaches the owner keeps it
/// alive for the rest of the process.
///
/// `run` may execute on the caller's thread or on the registry watcher, and
/// the [`Cleanable`](crate::Cleanable) gate guarantees it executes at most
/// once. It should not panic; if it does, the panic is caught and reported.
pub trait CleanupAction: Send + Sync + 'static {
    /// Release the resource
    fn run(&self);

    /// Label used in registry events
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Adapts a closure into a [`CleanupAction`]
pub struct FnAction<F> {
    label: String,
    f: F,
}

impl<F> FnAction<F>
where
    F: Fn() + Send + Sync + 'static,
{
    /// Wrap `f` under the given label
    pub fn new(label: impl Into<String>, f: F) -> Self {
        Self {
            label: label.into(),
            f,
        }
    }
}

impl<F> CleanupAction for FnAction<F>
where
    F: Fn() + Send + Sync + 'static,
{
    fn run(&self) {
        (self.f)()
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

impl<F> fmt::Debug for FnAction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
