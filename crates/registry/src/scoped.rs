//! Scope-bound release

use crate::cleanable::{Cleanable, ReleaseOutcome};

/// Guard that releases a [`Cleanable`] when it goes out of scope.
///
/// This is the deterministic path: the action runs on the current thread at
/// the end of the scope, whether the scope exits normally or by unwinding.
#[derive(Debug)]
pub struct ScopedRelease {
    cleanable: Option<Cleanable>,
}

impl ScopedRelease {
    /// Create a new scoped release guard
    pub fn new(cleanable: Cleanable) -> Self {
        Self {
            cleanable: Some(cleanable),
        }
    }

    /// Release now instead of at the end of the scope
    pub fn release(mut self) -> ReleaseOutcome {
        match self.cleanable.take() {
            Some(cleanable) => cleanable.release(),
            None => ReleaseOutcome::AlreadyReleased,
        }
    }

    /// Give the handle back without releasing it
    pub fn cancel(mut self) -> Option<Cleanable> {
        self.cleanable.take()
    }
}

impl Drop for ScopedRelease {
    fn drop(&mut self) {
        if let Some(cleanable) = self.cleanable.take() {
            cleanable.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::FnAction;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counted() -> (Cleanable, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let cleanable = Cleanable::detached(Arc::new(FnAction::new("scoped", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        (cleanable, runs)
    }

    #[test]
    fn test_scoped_release() {
        let (cleanable, runs) = counted();

        {
            let _guard = ScopedRelease::new(cleanable.clone());
            assert!(!cleanable.is_released());
        }

        assert!(cleanable.is_released());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scoped_release_cancel() {
        let (cleanable, runs) = counted();

        {
            let guard = ScopedRelease::new(cleanable.clone());
            assert!(guard.cancel().is_some());
        }

        assert!(!cleanable.is_released());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scoped_release_on_unwind() {
        let (cleanable, runs) = counted();
        let handle = cleanable.clone();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = ScopedRelease::new(handle);
            panic!("scope failed");
        }));

        assert!(result.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_early_release_then_drop() {
        let (cleanable, runs) = counted();
        let guard = ScopedRelease::new(cleanable);

        assert_eq!(guard.release(), ReleaseOutcome::Released);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
