//! Cooperative interrupt flag

use cleaners_core::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag asking blocked waiters to give up.
///
/// Waiters poll it and return [`Error::Interrupted`] when it is raised. They
/// never lower it, so the request stays visible to the caller that observes
/// the error; only [`Interrupt::clear`] resets it.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    /// Create a lowered flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every waiter sharing this flag to stop waiting
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Whether the flag is raised
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Lower the flag, returning whether it was raised
    pub fn clear(&self) -> bool {
        self.raised.swap(false, Ordering::SeqCst)
    }

    /// Fail with `Error::Interrupted` if the flag is raised
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.is_raised() {
            Err(Error::interrupted(operation))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_is_shared_and_sticky() {
        let interrupt = Interrupt::new();
        let other = interrupt.clone();

        assert!(interrupt.check("drain").is_ok());
        other.raise();

        assert!(interrupt.is_raised());
        assert!(interrupt.check("drain").unwrap_err().is_interrupted());
        // Observing does not lower it
        assert!(interrupt.is_raised());

        assert!(interrupt.clear());
        assert!(!other.is_raised());
        assert!(!interrupt.clear());
    }
}
