//! Cleanup registry with explicit and background release
//!
//! An owner object registers a detached [`CleanupAction`] and receives a
//! [`Cleanable`]. The action runs exactly once: either when someone calls
//! [`Cleanable::release`], or when the registry's watcher thread notices that
//! every strong reference to the owner is gone.
//!
//! ```text
//!  owner (Arc<T>) ──register──► CleanupRegistry ──► Cleanable ──► CleanupAction
//!        │                          │   ▲                ▲
//!        │ drop / notify            │   │ Weak<T>        │ release()
//!        ▼                          ▼   │                │
//!   WatchEvent::Unreachable ──► watcher thread ─── fire(Background)
//! ```
//!
//! The registry holds the owner only through a `Weak`, and the action must not
//! hold the owner at all; otherwise the owner can never become unreachable.

pub mod action;
pub mod cleanable;
pub mod registry;
pub mod scoped;
mod watcher;

pub use action::{CleanupAction, FnAction};
pub use cleanable::{Cleanable, CleanableState, RegistrationId, ReleaseOutcome, ReleaseTrigger};
pub use registry::{CleanupRegistry, FailedCleanup, RegistryStats};
pub use scoped::ScopedRelease;
