//! Worker pools and their registry-tracked owner
//!
//! [`WorkerPool`] is a plain fixed-size pool. [`WorkerPoolResource`] owns one
//! and registers a [`PoolShutdown`] action, so the pool is shut down either
//! explicitly or after the owner is dropped, but never twice.

mod executor;
mod resource;

pub use executor::{TaskHandle, WorkerPool};
pub use resource::{PoolShutdown, ShutdownOutcome, WorkerPoolResource};
