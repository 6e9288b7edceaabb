//! Resource owners built on the cleanup registry
//!
//! Both owners follow the same two-phase lifecycle: construct with a registry
//! handle, then `setup` through an `Arc` so the registry can observe the
//! owner's reachability. Their accessors read the state held by the detached
//! cleanup action, which is the only place the post-release state lives.

pub mod interrupt;
pub mod managed;
mod owner;
pub mod pool;

pub use interrupt::Interrupt;
pub use managed::{CountedState, ManagedResource};
pub use pool::{PoolShutdown, ShutdownOutcome, TaskHandle, WorkerPool, WorkerPoolResource};
