//! Shared utilities for the cleaners workspace
//!
//! Tracing setup for binaries and helpers for reporting caught panics.

pub mod panic;
pub mod tracing;

pub use panic::*;
