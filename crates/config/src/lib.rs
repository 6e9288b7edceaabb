//! Configuration for the cleanup registry and worker pool resources
//!
//! Settings are resolved with the precedence default < file < environment.

pub mod config;
pub mod loader;

pub use config::*;
pub use loader::*;
