//! Core errors and constants for the `cleaners` workspace.
//!
//! ## Key Components
//!
//! - **`errors`**: Defines the primary `Error` enum and `Result` type alias,
//!   centralizing the failure modes of registration, release and worker pools.
//! - **`constants`**: Shared defaults and environment variable names.

pub mod constants;
pub mod errors;

pub use self::{
    constants::*,
    errors::{Error, Result, ResultExt},
};
