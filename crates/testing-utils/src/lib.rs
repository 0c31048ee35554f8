//! # Fleet Jobs Testing Utils
//!
//! Shared testing utilities for the job processing crates: data builders,
//! scripted job handlers and async wait helpers.
//!
//! ```toml
//! [dev-dependencies]
//! fleet-jobs-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
