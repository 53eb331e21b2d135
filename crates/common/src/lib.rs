//! Shared error plumbing and filesystem helpers used across all myskills crates.

pub mod error;
pub mod fs;

pub use error::FromMessage;
