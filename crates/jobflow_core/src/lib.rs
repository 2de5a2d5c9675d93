//! Jobflow Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! Job identities are derived from a canonical, byte-stable encoding of
//! the job's parameter set.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hash;
pub mod id;
pub mod job;
pub mod params;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use hash::{Hash, HashError};
pub use id::JobId;
pub use job::Job;
pub use params::ParameterSet;
