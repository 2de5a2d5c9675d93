//! Jobflow Storage
//!
//! The store interface the scheduler consumes (`get`, `mutate_document`,
//! `iterate_jobs`) plus two implementations: an in-memory store and a
//! directory-backed workspace.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod filter;
pub mod memory;
pub mod store;
pub mod workspace;

pub use filter::JobFilter;
pub use memory::MemoryStore;
pub use store::{JobStore, StoreError, StoreResult};
pub use workspace::{DirectoryStore, DOCUMENT_FILE, STATEPOINT_FILE};
