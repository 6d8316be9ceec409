//! Durable log storage
//!
//! This module resolves logical file names to handles in a named-file content
//! store and appends CSV records to them. The content store itself is a trait
//! so a host can plug in its own provider; [`FsContentStore`] backs it with a
//! plain directory tree.

mod content;
mod fs;
mod log;
#[cfg(test)]
pub(crate) mod test_utils;

pub use content::{ContentStore, DurableWrite, LogFileHandle, CSV_MIME_TYPE};
pub use fs::FsContentStore;
pub use log::{AppendOutcome, DurableLogStore};
