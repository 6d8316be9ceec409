//! Named-file content store interface

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::LoggerError;

/// MIME type recorded for every log and backup file
pub const CSV_MIME_TYPE: &str = "text/csv";

/// Stable reference to one file in a content store.
///
/// Two handles for the same `(name, directory)` key compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogFileHandle {
    name: String,
    directory: String,
    mime_type: String,
    location: PathBuf,
}

impl LogFileHandle {
    pub fn new(
        name: impl Into<String>,
        directory: impl Into<String>,
        mime_type: impl Into<String>,
        location: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            mime_type: mime_type.into(),
            location: location.into(),
        }
    }

    /// Display name of the file
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store-relative directory holding the file
    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Store-specific location (a filesystem path for [`super::FsContentStore`])
    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl std::fmt::Display for LogFileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.directory.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.directory, self.name)
        }
    }
}

/// A writable stream whose contents can be forced to durable storage
pub trait DurableWrite: Write + Send {
    /// Block until everything written so far is durable
    fn sync(&mut self) -> io::Result<()>;
}

impl DurableWrite for File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// External store of named files, addressed by `(name, directory)`.
///
/// The logger issues every write from its single background worker, so
/// implementations need no locking of their own.
pub trait ContentStore: Send + Sync {
    /// Look up an existing file
    fn find(&self, name: &str, directory: &str) -> Result<Option<LogFileHandle>, LoggerError>;

    /// Create a new, empty file
    fn create(
        &self,
        name: &str,
        directory: &str,
        mime_type: &str,
    ) -> Result<LogFileHandle, LoggerError>;

    /// Open for appending; existing bytes are never touched
    fn open_for_append(&self, handle: &LogFileHandle) -> Result<Box<dyn DurableWrite>, LoggerError>;

    /// Open for writing from the start, discarding existing contents
    fn open_for_write(&self, handle: &LogFileHandle) -> Result<Box<dyn DurableWrite>, LoggerError>;

    /// Open for reading from the start
    fn open_for_read(&self, handle: &LogFileHandle) -> Result<Box<dyn Read + Send>, LoggerError>;

    /// Current length in bytes
    fn size(&self, handle: &LogFileHandle) -> Result<u64, LoggerError>;
}
