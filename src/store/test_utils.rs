//! Content store with switchable faults, shared by the logger, log and backup tests.

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{ContentStore, DurableWrite, FsContentStore, LogFileHandle};
use crate::error::LoggerError;

/// [`FsContentStore`] wrapper whose operations can be made to fail one by one.
///
/// Every switch starts off, so a fresh store behaves like the wrapped one.
pub struct FaultyStore {
    inner: FsContentStore,
    pub fail_find: AtomicBool,
    pub fail_append: AtomicBool,
    pub fail_read: AtomicBool,
    pub fail_size: AtomicBool,
    pub appends: AtomicUsize,
}

impl FaultyStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            inner: FsContentStore::new(root.as_ref()),
            fail_find: AtomicBool::new(false),
            fail_append: AtomicBool::new(false),
            fail_read: AtomicBool::new(false),
            fail_size: AtomicBool::new(false),
            appends: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, switch: &AtomicBool, on: bool) {
        switch.store(on, Ordering::SeqCst);
    }
}

fn tripped(switch: &AtomicBool) -> bool {
    switch.load(Ordering::SeqCst)
}

/// Append stream that rejects every byte
pub struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DurableWrite for FailingWriter {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ContentStore for FaultyStore {
    fn find(&self, name: &str, directory: &str) -> Result<Option<LogFileHandle>, LoggerError> {
        if tripped(&self.fail_find) {
            return Err(LoggerError::Resolution {
                name: name.to_string(),
                directory: directory.to_string(),
                reason: "store offline".to_string(),
            });
        }
        self.inner.find(name, directory)
    }

    fn create(
        &self,
        name: &str,
        directory: &str,
        mime_type: &str,
    ) -> Result<LogFileHandle, LoggerError> {
        self.inner.create(name, directory, mime_type)
    }

    fn open_for_append(&self, handle: &LogFileHandle) -> Result<Box<dyn DurableWrite>, LoggerError> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        if tripped(&self.fail_append) {
            return Ok(Box::new(FailingWriter));
        }
        self.inner.open_for_append(handle)
    }

    fn open_for_write(&self, handle: &LogFileHandle) -> Result<Box<dyn DurableWrite>, LoggerError> {
        self.inner.open_for_write(handle)
    }

    fn open_for_read(&self, handle: &LogFileHandle) -> Result<Box<dyn Read + Send>, LoggerError> {
        if tripped(&self.fail_read) {
            return Err(LoggerError::StreamUnavailable(handle.to_string()));
        }
        self.inner.open_for_read(handle)
    }

    fn size(&self, handle: &LogFileHandle) -> Result<u64, LoggerError> {
        if tripped(&self.fail_size) {
            return Err(io::Error::new(io::ErrorKind::Other, "metadata unavailable").into());
        }
        self.inner.size(handle)
    }
}
