//! Append-only CSV log on top of a content store
//!
//! Records are written one per line in the order given. The header goes in
//! front of the first record only when the target file is empty at the time
//! of the append, so a file never carries two headers.

use std::io::{self, BufWriter, Read, Write};

use super::content::{ContentStore, LogFileHandle, CSV_MIME_TYPE};
use crate::error::LoggerError;
use crate::types::TapEvent;

/// Result of an append that swallows its own failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// All records were written and synced
    Written(usize),
    /// The append failed and was logged; the records were not written
    Failed,
}

/// Find-or-create resolution and durable appends against a [`ContentStore`]
pub struct DurableLogStore<S> {
    store: S,
}

impl<S: ContentStore> DurableLogStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Underlying content store
    pub fn content_store(&self) -> &S {
        &self.store
    }

    /// Return the handle for `(name, directory)`, creating the file if absent.
    ///
    /// Lookup always precedes creation, so repeated calls in this process
    /// never create a second file for the same key.
    pub fn resolve(&self, name: &str, directory: &str) -> Result<LogFileHandle, LoggerError> {
        if let Some(handle) = self.store.find(name, directory)? {
            return Ok(handle);
        }
        let handle = self.store.create(name, directory, CSV_MIME_TYPE)?;
        tracing::debug!(file = %handle, "created log file");
        Ok(handle)
    }

    /// Look up `(name, directory)` without creating it
    pub fn find(&self, name: &str, directory: &str) -> Result<Option<LogFileHandle>, LoggerError> {
        self.store.find(name, directory)
    }

    /// Append records, logging and swallowing any failure
    pub fn append_records(
        &self,
        handle: &LogFileHandle,
        records: &[TapEvent],
        header_if_empty: &str,
    ) -> AppendOutcome {
        match self.write_records(handle, records, header_if_empty) {
            Ok(written) => AppendOutcome::Written(written),
            Err(err) => {
                tracing::error!(
                    file = %handle,
                    records = records.len(),
                    error = %err,
                    "failed to append records"
                );
                AppendOutcome::Failed
            }
        }
    }

    /// Append records in append-only mode, then flush and sync before returning
    pub fn write_records(
        &self,
        handle: &LogFileHandle,
        records: &[TapEvent],
        header_if_empty: &str,
    ) -> Result<usize, LoggerError> {
        let stream = self.store.open_for_append(handle)?;
        let needs_header = self.file_size(handle) == 0;

        let mut writer = BufWriter::new(stream);
        if needs_header {
            writeln!(writer, "{}", header_if_empty)?;
        }
        for record in records {
            writeln!(writer, "{}", record.to_csv_record())?;
        }

        let mut stream = writer.into_inner().map_err(|e| e.into_error())?;
        stream.sync()?;
        Ok(records.len())
    }

    /// Current byte length, or 0 when it cannot be determined
    pub fn file_size(&self, handle: &LogFileHandle) -> u64 {
        match self.store.size(handle) {
            Ok(size) => size,
            Err(err) => {
                tracing::debug!(file = %handle, error = %err, "treating unreadable file as empty");
                0
            }
        }
    }

    /// Replace `dest` with the full contents of `source`, synced
    pub fn copy(&self, source: &LogFileHandle, dest: &LogFileHandle) -> Result<u64, LoggerError> {
        let mut reader = self.store.open_for_read(source)?;
        let mut writer = self.store.open_for_write(dest)?;
        let copied = io::copy(&mut reader, &mut writer)?;
        writer.flush()?;
        writer.sync()?;
        Ok(copied)
    }

    /// Read a file's full contents as text
    pub fn read_to_string(&self, handle: &LogFileHandle) -> Result<String, LoggerError> {
        let mut contents = String::new();
        self.store.open_for_read(handle)?.read_to_string(&mut contents)?;
        Ok(contents)
    }
}
