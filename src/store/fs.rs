//! Filesystem-backed content store
//!
//! Directories are relative to a root and may not escape it. Newly created
//! files are followed by a directory fsync so the entry itself survives a
//! power loss, not only the file contents.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use super::content::{ContentStore, DurableWrite, LogFileHandle};
use crate::error::LoggerError;

/// Content store rooted at a directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of the regular files in `directory`, sorted. A missing directory is empty.
    pub fn list(&self, directory: &str) -> Result<Vec<String>, LoggerError> {
        let dir = self.directory_path(directory)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn directory_path(&self, directory: &str) -> Result<PathBuf, LoggerError> {
        let relative = Path::new(directory);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(LoggerError::InvalidPath(format!(
                "directory must be relative to the store root: {}",
                directory
            )));
        }
        Ok(self.root.join(relative))
    }

    fn file_path(&self, name: &str, directory: &str) -> Result<PathBuf, LoggerError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(LoggerError::InvalidPath(format!("invalid file name: {:?}", name)));
        }
        Ok(self.directory_path(directory)?.join(name))
    }

    fn open_existing(&self, handle: &LogFileHandle, options: &OpenOptions) -> Result<File, LoggerError> {
        options.open(handle.location()).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                LoggerError::StreamUnavailable(handle.to_string())
            } else {
                LoggerError::Io(e)
            }
        })
    }
}

impl ContentStore for FsContentStore {
    fn find(&self, name: &str, directory: &str) -> Result<Option<LogFileHandle>, LoggerError> {
        let path = self.file_path(name, directory)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(LogFileHandle::new(
                name,
                directory,
                super::CSV_MIME_TYPE,
                path,
            ))),
            Ok(_) => Err(LoggerError::Resolution {
                name: name.to_string(),
                directory: directory.to_string(),
                reason: "path exists but is not a regular file".to_string(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn create(
        &self,
        name: &str,
        directory: &str,
        mime_type: &str,
    ) -> Result<LogFileHandle, LoggerError> {
        let path = self.file_path(name, directory)?;
        let parent = self.directory_path(directory)?;
        fs::create_dir_all(&parent)?;

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file.sync_all()?,
            // Someone else created it between our lookup and now; reuse it.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
        fsync_dir(&parent)?;

        Ok(LogFileHandle::new(name, directory, mime_type, path))
    }

    fn open_for_append(&self, handle: &LogFileHandle) -> Result<Box<dyn DurableWrite>, LoggerError> {
        let file = self.open_existing(handle, OpenOptions::new().append(true))?;
        Ok(Box::new(file))
    }

    fn open_for_write(&self, handle: &LogFileHandle) -> Result<Box<dyn DurableWrite>, LoggerError> {
        let file = self.open_existing(handle, OpenOptions::new().write(true).truncate(true))?;
        Ok(Box::new(file))
    }

    fn open_for_read(&self, handle: &LogFileHandle) -> Result<Box<dyn Read + Send>, LoggerError> {
        let file = self.open_existing(handle, OpenOptions::new().read(true))?;
        Ok(Box::new(file))
    }

    fn size(&self, handle: &LogFileHandle) -> Result<u64, LoggerError> {
        Ok(fs::metadata(handle.location())?.len())
    }
}

/// Sync a directory so newly created entries in it are durable
fn fsync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}
