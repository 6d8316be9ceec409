//! Durable key-value preferences
//!
//! Small string settings that must survive restarts, most importantly the
//! date of the last backup. [`JsonFilePreferences`] keeps them in a single JSON
//! object on disk and rewrites it atomically on every change.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::error::LoggerError;

/// Preference key holding the ISO date of the last backup check
pub const LAST_BACKUP_DATE_KEY: &str = "lastBackupDate";

/// Calendar date format used for preferences and backup file names
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Durable string key-value store
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, LoggerError>;
    fn set(&self, key: &str, value: &str) -> Result<(), LoggerError>;
}

/// Preferences persisted as a JSON object in one file
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFilePreferences {
    /// Open the preferences file, starting empty if it does not exist yet.
    ///
    /// A file that cannot be read or parsed is logged and treated as empty;
    /// the next `set` replaces it with a well-formed one.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LoggerError> {
        let path = path.into();
        let values = match load(&path) {
            Ok(values) => values,
            Err(err) => {
                tracing::warn!(
                    file = %path.display(),
                    error = %err,
                    "preferences unreadable, starting empty"
                );
                BTreeMap::new()
            }
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Open the preferences file, failing if it exists but is unreadable
    pub fn open_strict(path: impl Into<PathBuf>) -> Result<Self, LoggerError> {
        let path = path.into();
        let values = load(&path)?;
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> Option<&Path> {
        self.path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), LoggerError> {
        if let Some(parent) = self.parent_dir() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(values)?;
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.parent_dir() {
            File::open(parent)?.sync_all()?;
        }
        Ok(())
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> Result<Option<String>, LoggerError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), LoggerError> {
        let mut values = self.values.lock();
        let previous = values.insert(key.to_string(), value.to_string());
        if let Err(err) = self.persist(&values) {
            // Keep memory consistent with what is on disk
            match previous {
                Some(previous) => values.insert(key.to_string(), previous),
                None => values.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }
}

fn load(path: &Path) -> Result<BTreeMap<String, String>, LoggerError> {
    match fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(contents) => serde_json::from_str(&contents)
            .map_err(|e| LoggerError::Preferences(format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

/// The persisted "last backup day", injected into the backup scheduler
#[derive(Clone)]
pub struct BackupState {
    prefs: Arc<dyn PreferenceStore>,
}

impl BackupState {
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Self {
        Self { prefs }
    }

    /// Raw stored value; empty when never set
    pub fn last_backup_raw(&self) -> Result<String, LoggerError> {
        Ok(self.prefs.get(LAST_BACKUP_DATE_KEY)?.unwrap_or_default())
    }

    /// Stored date, if present and well-formed
    pub fn last_backup_date(&self) -> Result<Option<NaiveDate>, LoggerError> {
        let raw = self.last_backup_raw()?;
        if raw.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(&raw, DATE_FORMAT)
            .map(Some)
            .map_err(|e| LoggerError::InvalidDate(format!("{}: {}", raw, e)))
    }

    pub fn mark(&self, date: NaiveDate) -> Result<(), LoggerError> {
        self.prefs
            .set(LAST_BACKUP_DATE_KEY, &date.format(DATE_FORMAT).to_string())
    }
}
