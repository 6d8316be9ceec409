//! Logger configuration
//!
//! Paths and file names for the primary log, its backups and the preferences
//! file. The defaults reproduce the layout hosts already have on disk, so most
//! callers only set `root_dir`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::LoggerError;

/// Default directory (under the root) holding the primary log
pub const DEFAULT_LOG_DIRECTORY: &str = "DiscreteLogger";

/// Default primary log file name
pub const DEFAULT_LOG_FILE_NAME: &str = "discreteLogs.csv";

/// Default backup sub-directory, beneath the log directory
pub const DEFAULT_BACKUP_SUBDIRECTORY: &str = "Backups";

/// Default preferences file name, directly under the root
pub const DEFAULT_PREFERENCES_FILE: &str = "LogPrefs.json";

/// Configuration for a [`crate::DiscreteLogger`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Root of the content store
    pub root_dir: PathBuf,
    /// Store-relative directory of the primary log
    pub log_directory: String,
    /// Primary log file name
    pub log_file_name: String,
    /// Backup directory name, beneath `log_directory`
    pub backup_subdirectory: String,
    /// Preferences file name, beneath `root_dir`
    pub preferences_file: String,
    /// Start with logging enabled (the host reports interactive state later)
    pub logging_enabled: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            log_directory: DEFAULT_LOG_DIRECTORY.to_string(),
            log_file_name: DEFAULT_LOG_FILE_NAME.to_string(),
            backup_subdirectory: DEFAULT_BACKUP_SUBDIRECTORY.to_string(),
            preferences_file: DEFAULT_PREFERENCES_FILE.to_string(),
            logging_enabled: true,
        }
    }
}

impl LoggerConfig {
    /// Default layout under `root_dir`
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    /// Store-relative directory holding backups
    pub fn backup_directory(&self) -> String {
        if self.log_directory.is_empty() {
            self.backup_subdirectory.clone()
        } else {
            format!("{}/{}", self.log_directory, self.backup_subdirectory)
        }
    }

    /// Absolute location of the preferences file
    pub fn preferences_path(&self) -> PathBuf {
        self.root_dir.join(&self.preferences_file)
    }

    /// Check that every name is usable as a single path component
    pub fn validate(&self) -> Result<(), LoggerError> {
        for (field, value) in [
            ("log_file_name", &self.log_file_name),
            ("backup_subdirectory", &self.backup_subdirectory),
            ("preferences_file", &self.preferences_file),
        ] {
            if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
                return Err(LoggerError::InvalidConfig(format!(
                    "{} must be a plain file or directory name, got {:?}",
                    field, value
                )));
            }
        }
        if self.log_directory.starts_with('/') || self.log_directory.split('/').any(|c| c == "..") {
            return Err(LoggerError::InvalidConfig(format!(
                "log_directory must be relative to the root, got {:?}",
                self.log_directory
            )));
        }
        Ok(())
    }

    /// Load configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, LoggerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, LoggerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
