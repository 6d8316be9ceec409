//! The logger facade
//!
//! [`DiscreteLogger`] is what a host talks to. Contact signals arrive on the
//! foreground and are correlated in memory; completed events wait in the
//! pending buffer until the user submits a label, at which point the buffer
//! is drained and appended to the primary log on the background worker.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::backup::{BackupOutcome, BackupScheduler};
use crate::buffer::PendingEventBuffer;
use crate::config::LoggerConfig;
use crate::correlator::{AmbientScalar, EventCorrelator};
use crate::error::LoggerError;
use crate::prefs::{BackupState, JsonFilePreferences, PreferenceStore};
use crate::signal::Signal;
use crate::store::{AppendOutcome, ContentStore, DurableLogStore, FsContentStore};
use crate::types::{ContactId, CSV_HEADER};
use crate::worker::BackgroundWorker;

const WORKER_THREAD_NAME: &str = "discrete-logger-io";

/// Open contacts and the switch that gates them, changed together under one lock
struct ContactGate {
    logging_enabled: bool,
    correlator: EventCorrelator,
}

/// Discrete contact logger
pub struct DiscreteLogger<S: ContentStore + 'static> {
    instance_id: Uuid,
    config: LoggerConfig,
    ambient: Arc<AmbientScalar>,
    contacts: Mutex<ContactGate>,
    pending: Arc<PendingEventBuffer>,
    store: Arc<DurableLogStore<S>>,
    backups: BackupScheduler<S>,
    worker: BackgroundWorker,
}

impl DiscreteLogger<FsContentStore> {
    /// Open a logger on the filesystem layout described by `config`
    pub fn open(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;
        let store = FsContentStore::new(&config.root_dir);
        let prefs = Arc::new(JsonFilePreferences::open(config.preferences_path())?);
        Self::new(config, store, prefs)
    }

    /// Open a logger with the default layout under `root_dir`
    pub fn open_root(root_dir: impl Into<std::path::PathBuf>) -> Result<Self, LoggerError> {
        Self::open(LoggerConfig::with_root(root_dir))
    }
}

impl<S: ContentStore + 'static> DiscreteLogger<S> {
    /// Build a logger over an arbitrary content store and preference store
    pub fn new(
        config: LoggerConfig,
        store: S,
        prefs: Arc<dyn PreferenceStore>,
    ) -> Result<Self, LoggerError> {
        let instance_id = Uuid::new_v4();
        let worker = BackgroundWorker::start(WORKER_THREAD_NAME)?;
        let store = Arc::new(DurableLogStore::new(store));
        let ambient = Arc::new(AmbientScalar::default());
        let backups = BackupScheduler::new(
            &config,
            store.clone(),
            BackupState::new(prefs),
            worker.handle(),
        );

        tracing::debug!(
            logger = %instance_id,
            log_directory = %config.log_directory,
            log_file = %config.log_file_name,
            "logger started"
        );

        Ok(Self {
            instance_id,
            contacts: Mutex::new(ContactGate {
                logging_enabled: config.logging_enabled,
                correlator: EventCorrelator::new(ambient.clone()),
            }),
            ambient,
            pending: Arc::new(PendingEventBuffer::new()),
            store,
            backups,
            worker,
            config,
        })
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn store(&self) -> &DurableLogStore<S> {
        &self.store
    }

    pub fn backups(&self) -> &BackupScheduler<S> {
        &self.backups
    }

    // ========================================================================
    // Interactive state
    // ========================================================================

    pub fn is_logging_enabled(&self) -> bool {
        self.contacts.lock().logging_enabled
    }

    pub fn set_logging_enabled(&self, enabled: bool) {
        self.contacts.lock().logging_enabled = enabled;
    }

    /// Screen became interactive: resume logging
    pub fn interactive_on(&self) {
        self.set_logging_enabled(true);
        tracing::debug!(logger = %self.instance_id, "logging resumed");
    }

    /// Screen went dark: stop logging and drop any contact still open.
    ///
    /// Both happen under the contact lock, so no contact can begin between
    /// the switch turning off and the clear.
    pub fn interactive_off(&self) {
        let dropped = {
            let mut contacts = self.contacts.lock();
            contacts.logging_enabled = false;
            let dropped = contacts.correlator.open_count();
            contacts.correlator.clear();
            dropped
        };
        tracing::debug!(logger = %self.instance_id, dropped, "logging paused");
    }

    /// Run `f` on the correlator if logging is enabled, holding the lock for both
    fn while_logging(&self, f: impl FnOnce(&mut EventCorrelator)) -> bool {
        let mut contacts = self.contacts.lock();
        if !contacts.logging_enabled {
            return false;
        }
        f(&mut contacts.correlator);
        true
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Publish a new ambient reading. Accepted regardless of logging state.
    pub fn on_ambient_sample(&self, value: f32) {
        self.ambient.store(value);
    }

    pub fn on_begin(&self, contact_id: ContactId, timestamp: i64) -> bool {
        self.while_logging(|correlator| correlator.on_begin(contact_id, timestamp))
    }

    pub fn on_sample(&self, contact_id: ContactId, value: f32) -> bool {
        self.while_logging(|correlator| correlator.on_sample(contact_id, value))
    }

    pub fn on_move(&self) -> bool {
        self.while_logging(|correlator| correlator.on_move())
    }

    /// End a contact; a completed event goes to the pending buffer
    pub fn on_end(&self, contact_id: ContactId, timestamp: i64) -> bool {
        self.while_logging(|correlator| {
            if let Some(event) = correlator.on_end(contact_id, timestamp) {
                self.pending.push(event);
            }
        })
    }

    pub fn on_cancel(&self, contact_id: ContactId) -> bool {
        self.while_logging(|correlator| correlator.on_cancel(contact_id))
    }

    /// Route a decoded wire signal.
    ///
    /// Returns whether the signal was accepted.
    pub fn dispatch(&self, signal: Signal) -> Result<bool, LoggerError> {
        let accepted = match signal {
            Signal::Ambient { value } => {
                self.on_ambient_sample(value);
                true
            }
            Signal::Begin { id, ts } => self.on_begin(id, ts),
            Signal::Sample { id, value } => self.on_sample(id, value),
            Signal::Move => self.on_move(),
            Signal::End { id, ts } => self.on_end(id, ts),
            Signal::Cancel { id } => self.on_cancel(id),
            Signal::Interactive { on } => {
                if on {
                    self.interactive_on();
                } else {
                    self.interactive_off();
                }
                true
            }
            Signal::Label { text } => {
                if text.trim().is_empty() {
                    false
                } else {
                    self.submit_label(&text)?;
                    true
                }
            }
        };
        Ok(accepted)
    }

    // ========================================================================
    // Labels and persistence
    // ========================================================================

    /// Label every pending event that has no label yet, then queue the
    /// pending buffer to be written to the primary log.
    ///
    /// Text is trimmed first; blank text does nothing. Returns how many
    /// events received the label.
    pub fn submit_label(&self, text: &str) -> Result<usize, LoggerError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(0);
        }

        let labeled = self.pending.label_unlabeled(text);
        tracing::debug!(logger = %self.instance_id, labeled, "label submitted");

        let pending = self.pending.clone();
        let store = self.store.clone();
        let log_file_name = self.config.log_file_name.clone();
        let log_directory = self.config.log_directory.clone();
        let instance_id = self.instance_id;
        let submitted = self.worker.submit(move || {
            drain_to_log(&pending, &store, &log_file_name, &log_directory, instance_id);
        });
        if let Err(err) = submitted {
            tracing::warn!(logger = %self.instance_id, error = %err, "could not queue log write");
            return Err(err);
        }
        Ok(labeled)
    }

    /// Events completed but not yet written
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Contacts begun but not yet ended or cancelled
    pub fn open_contacts(&self) -> usize {
        self.contacts.lock().correlator.open_count()
    }

    // ========================================================================
    // Backups and lifecycle
    // ========================================================================

    pub fn check_and_backup<Tz: TimeZone>(&self, now: DateTime<Tz>) -> BackupOutcome {
        self.backups.check_and_backup(now)
    }

    pub fn check_and_backup_on(&self, today: NaiveDate) -> BackupOutcome {
        self.backups.check_and_backup_on(today)
    }

    pub fn check_and_backup_now(&self) -> BackupOutcome {
        self.backups.check_and_backup_now()
    }

    /// Wait for every queued write and backup to finish
    pub fn flush(&self) -> Result<(), LoggerError> {
        self.worker.flush()
    }

    /// Finish queued work and stop the worker; later submissions fail
    pub fn shutdown(&self) {
        self.worker.shutdown();
        tracing::debug!(logger = %self.instance_id, "logger stopped");
    }
}

/// Background half of a label submission
fn drain_to_log<S: ContentStore>(
    pending: &PendingEventBuffer,
    store: &DurableLogStore<S>,
    log_file_name: &str,
    log_directory: &str,
    instance_id: Uuid,
) {
    let events = pending.drain_all();

    let handle = match store.resolve(log_file_name, log_directory) {
        Ok(handle) => handle,
        Err(err) => {
            tracing::error!(
                logger = %instance_id,
                dropped = events.len(),
                error = %err,
                "primary log unavailable, pending events lost"
            );
            return;
        }
    };

    match store.append_records(&handle, &events, CSV_HEADER) {
        AppendOutcome::Written(count) => {
            tracing::debug!(logger = %instance_id, file = %handle, count, "events written");
        }
        AppendOutcome::Failed => {
            tracing::error!(
                logger = %instance_id,
                dropped = events.len(),
                "pending events lost"
            );
        }
    }
}
