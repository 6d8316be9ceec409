//! Daily backup rotation
//!
//! The first check of each calendar day copies the primary log to
//! `<log dir>/Backups/<yesterday>.csv`. The day is stamped into preferences as
//! soon as the copy is queued, so relaunching the host many times on the same
//! day never queues a second copy, and a copy that later fails is not retried.

use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use serde::Serialize;

use crate::config::LoggerConfig;
use crate::prefs::{BackupState, DATE_FORMAT};
use crate::store::{ContentStore, DurableLogStore, LogFileHandle};
use crate::worker::WorkerHandle;

/// What a backup check decided
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BackupOutcome {
    /// A check already ran today
    AlreadyBackedUp,
    /// A copy of the primary log was queued under this date
    Submitted { backup_date: NaiveDate },
    /// The primary log could not be resolved; the day is still marked done
    PrimaryUnavailable,
    /// The background worker has stopped; the day is still marked done
    WorkerUnavailable,
}

/// Day-gated backup of the primary log
pub struct BackupScheduler<S> {
    store: Arc<DurableLogStore<S>>,
    state: BackupState,
    worker: WorkerHandle,
    log_directory: String,
    log_file_name: String,
    backup_directory: String,
}

impl<S: ContentStore + 'static> BackupScheduler<S> {
    pub fn new(
        config: &LoggerConfig,
        store: Arc<DurableLogStore<S>>,
        state: BackupState,
        worker: WorkerHandle,
    ) -> Self {
        Self {
            store,
            state,
            worker,
            log_directory: config.log_directory.clone(),
            log_file_name: config.log_file_name.clone(),
            backup_directory: config.backup_directory(),
        }
    }

    pub fn state(&self) -> &BackupState {
        &self.state
    }

    /// Run the check against the local clock
    pub fn check_and_backup_now(&self) -> BackupOutcome {
        self.check_and_backup(Local::now())
    }

    /// Queue a backup of the primary log if none was queued on `now`'s calendar day
    pub fn check_and_backup<Tz: TimeZone>(&self, now: DateTime<Tz>) -> BackupOutcome {
        self.check_and_backup_on(now.date_naive())
    }

    /// Same as [`Self::check_and_backup`] for an explicit calendar day
    pub fn check_and_backup_on(&self, today: NaiveDate) -> BackupOutcome {
        let today_str = today.format(DATE_FORMAT).to_string();
        let last = match self.state.last_backup_raw() {
            Ok(last) => last,
            Err(err) => {
                tracing::warn!(error = %err, "could not read last backup date");
                String::new()
            }
        };
        if last == today_str {
            return BackupOutcome::AlreadyBackedUp;
        }

        let backup_date = today - Duration::days(1);
        let outcome = match self.store.resolve(&self.log_file_name, &self.log_directory) {
            Ok(source) => self.submit_copy(source, backup_date),
            Err(err) => {
                tracing::warn!(error = %err, "primary log unavailable, skipping backup");
                BackupOutcome::PrimaryUnavailable
            }
        };

        if let Err(err) = self.state.mark(today) {
            tracing::warn!(error = %err, date = %today_str, "could not record backup date");
        }
        outcome
    }

    fn submit_copy(&self, source: LogFileHandle, backup_date: NaiveDate) -> BackupOutcome {
        let store = self.store.clone();
        let backup_directory = self.backup_directory.clone();
        let submitted = self.worker.submit(move || {
            run_backup(&store, &source, &backup_directory, backup_date);
        });

        match submitted {
            Ok(()) => BackupOutcome::Submitted { backup_date },
            Err(err) => {
                tracing::warn!(error = %err, "backup task was not queued");
                BackupOutcome::WorkerUnavailable
            }
        }
    }
}

/// Copy `source` to `<backup_directory>/<backup_date>.csv`, logging failures
fn run_backup<S: ContentStore>(
    store: &DurableLogStore<S>,
    source: &LogFileHandle,
    backup_directory: &str,
    backup_date: NaiveDate,
) {
    let name = backup_file_name(backup_date);
    let dest = match store.resolve(&name, backup_directory) {
        Ok(dest) => dest,
        Err(err) => {
            tracing::error!(file = %name, error = %err, "could not create backup file");
            return;
        }
    };

    match store.copy(source, &dest) {
        Ok(bytes) => tracing::info!(file = %dest, bytes, "backed up log"),
        Err(err) => tracing::error!(file = %dest, error = %err, "backup copy failed"),
    }
}

/// Backup file name for a calendar day
pub fn backup_file_name(date: NaiveDate) -> String {
    format!("{}.csv", date.format(DATE_FORMAT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{JsonFilePreferences, PreferenceStore, LAST_BACKUP_DATE_KEY};
    use crate::store::FsContentStore;
    use crate::types::{TapEvent, CSV_HEADER};
    use crate::worker::BackgroundWorker;
    use chrono::Utc;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        worker: BackgroundWorker,
        store: Arc<DurableLogStore<FsContentStore>>,
        prefs: Arc<JsonFilePreferences>,
        scheduler: BackupScheduler<FsContentStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let config = LoggerConfig::with_root(dir.path());
        let worker = BackgroundWorker::start("backup-test").unwrap();
        let store = Arc::new(DurableLogStore::new(FsContentStore::new(dir.path())));
        let prefs = Arc::new(JsonFilePreferences::open(config.preferences_path()).unwrap());
        let scheduler = BackupScheduler::new(
            &config,
            store.clone(),
            BackupState::new(prefs.clone()),
            worker.handle(),
        );
        Fixture {
            dir,
            worker,
            store,
            prefs,
            scheduler,
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn append(fx: &Fixture, start: i64, label: &str) {
        let handle = fx.store.resolve("discreteLogs.csv", "DiscreteLogger").unwrap();
        let mut event = TapEvent::new(start, 10, 1.0);
        event.label = label.to_string();
        fx.store.append_records(&handle, &[event], CSV_HEADER);
    }

    fn backups(fx: &Fixture) -> Vec<String> {
        fx.store
            .content_store()
            .list("DiscreteLogger/Backups")
            .unwrap()
    }

    #[test]
    fn test_first_check_copies_log_under_yesterday() {
        let fx = fixture();
        append(&fx, 1000, "walk");

        let outcome = fx.scheduler.check_and_backup_on(day(2024, 1, 16));
        fx.worker.flush().unwrap();

        assert_eq!(
            outcome,
            BackupOutcome::Submitted {
                backup_date: day(2024, 1, 15)
            }
        );
        let backup = fx.dir.path().join("DiscreteLogger/Backups/2024-01-15.csv");
        let primary = fx.dir.path().join("DiscreteLogger/discreteLogs.csv");
        assert_eq!(fs::read(backup).unwrap(), fs::read(primary).unwrap());
        assert_eq!(
            fx.prefs.get(LAST_BACKUP_DATE_KEY).unwrap().as_deref(),
            Some("2024-01-16")
        );
    }

    #[test]
    fn test_second_check_same_day_is_noop() {
        let fx = fixture();
        append(&fx, 1000, "walk");

        fx.scheduler.check_and_backup_on(day(2024, 1, 16));
        fx.worker.flush().unwrap();
        append(&fx, 2000, "later");

        let outcome = fx.scheduler.check_and_backup_on(day(2024, 1, 16));
        fx.worker.flush().unwrap();

        assert_eq!(outcome, BackupOutcome::AlreadyBackedUp);
        assert_eq!(backups(&fx), vec!["2024-01-15.csv"]);
        let backup = fs::read_to_string(fx.dir.path().join("DiscreteLogger/Backups/2024-01-15.csv"))
            .unwrap();
        assert!(!backup.contains("later"));
    }

    #[test]
    fn test_one_backup_per_distinct_day() {
        let fx = fixture();
        append(&fx, 1000, "a");

        for date in [day(2024, 3, 1), day(2024, 3, 1), day(2024, 3, 2), day(2024, 3, 2)] {
            fx.scheduler.check_and_backup_on(date);
        }
        fx.worker.flush().unwrap();

        assert_eq!(backups(&fx), vec!["2024-02-29.csv", "2024-03-01.csv"]);
    }

    #[test]
    fn test_check_uses_calendar_day_of_now() {
        let fx = fixture();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap();

        let outcome = fx.scheduler.check_and_backup(now);
        fx.worker.flush().unwrap();

        assert_eq!(
            outcome,
            BackupOutcome::Submitted {
                backup_date: day(2023, 12, 31)
            }
        );
        assert_eq!(backups(&fx), vec!["2023-12-31.csv"]);
    }

    #[test]
    fn test_backup_of_fresh_log_creates_empty_copy() {
        let fx = fixture();

        fx.scheduler.check_and_backup_on(day(2024, 5, 10));
        fx.worker.flush().unwrap();

        let backup = fx.dir.path().join("DiscreteLogger/Backups/2024-05-09.csv");
        assert_eq!(fs::metadata(backup).unwrap().len(), 0);
    }

    #[test]
    fn test_day_is_marked_even_when_worker_stopped() {
        let fx = fixture();
        fx.worker.shutdown();

        let outcome = fx.scheduler.check_and_backup_on(day(2024, 1, 16));

        assert_eq!(outcome, BackupOutcome::WorkerUnavailable);
        assert_eq!(
            fx.scheduler.state().last_backup_raw().unwrap(),
            "2024-01-16"
        );
        assert!(backups(&fx).is_empty());
    }

    #[test]
    fn test_existing_backup_is_overwritten() {
        let fx = fixture();
        append(&fx, 1000, "fresh");
        fx.store
            .resolve("2024-01-15.csv", "DiscreteLogger/Backups")
            .unwrap();
        fs::write(
            fx.dir.path().join("DiscreteLogger/Backups/2024-01-15.csv"),
            "stale contents that are longer than the log itself\n".repeat(10),
        )
        .unwrap();

        fx.scheduler.check_and_backup_on(day(2024, 1, 16));
        fx.worker.flush().unwrap();

        let backup = fs::read_to_string(fx.dir.path().join("DiscreteLogger/Backups/2024-01-15.csv"))
            .unwrap();
        assert!(backup.contains("fresh"));
        assert!(!backup.contains("stale"));
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_string(&BackupOutcome::Submitted {
            backup_date: day(2024, 1, 15),
        })
        .unwrap();
        assert_eq!(json, r#"{"outcome":"submitted","backup_date":"2024-01-15"}"#);

        let json = serde_json::to_string(&BackupOutcome::AlreadyBackedUp).unwrap();
        assert_eq!(json, r#"{"outcome":"already_backed_up"}"#);
    }

    #[test]
    fn test_backup_file_name() {
        assert_eq!(backup_file_name(day(2024, 1, 5)), "2024-01-05.csv");
    }
}
