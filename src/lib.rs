//! Discrete Logger - background logger for discrete pointer contacts
//!
//! Each contact (begin → samples → end) becomes one record holding its start
//! time, duration and the peak ambient sensor reading seen while it was open.
//! Records wait in memory until the user submits a label, then are appended to
//! a durable CSV log by a single background worker. Once per calendar day the
//! log is copied to a dated backup file.
//!
//! ## Modules
//!
//! - **Correlation**: `correlator` pairs contact signals; `buffer` holds completed events
//! - **Persistence**: `store` appends to the log; `backup` rotates daily copies
//! - **Host integration**: `logger` is the facade; `ffi` and `signal` expose it to other runtimes

pub mod backup;
pub mod buffer;
pub mod config;
pub mod correlator;
pub mod error;
pub mod logger;
pub mod prefs;
pub mod signal;
pub mod store;
pub mod types;
pub mod worker;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use backup::{BackupOutcome, BackupScheduler};
pub use buffer::PendingEventBuffer;
pub use config::LoggerConfig;
pub use correlator::{event_time_to_wall_clock, AmbientScalar, EventCorrelator};
pub use error::LoggerError;
pub use logger::DiscreteLogger;
pub use signal::Signal;
pub use store::{AppendOutcome, ContentStore, DurableLogStore, FsContentStore, LogFileHandle};
pub use types::{ContactId, TapEvent, CSV_HEADER};

/// Library version, reported by the CLI and the C ABI
pub const LOGGER_VERSION: &str = env!("CARGO_PKG_VERSION");
