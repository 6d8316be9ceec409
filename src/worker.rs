//! Single-threaded background worker
//!
//! All durable-store work (appends, backup copies) runs here, one task at a
//! time in submission order. Submission never blocks. Shutdown stops intake
//! and lets whatever is already queued run before the thread exits.

use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::LoggerError;

type Task = Box<dyn FnOnce() + Send + 'static>;

enum WorkerCommand {
    Run(Task),
    Barrier(Sender<()>),
    Shutdown,
}

/// Cloneable submission side of a [`BackgroundWorker`]
#[derive(Clone)]
pub struct WorkerHandle {
    tx: Sender<WorkerCommand>,
}

impl WorkerHandle {
    /// Queue a task behind everything submitted before it
    pub fn submit<F>(&self, task: F) -> Result<(), LoggerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(WorkerCommand::Run(Box::new(task)))
            .map_err(|_| LoggerError::WorkerStopped)
    }

    /// Block until every task submitted before this call has finished
    pub fn flush(&self) -> Result<(), LoggerError> {
        let (done_tx, done_rx) = channel::bounded(1);
        self.tx
            .send(WorkerCommand::Barrier(done_tx))
            .map_err(|_| LoggerError::WorkerStopped)?;
        done_rx.recv().map_err(|_| LoggerError::WorkerStopped)
    }
}

/// Owns the worker thread
pub struct BackgroundWorker {
    handle: WorkerHandle,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundWorker {
    /// Spawn the worker thread
    pub fn start(name: &str) -> Result<Self, LoggerError> {
        let (tx, rx) = channel::unbounded();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker_loop(rx))?;
        Ok(Self {
            handle: WorkerHandle { tx },
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    pub fn submit<F>(&self, task: F) -> Result<(), LoggerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.submit(task)
    }

    pub fn flush(&self) -> Result<(), LoggerError> {
        self.handle.flush()
    }

    /// Stop accepting tasks, run the ones already queued, and join the thread.
    ///
    /// Calling this more than once is harmless.
    pub fn shutdown(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        let _ = self.handle.tx.send(WorkerCommand::Shutdown);
        if thread.join().is_err() {
            tracing::error!("background worker panicked");
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker_loop(rx: Receiver<WorkerCommand>) {
    while let Ok(command) = rx.recv() {
        match command {
            WorkerCommand::Run(task) => task(),
            WorkerCommand::Barrier(done) => {
                let _ = done.send(());
            }
            WorkerCommand::Shutdown => break,
        }
    }
    tracing::debug!("background worker stopped");
}
