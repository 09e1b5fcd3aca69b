//! Stdout gets events at the level asked for on the command line, unless
//! `RUST_LOG` overrides it. File logging is optional: a daily rotated
//! `asip.log` written by a background worker, so the receive and dispatch
//! loops never wait on the disk.

use std::{
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use tracing::{debug, metadata::LevelFilter, Level};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Prefix of the rotated log files, the date is appended.
pub const LOG_FILE_PREFIX: &str = "asip.log";

// Dropping this flushes whatever the file worker still holds.
static FILE_WORKER: Mutex<Option<WorkerGuard>> = Mutex::new(None);

fn stdout_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from(level).into())
        .from_env_lossy()
}

/// Install the global subscriber.
///
/// Only the first call in a process has an effect, so tests may call this freely.
pub fn init(stdout_level: Level, file_logging: Option<(Level, PathBuf)>) {
    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(stdout_filter(stdout_level));

    let log_dir = file_logging.as_ref().map(|(_, dir)| dir.clone());

    let (file_layer, worker) = match file_logging {
        Some((level, dir)) => {
            let (writer, worker) =
                tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_PREFIX));

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true)
                .with_filter(LevelFilter::from(level));

            (Some(layer), Some(worker))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        debug!("Logging already initialized");
        return;
    }

    if let Some(worker) = worker {
        *FILE_WORKER.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);
    }

    debug!(?log_dir, "Logging initialized");
}

/// Flush file logs. Events after this only reach stdout.
pub fn shutdown() {
    let worker = FILE_WORKER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();

    if worker.is_some() {
        debug!("Flushing log files");
    }
}
