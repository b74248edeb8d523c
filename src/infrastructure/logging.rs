use crate::infrastructure::error::InfraError;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE_NAME: &str = "focusflow.log";
pub const LOG_FILTER_ENV: &str = "FOCUSFLOW_LOG";
const DEFAULT_LOG_FILTER: &str = "info";

/// Install a JSON-lines subscriber appending to `logs_dir/focusflow.log`.
///
/// Returns `Ok(false)` when a global subscriber is already installed, which
/// is the normal case for a second workspace in the same process.
pub fn init_tracing(logs_dir: &Path) -> Result<bool, InfraError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(logs_dir))?;

    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .is_ok();
    Ok(installed)
}

pub fn log_file_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(LOG_FILE_NAME)
}
