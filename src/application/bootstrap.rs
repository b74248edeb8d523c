use crate::infrastructure::config::{AppSettings, ensure_default_configs, load_app_settings};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::logging::init_tracing;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings: AppSettings,
}

/// Lay out `config/`, `state/` and `logs/`, write default config, open the
/// journal database and install logging.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("focusflow.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let settings = load_app_settings(&config_dir)?;
    initialize_database(&database_path)?;
    init_tracing(&logs_dir)?;

    info!(
        workspace_root = %workspace_root.display(),
        calendar_id = %settings.calendar_id,
        "workspace_bootstrapped"
    );
    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        database_path,
        settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn bootstrap_creates_layout_and_is_repeatable() {
        let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "focusflow-bootstrap-tests-{}-{}",
            std::process::id(),
            sequence
        ));

        let first = bootstrap_workspace(&root).expect("first bootstrap");
        assert!(first.config_dir.join("app.json").is_file());
        assert!(first.database_path.is_file());
        assert!(first.logs_dir.is_dir());
        assert_eq!(first.settings, AppSettings::default());

        let second = bootstrap_workspace(&root).expect("second bootstrap");
        assert_eq!(second.database_path, first.database_path);

        let _ = fs::remove_dir_all(&root);
    }
}
