use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "certbatch";

/// Where the application keeps its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub settings_file: PathBuf,
    pub store_file: PathBuf,
    pub session_file: PathBuf,
}

impl AppPaths {
    /// All files under one root directory. Used by tests and portable installs.
    pub fn under(root: &Path) -> Self {
        Self {
            settings_file: root.join("config.yaml"),
            store_file: root.join("records.json"),
            session_file: root.join("session.json"),
        }
    }
}

pub fn default_settings_path() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .context("Could not determine config directory")?
        .join(APP_NAME)
        .join("config.yaml"))
}

/// Compute platform paths for the store and session. Creates the data directory.
/// `store_override` comes from settings.
pub fn resolve_app_paths(
    settings_file: PathBuf,
    store_override: Option<&Path>,
) -> Result<AppPaths> {
    let data_dir = dirs::data_dir()
        .context("Could not determine data directory")?
        .join(APP_NAME);
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {data_dir:?}"))?;

    let store_file = match store_override {
        Some(path) => absolutize(path)?,
        None => data_dir.join("records.json"),
    };

    Ok(AppPaths {
        settings_file,
        store_file,
        session_file: data_dir.join("session.json"),
    })
}

/// Log file path. Uses `state_dir` on platforms that have it, falls back to `cache_dir`.
pub fn resolve_log_path() -> Result<PathBuf> {
    let base = dirs::state_dir()
        .or_else(dirs::cache_dir)
        .context("Could not determine state or cache directory")?;

    let log_dir = base.join(APP_NAME);
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {log_dir:?}"))?;

    Ok(log_dir.join("certbatch.log"))
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("Failed to get current directory")?
            .join(path))
    }
}
