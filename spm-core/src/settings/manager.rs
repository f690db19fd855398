use crate::settings::config::{spm_home, Settings};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Loads and persists `settings.toml`. The settings file is created with
/// defaults on first use so users have something to edit.
#[derive(Debug, Clone)]
pub struct SettingsManager {
    settings_path: PathBuf,
    settings: Settings,
}

impl SettingsManager {
    /// Create a new settings manager with default settings location
    pub fn new() -> Result<Self> {
        Self::from_path(Self::default_settings_path())
    }

    /// Create a settings manager from a specific path
    pub fn from_path(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            write_settings(&path, &Settings::default())?;
        }

        let settings = Self::load_from_file_with_backup(&path)?;

        Ok(Self {
            settings_path: path,
            settings,
        })
    }

    /// Get the default settings path (~/.spm/settings.toml)
    pub fn default_settings_path() -> PathBuf {
        spm_home().join("settings.toml")
    }

    /// Load settings from a TOML file with backup on parse failure
    fn load_from_file_with_backup(path: &Path) -> Result<Settings> {
        if !path.exists() {
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {path:?}"))?;

        match toml::from_str(&contents) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                let backup_path = path.with_extension("toml.backup");
                warn!(error = %e, backup = ?backup_path, "Settings file is corrupt, restoring defaults");
                fs::rename(path, &backup_path).with_context(|| {
                    format!("Failed to backup corrupted settings to {backup_path:?}")
                })?;

                let default_settings = Settings::default();
                write_settings(path, &default_settings)?;
                Ok(default_settings)
            }
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get the settings file path
    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}

fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {parent:?}"))?;
    }

    let contents = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(path, contents).with_context(|| format!("Failed to write settings to {path:?}"))
}
