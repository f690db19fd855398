//! Persisted enable/disable state.
//!
//! The backing file holds one plugin name per line. Enabled names are written
//! as-is; disabled names carry a leading [`DISABLED_MARKER`].
//!
//! ```text
//! pluginNameA
//! pluginNameB
//! #pluginNameC
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PluginError, PluginResult};

/// Prefix marking a disabled plugin line.
pub const DISABLED_MARKER: char = '#';

#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Persisted status of a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Enabled,
    Disabled,
}

/// Enabled and disabled plugin names, each in insertion order and free of
/// duplicates. A name never appears in both lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginState {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

impl PluginState {
    /// Parses the backing file format. Never fails: blank lines are skipped and
    /// anything without the marker is an enabled name.
    pub fn parse(text: &str) -> Self {
        let mut state = Self::default();

        for line in text.split(['\n', '\r']) {
            if line.is_empty() {
                continue;
            }

            match line.strip_prefix(DISABLED_MARKER) {
                Some(name) => {
                    if !name.is_empty() && !state.disabled.iter().any(|n| n == name) {
                        state.disabled.push(name.to_string());
                    }
                }
                None => {
                    if !state.enabled.iter().any(|n| n == line) {
                        state.enabled.push(line.to_string());
                    }
                }
            }
        }

        // A hand-edited file can list the same name both ways; enabled wins.
        let PluginState { enabled, disabled } = &mut state;
        disabled.retain(|name| !enabled.contains(name));

        state
    }

    /// Serializes to the backing file format using the platform line ending.
    pub fn render(&self) -> String {
        let mut text = String::new();
        for name in &self.enabled {
            text.push_str(name);
            text.push_str(LINE_ENDING);
        }
        for name in &self.disabled {
            text.push(DISABLED_MARKER);
            text.push_str(name);
            text.push_str(LINE_ENDING);
        }
        text
    }

    pub fn status(&self, name: &str) -> Option<PluginStatus> {
        if self.enabled.iter().any(|n| n == name) {
            Some(PluginStatus::Enabled)
        } else if self.disabled.iter().any(|n| n == name) {
            Some(PluginStatus::Disabled)
        } else {
            None
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.status(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty()
    }
}

/// Reads and fully rewrites the plugin state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the current state. A missing file is an empty state.
    pub fn load(&self) -> PluginResult<PluginState> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(PluginState::parse(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "No plugin state file, starting empty");
                Ok(PluginState::default())
            }
            Err(e) => Err(PluginError::io(&self.path, e)),
        }
    }

    /// Replaces the file contents with `state`.
    pub fn save(&self, state: &PluginState) -> PluginResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| PluginError::io(parent, e))?;
            }
        }

        fs::write(&self.path, state.render()).map_err(|e| PluginError::io(&self.path, e))?;
        debug!(
            path = ?self.path,
            enabled = state.enabled.len(),
            disabled = state.disabled.len(),
            "Saved plugin state"
        );
        Ok(())
    }
}
