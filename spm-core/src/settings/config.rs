use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root of per-user spm data (`~/.spm`).
pub fn spm_home() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".spm"))
        .unwrap_or_else(|| PathBuf::from(".spm"))
}

/// Upper bound for a plugin's `--manifest` run unless configured otherwise.
pub const DEFAULT_MANIFEST_TIMEOUT_MS: u64 = 10_000;

fn default_manifest_timeout_ms() -> u64 {
    DEFAULT_MANIFEST_TIMEOUT_MS
}

fn default_state_file() -> PathBuf {
    spm_home().join("plugins")
}

fn default_plugin_dirs() -> Vec<PathBuf> {
    vec![spm_home().join("plugins.d")]
}

fn default_executable_prefix() -> String {
    "spm-plugin-".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginsConfig {
    /// File holding the enabled/disabled plugin list
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Directories searched for plugin executables before PATH
    #[serde(default = "default_plugin_dirs")]
    pub plugin_dirs: Vec<PathBuf>,

    /// Executable name prefix; plugin `foo` is `<prefix>foo`
    #[serde(default = "default_executable_prefix")]
    pub executable_prefix: String,

    /// Whether PATH is searched for plugin executables
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Resolve plugins at most once per process. When false every access
    /// re-reads the plugin list and resolves again.
    #[serde(default = "default_true")]
    pub load_once: bool,

    /// Upper bound for a single hook call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_timeout_ms: Option<u64>,

    /// Upper bound for reading a plugin's manifest; exceeding it is a load failure
    #[serde(default = "default_manifest_timeout_ms")]
    pub manifest_timeout_ms: u64,
}

impl PluginsConfig {
    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout_ms.map(Duration::from_millis)
    }

    pub fn manifest_timeout(&self) -> Duration {
        Duration::from_millis(self.manifest_timeout_ms)
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            plugin_dirs: default_plugin_dirs(),
            executable_prefix: default_executable_prefix(),
            search_path: true,
            load_once: true,
            hook_timeout_ms: None,
            manifest_timeout_ms: DEFAULT_MANIFEST_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    /// Also write logs to ~/.spm/trace/spm.log
    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default)]
    pub plugins: PluginsConfig,
}
