//! Plugins shipped as standalone executables.
//!
//! A plugin named `foo` is the executable `spm-plugin-foo` (the prefix is
//! configurable), found in the configured plugin directories or on `PATH`.
//!
//! ```text
//! spm                                   spm-plugin-foo
//!  │                                         │
//!  ├── spm-plugin-foo --manifest             │
//!  │   stdout: {"name": "foo", "hooks": ["onBuild"]}
//!  │                                         │
//!  ├── spm-plugin-foo --hook onBuild         │
//!  │   stdin:  {"hook": "onBuild", "input": ...}
//!  │   stdout: <JSON result>                 │
//! ```
//!
//! Exit code 0 means success. Any other exit code is a hook failure and the
//! trimmed stderr becomes the error message. A `--manifest` run that does not
//! finish within the manifest timeout is a load failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::module::{PluginModule, SharedModule};
use super::resolver::ModuleResolver;
use crate::error::{PluginError, PluginResult};
use crate::settings::config::{PluginsConfig, DEFAULT_MANIFEST_TIMEOUT_MS};

const DEFAULT_MANIFEST_TIMEOUT: Duration = Duration::from_millis(DEFAULT_MANIFEST_TIMEOUT_MS);

/// Capabilities reported by `<executable> --manifest`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub hooks: Vec<String>,
}

/// Request written to the plugin's stdin for a hook call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookRequest {
    pub hook: String,
    pub input: Value,
}

/// Locates plugin executables and reads their manifests.
#[derive(Debug, Clone)]
pub struct ExecutableResolver {
    prefix: String,
    plugin_dirs: Vec<PathBuf>,
    search_path: bool,
    manifest_timeout: Duration,
}

impl ExecutableResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            plugin_dirs: Vec::new(),
            search_path: true,
            manifest_timeout: DEFAULT_MANIFEST_TIMEOUT,
        }
    }

    pub fn from_config(config: &PluginsConfig) -> Self {
        Self {
            prefix: config.executable_prefix.clone(),
            plugin_dirs: config.plugin_dirs.clone(),
            search_path: config.search_path,
            manifest_timeout: config.manifest_timeout(),
        }
    }

    pub fn add_plugin_dir(&mut self, dir: impl Into<PathBuf>) {
        self.plugin_dirs.push(dir.into());
    }

    pub fn search_path(mut self, enabled: bool) -> Self {
        self.search_path = enabled;
        self
    }

    pub fn manifest_timeout(mut self, limit: Duration) -> Self {
        self.manifest_timeout = limit;
        self
    }

    /// Finds the executable for `name`. Plugin directories take precedence
    /// over `PATH`; the first match wins.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let file_name = format!("{}{}", self.prefix, name);

        let mut dirs = self.plugin_dirs.clone();
        if self.search_path {
            if let Some(path_var) = std::env::var_os("PATH") {
                dirs.extend(std::env::split_paths(&path_var));
            }
        }

        dirs.iter()
            .flat_map(|dir| candidates(dir, &file_name))
            .find(|path| is_executable(path))
    }

    async fn read_manifest(&self, name: &str, path: &Path) -> PluginResult<PluginManifest> {
        let child = Command::new(path)
            .arg("--manifest")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PluginError::Resolve {
                name: name.to_string(),
                reason: format!("failed to execute {}: {e}", path.display()),
            })?;

        let output = timeout(self.manifest_timeout, child.wait_with_output())
            .await
            .map_err(|_| PluginError::Manifest {
                name: name.to_string(),
                reason: format!("--manifest timed out after {:?}", self.manifest_timeout),
            })?
            .map_err(|e| PluginError::io(path, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PluginError::Manifest {
                name: name.to_string(),
                reason: format!("--manifest exited with {}: {}", output.status, stderr.trim()),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| PluginError::Manifest {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ModuleResolver for ExecutableResolver {
    async fn resolve(&self, name: &str) -> PluginResult<SharedModule> {
        let path = self
            .locate(name)
            .ok_or_else(|| PluginError::NotFound(format!("{}{}", self.prefix, name)))?;

        debug!(plugin = %name, path = ?path, "Reading plugin manifest");
        let manifest = self.read_manifest(name, &path).await?;

        Ok(Arc::new(ExecutableModule {
            name: name.to_string(),
            path,
            manifest,
        }))
    }
}

/// A module backed by a plugin executable. Each hook call spawns a process.
#[derive(Debug, Clone)]
pub struct ExecutableModule {
    name: String,
    path: PathBuf,
    manifest: PluginManifest,
}

impl ExecutableModule {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }
}

#[async_trait]
impl PluginModule for ExecutableModule {
    fn hook_names(&self) -> Vec<String> {
        self.manifest.hooks.clone()
    }

    async fn call(&self, hook: &str, input: Value) -> Result<Value> {
        let request = serde_json::to_string(&HookRequest {
            hook: hook.to_string(),
            input,
        })
        .context("Failed to serialize hook request")?;

        debug!(plugin = %self.name, hook = %hook, path = ?self.path, "Running plugin hook");

        // kill_on_drop so a timed-out call does not leave the process behind
        let mut child = Command::new(&self.path)
            .args(["--hook", hook])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn plugin: {}", self.path.display()))?;

        // Output is drained while the request is written; a plugin that echoes
        // as it reads would otherwise fill both pipes and stall.
        let stdin = child.stdin.take();
        let write = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            stdin.write_all(request.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.shutdown().await
        };

        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output.context("Failed to wait for plugin process")?;

        // The plugin may exit without reading its input.
        if let Err(e) = written {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                return Err(e).context("Failed to write to plugin stdin");
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("exited with {}: {}", output.status, stderr.trim());
        }

        Ok(parse_output(&output.stdout))
    }
}

/// Empty output is `null`; anything that is not JSON is returned as a string.
fn parse_output(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn candidates(dir: &Path, file_name: &str) -> Vec<PathBuf> {
    let mut paths = vec![dir.join(file_name)];
    if cfg!(windows) {
        for ext in ["exe", "bat", "cmd"] {
            paths.push(dir.join(format!("{file_name}.{ext}")));
        }
    }
    paths
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = path.metadata() {
            return meta.is_file() && meta.permissions().mode() & 0o111 != 0;
        }
        false
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}
