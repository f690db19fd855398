use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin {0} could not be found")]
    NotFound(String),

    #[error("can't load plugin {name}: {reason}")]
    Resolve { name: String, reason: String },

    #[error("invalid manifest for plugin {name}: {reason}")]
    Manifest { name: String, reason: String },

    #[error("hook {hook} of plugin {plugin} failed: {reason}")]
    Hook {
        plugin: String,
        hook: String,
        reason: String,
    },

    #[error("hook {hook} of plugin {plugin} timed out after {after:?}")]
    Timeout {
        plugin: String,
        hook: String,
        after: Duration,
    },
}

impl PluginError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type PluginResult<T> = Result<T, PluginError>;
