//! Resolves enabled plugins into modules and caches the result.
//!
//! With [`CachePolicy::LoadOnce`] (the default) the first call to
//! [`ModuleLoader::ensure_loaded`] reads the registry and resolves every
//! enabled plugin; later calls return that same collection for the rest of the
//! process, even if plugins are added, removed or toggled in between. Callers
//! that need to observe such changes use [`CachePolicy::Reload`] or
//! [`ModuleLoader::reset`].

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::module::LoadedModule;
use super::registry::Registry;
use super::resolver::ModuleResolver;
use crate::error::PluginResult;

/// Command suggested to users for removing a plugin that fails to load.
pub const DEFAULT_REMOVE_COMMAND: &str = "spm plugin remove";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Resolve once, keep the result for the lifetime of the loader.
    #[default]
    LoadOnce,
    /// Resolve again on every access.
    Reload,
}

impl CachePolicy {
    pub fn from_load_once(load_once: bool) -> Self {
        if load_once {
            CachePolicy::LoadOnce
        } else {
            CachePolicy::Reload
        }
    }
}

/// An enabled plugin that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub name: String,
    pub reason: String,
    /// Command that removes the plugin from the registry
    pub remedy: String,
}

/// Modules that resolved, in the order their plugins are enabled, plus the
/// plugins that did not.
#[derive(Debug, Clone, Default)]
pub struct LoadedModules {
    modules: Vec<LoadedModule>,
    failures: Vec<LoadFailure>,
}

impl LoadedModules {
    pub fn new(modules: Vec<LoadedModule>) -> Self {
        Self {
            modules,
            failures: Vec::new(),
        }
    }

    pub fn modules(&self) -> &[LoadedModule] {
        &self.modules
    }

    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    pub fn names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&LoadedModule> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Modules defining `hook`, in load order.
    pub fn defining<'a>(&'a self, hook: &'a str) -> impl Iterator<Item = &'a LoadedModule> + 'a {
        self.modules.iter().filter(move |m| m.defines(hook))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

pub struct ModuleLoader {
    resolver: Arc<dyn ModuleResolver>,
    policy: CachePolicy,
    remove_command: String,
    cache: Mutex<Option<Arc<LoadedModules>>>,
}

impl ModuleLoader {
    pub fn new(resolver: Arc<dyn ModuleResolver>, policy: CachePolicy) -> Self {
        Self {
            resolver,
            policy,
            remove_command: DEFAULT_REMOVE_COMMAND.to_string(),
            cache: Mutex::new(None),
        }
    }

    /// Sets the command prefix used in load failure remediation hints.
    pub fn with_remove_command(mut self, command: impl Into<String>) -> Self {
        self.remove_command = command.into();
        self
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Returns the loaded modules, resolving the registry's enabled plugins
    /// first if nothing is cached.
    pub async fn ensure_loaded(&self, registry: &Registry) -> PluginResult<Arc<LoadedModules>> {
        if self.policy == CachePolicy::Reload {
            let state = registry.state()?;
            return Ok(Arc::new(self.load(&state.enabled).await));
        }

        // Held across resolution so concurrent callers wait for the one load.
        let mut cache = self.cache.lock().await;
        if let Some(loaded) = cache.as_ref() {
            return Ok(loaded.clone());
        }

        let state = registry.state()?;
        let loaded = Arc::new(self.load(&state.enabled).await);
        *cache = Some(loaded.clone());
        Ok(loaded)
    }

    pub async fn is_loaded(&self) -> bool {
        self.cache.lock().await.is_some()
    }

    /// Drops the cached collection; the next access resolves again.
    pub async fn reset(&self) {
        *self.cache.lock().await = None;
    }

    /// Resolves `names` without touching the cache. A plugin that fails to
    /// resolve is logged and skipped; the rest still load.
    pub async fn load(&self, names: &[String]) -> LoadedModules {
        let mut loaded = LoadedModules::default();

        for name in names {
            match self.resolver.resolve(name).await {
                Ok(module) => {
                    debug!("loading plugin: {name}");
                    loaded.modules.push(LoadedModule::new(name.clone(), module));
                }
                Err(e) => {
                    let remedy = format!("{} {name}", self.remove_command);
                    error!(plugin = %name, error = %e, "can't load plugin: {name}");
                    info!("you can remove the plugin by {remedy}");
                    loaded.failures.push(LoadFailure {
                        name: name.clone(),
                        reason: e.to_string(),
                        remedy,
                    });
                }
            }
        }

        loaded
    }
}
