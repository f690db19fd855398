//! Plugin manager tying the registry, loader and dispatcher together.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::dispatch::{HookDispatcher, NamedResults, PipelineOutcome};
use super::executable::ExecutableResolver;
use super::loader::{CachePolicy, LoadedModules, ModuleLoader};
use super::registry::{PluginListing, Registry, Transition};
use super::resolver::ModuleResolver;
use super::state::{PluginState, StateStore};
use crate::error::PluginResult;
use crate::settings::config::PluginsConfig;

/// Entry point for plugin management and hook invocation. Cloning is cheap and
/// clones share the module cache.
#[derive(Clone)]
pub struct PluginManager {
    inner: Arc<PluginManagerInner>,
}

struct PluginManagerInner {
    registry: Registry,
    loader: ModuleLoader,
    hook_timeout: Option<Duration>,
}

impl PluginManager {
    pub fn new(registry: Registry, loader: ModuleLoader) -> Self {
        Self {
            inner: Arc::new(PluginManagerInner {
                registry,
                loader,
                hook_timeout: None,
            }),
        }
    }

    /// Builds a manager that resolves plugins as executables, configured from
    /// the `[plugins]` settings section.
    pub fn from_config(config: &PluginsConfig) -> Self {
        Self::with_resolver(config, Arc::new(ExecutableResolver::from_config(config)))
    }

    /// Like [`PluginManager::from_config`] with a caller-supplied resolver.
    pub fn with_resolver(config: &PluginsConfig, resolver: Arc<dyn ModuleResolver>) -> Self {
        let registry = Registry::new(StateStore::new(&config.state_file));
        let loader = ModuleLoader::new(resolver, CachePolicy::from_load_once(config.load_once));

        Self {
            inner: Arc::new(PluginManagerInner {
                registry,
                loader,
                hook_timeout: config.hook_timeout(),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn state(&self) -> PluginResult<PluginState> {
        self.inner.registry.state()
    }

    pub fn add(&self, name: &str) -> PluginResult<Transition> {
        self.inner.registry.add(name)
    }

    pub fn remove(&self, name: &str) -> PluginResult<Transition> {
        self.inner.registry.remove(name)
    }

    pub fn enable(&self, name: &str) -> PluginResult<Transition> {
        self.inner.registry.enable(name)
    }

    pub fn disable(&self, name: &str) -> PluginResult<Transition> {
        self.inner.registry.disable(name)
    }

    pub fn list(&self) -> PluginResult<PluginListing> {
        self.inner.registry.list()
    }

    /// Loaded modules for the enabled plugins, resolved on first use.
    pub async fn ensure_loaded(&self) -> PluginResult<Arc<LoadedModules>> {
        self.inner.loader.ensure_loaded(&self.inner.registry).await
    }

    /// Creates a dispatcher over the currently loaded modules.
    pub async fn dispatcher(&self) -> PluginResult<HookDispatcher> {
        let modules = self.ensure_loaded().await?;
        debug!(plugins = modules.len(), "Creating hook dispatcher");
        Ok(HookDispatcher::new(modules).with_timeout(self.inner.hook_timeout))
    }

    pub async fn pipeline(&self, hook: &str, initial: Value) -> PluginResult<PipelineOutcome> {
        Ok(self.dispatcher().await?.pipeline(hook, initial).await)
    }

    pub async fn named_sequential(&self, hook: &str, input: Value) -> PluginResult<NamedResults> {
        Ok(self.dispatcher().await?.named_sequential(hook, input).await)
    }

    pub async fn named_concurrent(&self, hook: &str, input: Value) -> PluginResult<NamedResults> {
        Ok(self.dispatcher().await?.named_concurrent(hook, input).await)
    }

    pub async fn fire_and_forget(&self, hook: &str, input: Value) -> PluginResult<()> {
        self.dispatcher().await?.fire_and_forget(hook, input).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::module::FnModule;
    use crate::plugin::resolver::StaticResolver;
    use serde_json::json;
    use tempfile::TempDir;

    fn config(temp: &TempDir) -> PluginsConfig {
        PluginsConfig {
            state_file: temp.path().join("plugins"),
            plugin_dirs: vec![temp.path().join("plugins.d")],
            search_path: false,
            ..PluginsConfig::default()
        }
    }

    fn resolver() -> Arc<dyn ModuleResolver> {
        Arc::new(
            StaticResolver::new()
                .with(
                    "foo",
                    FnModule::new()
                        .hook("onBuild", |_| async { Ok(json!("foo built")) })
                        .hook("transform", |v| async move {
                            Ok(json!(v.as_i64().unwrap_or_default() + 1))
                        })
                        .into_shared(),
                )
                .with(
                    "bar",
                    FnModule::new()
                        .hook("transform", |v| async move {
                            Ok(json!(v.as_i64().unwrap_or_default() * 10))
                        })
                        .into_shared(),
                ),
        )
    }

    #[tokio::test]
    async fn test_hooks_follow_registry() {
        let temp = TempDir::new().unwrap();
        let manager = PluginManager::with_resolver(&config(&temp), resolver());

        manager.add("foo").unwrap();
        manager.add("bar").unwrap();
        manager.add("missing").unwrap();

        let outcome = manager.pipeline("transform", json!(1)).await.unwrap();
        assert_eq!(outcome.value, json!(20));

        let results = manager.named_sequential("onBuild", Value::Null).await.unwrap();
        assert_eq!(results.names(), vec!["foo"]);

        let loaded = manager.ensure_loaded().await.unwrap();
        assert_eq!(loaded.failures()[0].name, "missing");
    }

    #[tokio::test]
    async fn test_clones_share_module_cache() {
        let temp = TempDir::new().unwrap();
        let manager = PluginManager::with_resolver(&config(&temp), resolver());
        manager.add("foo").unwrap();

        let first = manager.ensure_loaded().await.unwrap();
        let clone = manager.clone();
        clone.add("bar").unwrap();

        let second = clone.ensure_loaded().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let results = clone.named_concurrent("transform", json!(2)).await.unwrap();
        assert_eq!(results.names(), vec!["foo"]);
    }

    #[tokio::test]
    async fn test_reload_config_sees_new_plugins() {
        let temp = TempDir::new().unwrap();
        let mut config = config(&temp);
        config.load_once = false;
        let manager = PluginManager::with_resolver(&config, resolver());

        manager.add("foo").unwrap();
        manager.fire_and_forget("onBuild", Value::Null).await.unwrap();
        manager.add("bar").unwrap();

        let results = manager.named_sequential("transform", json!(3)).await.unwrap();
        assert_eq!(results.to_json(), json!({"foo": 4, "bar": 30}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_manifest_does_not_stall_dispatch() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let mut config = config(&temp);
        config.manifest_timeout_ms = 100;
        config.hook_timeout_ms = Some(100);

        let dir = &config.plugin_dirs[0];
        std::fs::create_dir_all(dir).unwrap();
        let script = dir.join("spm-plugin-slow");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let manager = PluginManager::from_config(&config);
        manager.add("slow").unwrap();

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            manager.named_sequential("onBuild", Value::Null),
        )
        .await
        .expect("dispatch stalled on manifest")
        .unwrap();

        assert!(results.is_empty());
        let loaded = manager.ensure_loaded().await.unwrap();
        assert_eq!(loaded.failures()[0].name, "slow");
        assert!(loaded.failures()[0].reason.contains("timed out"));
    }

    #[test]
    fn test_list_reports_both_groups() {
        let temp = TempDir::new().unwrap();
        let manager = PluginManager::with_resolver(&config(&temp), resolver());

        manager.add("foo").unwrap();
        manager.add("bar").unwrap();
        manager.disable("foo").unwrap();

        let listing = manager.list().unwrap();
        assert_eq!(listing.enabled, vec!["bar".to_string()]);
        assert_eq!(listing.disabled, vec!["foo".to_string()]);
        assert!(manager.remove("foo").unwrap().is_applied());
        assert!(!manager.enable("foo").unwrap().is_applied());
    }
}
