//! Turning a plugin name into a loadable module.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::module::SharedModule;
use crate::error::{PluginError, PluginResult};

/// Resolves plugin names to modules. Implementations decide where plugin code
/// lives; the loader only cares whether resolution succeeded.
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> PluginResult<SharedModule>;
}

type Factory = Arc<dyn Fn() -> PluginResult<SharedModule> + Send + Sync>;

/// In-process table of plugins compiled into the host binary.
#[derive(Clone, Default)]
pub struct StaticResolver {
    factories: HashMap<String, Factory>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module that is shared by every resolution of `name`.
    pub fn register(&mut self, name: impl Into<String>, module: SharedModule) {
        self.factories
            .insert(name.into(), Arc::new(move || Ok(module.clone())));
    }

    /// Registers a factory invoked on every resolution of `name`.
    pub fn register_factory<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> PluginResult<SharedModule> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn with(mut self, name: impl Into<String>, module: SharedModule) -> Self {
        self.register(name, module);
        self
    }
}

#[async_trait]
impl ModuleResolver for StaticResolver {
    async fn resolve(&self, name: &str) -> PluginResult<SharedModule> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        factory()
    }
}

/// Tries each resolver in order; the first success wins.
#[derive(Default)]
pub struct ChainResolver {
    resolvers: Vec<Box<dyn ModuleResolver>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, resolver: impl ModuleResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }
}

#[async_trait]
impl ModuleResolver for ChainResolver {
    async fn resolve(&self, name: &str) -> PluginResult<SharedModule> {
        let mut reasons = Vec::new();

        for resolver in &self.resolvers {
            match resolver.resolve(name).await {
                Ok(module) => return Ok(module),
                Err(e) => {
                    debug!(plugin = %name, error = %e, "Resolver did not provide plugin");
                    reasons.push(e.to_string());
                }
            }
        }

        if reasons.is_empty() {
            return Err(PluginError::NotFound(name.to_string()));
        }

        Err(PluginError::Resolve {
            name: name.to_string(),
            reason: reasons.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::module::FnModule;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_static_resolver_returns_registered_module() {
        let resolver = StaticResolver::new().with("foo", FnModule::new().into_shared());
        assert!(resolver.resolve("foo").await.is_ok());
        assert!(matches!(
            resolver.resolve("bar").await,
            Err(PluginError::NotFound(name)) if name == "bar"
        ));
    }

    #[tokio::test]
    async fn test_static_resolver_factory_runs_per_resolution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut resolver = StaticResolver::new();
        resolver.register_factory("foo", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(FnModule::new().into_shared())
        });

        resolver.resolve("foo").await.unwrap();
        resolver.resolve("foo").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_chain_resolver_falls_through() {
        let chain = ChainResolver::new()
            .push(StaticResolver::new())
            .push(StaticResolver::new().with("foo", FnModule::new().into_shared()));

        assert!(chain.resolve("foo").await.is_ok());

        let err = chain.resolve("bar").await.err().unwrap();
        assert!(matches!(err, PluginError::Resolve { ref name, .. } if name == "bar"));
        assert!(err.to_string().contains("bar"));
    }

    #[tokio::test]
    async fn test_empty_chain_reports_not_found() {
        let chain = ChainResolver::new();
        assert!(matches!(chain.resolve("foo").await, Err(PluginError::NotFound(_))));
    }
}
