//! Loaded plugin code and the hooks it exposes.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

/// Executable plugin code. A module defines any number of named hooks; the
/// dispatcher only calls hooks for which [`PluginModule::defines`] is true.
#[async_trait]
pub trait PluginModule: Send + Sync {
    /// Names of the hooks this module defines.
    fn hook_names(&self) -> Vec<String>;

    fn defines(&self, hook: &str) -> bool {
        self.hook_names().iter().any(|name| name == hook)
    }

    /// Runs `hook` with `input`. Only called for hooks the module defines.
    async fn call(&self, hook: &str, input: Value) -> Result<Value>;
}

pub type SharedModule = Arc<dyn PluginModule>;

/// A resolved module tagged with the plugin name that produced it.
#[derive(Clone)]
pub struct LoadedModule {
    pub name: String,
    pub module: SharedModule,
}

impl LoadedModule {
    pub fn new(name: impl Into<String>, module: SharedModule) -> Self {
        Self {
            name: name.into(),
            module,
        }
    }

    pub fn defines(&self, hook: &str) -> bool {
        self.module.defines(hook)
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("hooks", &self.module.hook_names())
            .finish()
    }
}

type HookFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A module assembled from closures, for plugins compiled into the host.
///
/// ```rust,ignore
/// let module = FnModule::new()
///     .hook("onBuild", |input| async move { Ok(input) })
///     .into_shared();
/// ```
#[derive(Clone, Default)]
pub struct FnModule {
    hooks: BTreeMap<String, HookFn>,
}

impl FnModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.hooks
            .insert(name.into(), Arc::new(move |input| f(input).boxed()));
        self
    }

    pub fn into_shared(self) -> SharedModule {
        Arc::new(self)
    }
}

#[async_trait]
impl PluginModule for FnModule {
    fn hook_names(&self) -> Vec<String> {
        self.hooks.keys().cloned().collect()
    }

    fn defines(&self, hook: &str) -> bool {
        self.hooks.contains_key(hook)
    }

    async fn call(&self, hook: &str, input: Value) -> Result<Value> {
        let f = self
            .hooks
            .get(hook)
            .ok_or_else(|| anyhow::anyhow!("hook {hook} is not defined"))?;
        f(input).await
    }
}
