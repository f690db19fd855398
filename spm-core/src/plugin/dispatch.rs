//! Invokes a named hook across every loaded module that defines it.
//!
//! Four topologies are supported:
//!
//! | Method | Order | Input | On failure |
//! |--------|-------|-------|------------|
//! | [`HookDispatcher::pipeline`] | load order | previous hook's result | stop, return last good value |
//! | [`HookDispatcher::named_sequential`] | load order | same input for all | record, keep going |
//! | [`HookDispatcher::named_concurrent`] | unordered | same input for all | record, keep going |
//! | [`HookDispatcher::fire_and_forget`] | load order | same input for all | log, keep going |
//!
//! Modules that do not define the hook are skipped entirely.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::loader::LoadedModules;
use super::module::LoadedModule;
use crate::error::PluginError;

/// A hook call that returned an error, timed out or panicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookFailure {
    pub plugin: String,
    pub hook: String,
    pub message: String,
}

impl HookFailure {
    fn new(module: &LoadedModule, hook: &str, error: PluginError) -> Self {
        Self {
            plugin: module.name.clone(),
            hook: hook.to_string(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Result of running a hook as a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    /// Final value, or the last successful value if a stage failed
    pub value: Value,
    /// Plugins whose stage completed, in order
    pub completed: Vec<String>,
    /// The stage that stopped the pipeline
    pub failure: Option<HookFailure>,
}

impl PipelineOutcome {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Hook results keyed by plugin name, in load order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NamedResults {
    results: Vec<(String, Value)>,
    failures: Vec<HookFailure>,
}

impl NamedResults {
    pub fn get(&self, plugin: &str) -> Option<&Value> {
        self.results
            .iter()
            .find(|(name, _)| name == plugin)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, plugin: &str) -> bool {
        self.get(plugin).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.results.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.results.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn failures(&self) -> &[HookFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// JSON object mapping plugin names to results.
    pub fn to_json(&self) -> Value {
        Value::Object(self.results.iter().cloned().collect())
    }
}

/// Dispatches hooks over a snapshot of loaded modules.
#[derive(Debug, Clone)]
pub struct HookDispatcher {
    modules: Arc<LoadedModules>,
    timeout: Option<Duration>,
}

impl HookDispatcher {
    pub fn new(modules: Arc<LoadedModules>) -> Self {
        Self {
            modules,
            timeout: None,
        }
    }

    /// Bounds every hook call; a call running longer counts as failed.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn modules(&self) -> &LoadedModules {
        &self.modules
    }

    /// Returns true if any loaded module defines `hook`.
    pub fn has_hook(&self, hook: &str) -> bool {
        self.modules.defining(hook).next().is_some()
    }

    /// Names of the plugins that define `hook`, in load order.
    pub fn plugins_defining(&self, hook: &str) -> Vec<String> {
        self.modules.defining(hook).map(|m| m.name.clone()).collect()
    }

    /// Feeds `initial` to the first hook and each result to the next one.
    pub async fn pipeline(&self, hook: &str, initial: Value) -> PipelineOutcome {
        let mut value = initial;
        let mut completed = Vec::new();

        for module in self.modules.defining(hook) {
            match call_hook(module, hook, value.clone(), self.timeout).await {
                Ok(next) => {
                    value = next;
                    completed.push(module.name.clone());
                }
                Err(failure) => {
                    error!(
                        plugin = %failure.plugin,
                        hook = %hook,
                        "Pipeline stopped: {failure}"
                    );
                    return PipelineOutcome {
                        value,
                        completed,
                        failure: Some(failure),
                    };
                }
            }
        }

        PipelineOutcome {
            value,
            completed,
            failure: None,
        }
    }

    /// Runs each hook in turn and collects results by plugin name.
    pub async fn named_sequential(&self, hook: &str, input: Value) -> NamedResults {
        let mut results = NamedResults::default();

        for module in self.modules.defining(hook) {
            let outcome = call_hook(module, hook, input.clone(), self.timeout).await;
            record(&mut results, module, outcome);
        }

        results
    }

    /// Starts every hook before waiting on any of them. Results are returned in
    /// load order once all hooks have finished.
    pub async fn named_concurrent(&self, hook: &str, input: Value) -> NamedResults {
        let selected: Vec<LoadedModule> = self.modules.defining(hook).cloned().collect();
        let mut slots: Vec<Option<Result<Value, HookFailure>>> = vec![None; selected.len()];

        let mut join_set = JoinSet::new();
        for (index, module) in selected.iter().cloned().enumerate() {
            let hook = hook.to_string();
            let input = input.clone();
            let timeout = self.timeout;
            join_set.spawn(async move { (index, call_hook(&module, &hook, input, timeout).await) });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => warn!(hook = %hook, error = %e, "Hook task did not complete"),
            }
        }

        let mut results = NamedResults::default();
        for (module, slot) in selected.iter().zip(slots) {
            if let Some(outcome) = slot {
                record(&mut results, module, outcome);
            }
        }
        results
    }

    /// Runs each hook in turn for its side effects. Results are discarded.
    pub async fn fire_and_forget(&self, hook: &str, input: Value) {
        for module in self.modules.defining(hook) {
            if let Err(failure) = call_hook(module, hook, input.clone(), self.timeout).await {
                warn!(plugin = %failure.plugin, hook = %hook, "{failure}");
            }
        }
    }
}

fn record(
    results: &mut NamedResults,
    module: &LoadedModule,
    outcome: Result<Value, HookFailure>,
) {
    match outcome {
        Ok(value) => results.results.push((module.name.clone(), value)),
        Err(failure) => {
            warn!(plugin = %failure.plugin, hook = %failure.hook, "{failure}");
            results.failures.push(failure);
        }
    }
}

async fn call_hook(
    module: &LoadedModule,
    hook: &str,
    input: Value,
    timeout: Option<Duration>,
) -> Result<Value, HookFailure> {
    debug!(plugin = %module.name, hook = %hook, "Executing hook");

    let call = AssertUnwindSafe(module.module.call(hook, input)).catch_unwind();
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(joined) => joined,
            Err(_) => {
                let error = PluginError::Timeout {
                    plugin: module.name.clone(),
                    hook: hook.to_string(),
                    after: limit,
                };
                return Err(HookFailure::new(module, hook, error));
            }
        },
        None => call.await,
    };

    let reason = match joined {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => format!("{e:#}"),
        Err(_) => "hook panicked".to_string(),
    };

    let error = PluginError::Hook {
        plugin: module.name.clone(),
        hook: hook.to_string(),
        reason,
    };
    Err(HookFailure::new(module, hook, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::module::FnModule;
    use serde_json::json;
    use std::sync::Mutex;

    fn dispatcher(modules: Vec<(&str, FnModule)>) -> HookDispatcher {
        let loaded = modules
            .into_iter()
            .map(|(name, module)| LoadedModule::new(name, module.into_shared()))
            .collect();
        HookDispatcher::new(Arc::new(LoadedModules::new(loaded)))
    }

    fn append(suffix: &'static str) -> impl Fn(Value) -> futures::future::Ready<anyhow::Result<Value>> {
        move |input| {
            let base = input.as_str().unwrap_or_default().to_string();
            futures::future::ready(Ok(json!(format!("{base}{suffix}"))))
        }
    }

    fn failing(message: &'static str) -> impl Fn(Value) -> futures::future::Ready<anyhow::Result<Value>> {
        move |_| futures::future::ready(Err(anyhow::anyhow!(message)))
    }

    #[tokio::test]
    async fn test_pipeline_threads_results_in_load_order() {
        let dispatcher = dispatcher(vec![
            ("a", FnModule::new().hook("build", append("a"))),
            ("skip", FnModule::new().hook("other", append("x"))),
            ("b", FnModule::new().hook("build", append("b"))),
            ("c", FnModule::new().hook("build", append("c"))),
        ]);

        let outcome = dispatcher.pipeline("build", json!(">")).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.value, json!(">abc"));
        assert_eq!(outcome.completed, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_pipeline_stops_at_failure_and_keeps_partial_value() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();

        let dispatcher = dispatcher(vec![
            ("a", FnModule::new().hook("build", append("a"))),
            ("b", FnModule::new().hook("build", failing("disk full"))),
            (
                "c",
                FnModule::new().hook("build", move |v| {
                    seen.lock().unwrap().push("c");
                    async move { Ok(v) }
                }),
            ),
        ]);

        let outcome = dispatcher.pipeline("build", json!("")).await;

        assert_eq!(outcome.value, json!("a"));
        assert_eq!(outcome.completed, vec!["a"]);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.plugin, "b");
        assert!(failure.message.contains("disk full"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_without_hooks_returns_initial_value() {
        let dispatcher = dispatcher(vec![("a", FnModule::new())]);

        let outcome = dispatcher.pipeline("build", json!(7)).await;

        assert_eq!(outcome.value, json!(7));
        assert!(outcome.completed.is_empty());
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn test_named_sequential_only_includes_defining_plugins() {
        let dispatcher = dispatcher(vec![
            ("foo", FnModule::new().hook("onBuild", |_| async { Ok(json!(1)) })),
            ("bar", FnModule::new().hook("onTest", |_| async { Ok(json!(2)) })),
            ("baz", FnModule::new().hook("onBuild", |_| async { Ok(json!(3)) })),
        ]);

        let results = dispatcher.named_sequential("onBuild", Value::Null).await;

        assert_eq!(results.names(), vec!["foo", "baz"]);
        assert_eq!(results.get("foo"), Some(&json!(1)));
        assert_eq!(results.get("baz"), Some(&json!(3)));
        assert!(!results.contains("bar"));
        assert_eq!(results.to_json(), json!({"foo": 1, "baz": 3}));
    }

    #[tokio::test]
    async fn test_named_sequential_runs_in_order_and_isolates_failures() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let tracked = |name: &'static str, order: Arc<Mutex<Vec<&'static str>>>| {
            FnModule::new().hook("run", move |input| {
                order.lock().unwrap().push(name);
                async move { Ok(input) }
            })
        };

        let dispatcher = dispatcher(vec![
            ("a", tracked("a", order.clone())),
            ("b", FnModule::new().hook("run", failing("nope"))),
            ("c", tracked("c", order.clone())),
        ]);

        let results = dispatcher.named_sequential("run", json!("in")).await;

        assert_eq!(*order.lock().unwrap(), vec!["a", "c"]);
        assert_eq!(results.names(), vec!["a", "c"]);
        assert_eq!(results.get("c"), Some(&json!("in")));
        assert_eq!(results.failures().len(), 1);
        assert_eq!(results.failures()[0].plugin, "b");
    }

    #[tokio::test]
    async fn test_named_concurrent_starts_all_before_any_finishes() {
        let (tx, rx) = tokio::sync::watch::channel(false);
        let started = Arc::new(Mutex::new(0usize));

        let gated = |value: i64| {
            let rx = rx.clone();
            let started = started.clone();
            FnModule::new().hook("sync", move |_| {
                let mut rx = rx.clone();
                *started.lock().unwrap() += 1;
                async move {
                    rx.wait_for(|open| *open).await?;
                    Ok(json!(value))
                }
            })
        };

        let dispatcher = dispatcher(vec![("a", gated(1)), ("b", gated(2)), ("c", gated(3))]);

        let opener = {
            let started = started.clone();
            async move {
                while *started.lock().unwrap() < 3 {
                    tokio::task::yield_now().await;
                }
                tx.send(true).unwrap();
            }
        };

        let (results, _) = tokio::join!(dispatcher.named_concurrent("sync", Value::Null), opener);

        assert_eq!(results.names(), vec!["a", "b", "c"]);
        assert_eq!(results.get("b"), Some(&json!(2)));
        assert!(results.failures().is_empty());
    }

    #[tokio::test]
    async fn test_named_concurrent_isolates_failures_and_panics() {
        let dispatcher = dispatcher(vec![
            ("ok", FnModule::new().hook("go", |_| async { Ok(json!("done")) })),
            ("err", FnModule::new().hook("go", failing("broken"))),
            (
                "panic",
                FnModule::new().hook("go", |input: Value| async move {
                    if input.is_null() {
                        panic!("plugin bug");
                    }
                    Ok(input)
                }),
            ),
        ]);

        let results = dispatcher.named_concurrent("go", Value::Null).await;

        assert_eq!(results.names(), vec!["ok"]);
        let failed: Vec<&str> = results
            .failures()
            .iter()
            .map(|f| f.plugin.as_str())
            .collect();
        assert_eq!(failed, vec!["err", "panic"]);
        assert!(results.failures()[1].message.contains("panicked"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let dispatcher = dispatcher(vec![
            (
                "slow",
                FnModule::new().hook("wait", |_| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(Value::Null)
                }),
            ),
            ("fast", FnModule::new().hook("wait", |_| async { Ok(json!(true)) })),
        ])
        .with_timeout(Some(Duration::from_millis(20)));

        let results = dispatcher.named_sequential("wait", Value::Null).await;

        assert_eq!(results.names(), vec!["fast"]);
        assert!(results.failures()[0].message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_fire_and_forget_runs_every_hook() {
        let effects = Arc::new(Mutex::new(Vec::new()));

        let effect = |name: &'static str| {
            let effects = effects.clone();
            FnModule::new().hook("write", move |_| {
                effects.lock().unwrap().push(name);
                async { Ok(Value::Null) }
            })
        };

        let dispatcher = dispatcher(vec![
            ("a", effect("a")),
            ("b", FnModule::new().hook("write", failing("ignored"))),
            ("c", effect("c")),
            ("d", FnModule::new()),
        ]);

        dispatcher.fire_and_forget("write", Value::Null).await;

        assert_eq!(*effects.lock().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_hook_lookup() {
        let dispatcher = dispatcher(vec![
            ("a", FnModule::new().hook("x", append(""))),
            ("b", FnModule::new().hook("y", append(""))),
            ("c", FnModule::new().hook("x", append(""))),
        ]);

        assert!(dispatcher.has_hook("x"));
        assert!(!dispatcher.has_hook("z"));
        assert_eq!(dispatcher.plugins_defining("x"), vec!["a", "c"]);
    }
}
