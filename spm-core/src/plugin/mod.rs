//! Plugin registry and hook invocation.
//!
//! ## Components
//!
//! - [`StateStore`] reads and rewrites the plugin list file (`~/.spm/plugins`).
//! - [`Registry`] implements add/remove/enable/disable on top of it.
//! - [`ModuleLoader`] resolves enabled plugins into [`PluginModule`]s through a
//!   [`ModuleResolver`] and caches them.
//! - [`HookDispatcher`] calls a named hook on every module that defines it, as
//!   a pipeline, one after another, concurrently, or for side effects only.
//!
//! [`PluginManager`] wires these together for callers.
//!
//! ## Plugin states
//!
//! ```text
//!               add                 disable
//! Unregistered ─────► Enabled ◄──────────────► Disabled
//!       ▲               │        enable           │
//!       └───────────────┴─────────────────────────┘
//!                          remove
//! ```
//!
//! Any other request is rejected with a warning and leaves the file untouched.

pub mod dispatch;
pub mod executable;
pub mod loader;
pub mod manager;
pub mod module;
pub mod registry;
pub mod resolver;
pub mod state;

pub use dispatch::{HookDispatcher, HookFailure, NamedResults, PipelineOutcome};
pub use executable::{ExecutableModule, ExecutableResolver, PluginManifest};
pub use loader::{CachePolicy, LoadFailure, LoadedModules, ModuleLoader};
pub use manager::PluginManager;
pub use module::{FnModule, LoadedModule, PluginModule, SharedModule};
pub use registry::{PluginListing, Registry, Rejection, Transition};
pub use resolver::{ChainResolver, ModuleResolver, StaticResolver};
pub use state::{PluginState, PluginStatus, StateStore};
