pub mod error;
pub mod plugin;
pub mod settings;

pub use error::{PluginError, PluginResult};
pub use plugin::{HookDispatcher, PluginManager, PluginModule, Registry, Transition};
pub use settings::{Settings, SettingsManager};
