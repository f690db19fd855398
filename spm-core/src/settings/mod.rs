pub mod config;
pub mod manager;


pub use config::{PluginsConfig, Settings};
pub use manager::SettingsManager;
