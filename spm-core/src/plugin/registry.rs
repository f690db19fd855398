//! Add/remove/enable/disable on top of the [`StateStore`].
//!
//! Each mutation loads the current state, applies one transition and rewrites
//! the backing file. Transitions that do not apply to the plugin's current
//! status are returned as [`Transition::Rejected`] and logged as warnings;
//! they never surface as errors.

use std::fmt;

use tracing::{info, warn};

use super::state::{PluginState, PluginStatus, StateStore, DISABLED_MARKER};
use crate::error::PluginResult;

/// Why a registry operation did not change anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// `add` of a name that is already enabled
    AlreadyEnabled(String),
    /// `add` of a name that is already disabled
    AlreadyDisabled(String),
    /// `remove` of a name that is not registered
    NotInstalled(String),
    /// `enable` of a name that is not currently disabled
    NotDisabled(String),
    /// `disable` of a name that is not currently enabled
    NotEnabled(String),
    /// `add` of a name that cannot be stored in the state file
    InvalidName(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::AlreadyEnabled(name) => {
                write!(f, "plugin {name} has already installed, it is enabled")
            }
            Rejection::AlreadyDisabled(name) => {
                write!(f, "plugin {name} has already installed, it is disabled")
            }
            Rejection::NotInstalled(name) => write!(f, "plugin {name} is not installed"),
            Rejection::NotDisabled(name) => write!(f, "plugin {name} is not disabled"),
            Rejection::NotEnabled(name) => write!(f, "plugin {name} is not enabled"),
            Rejection::InvalidName(name) => write!(f, "{name:?} is not a valid plugin name"),
        }
    }
}

/// Outcome of a registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The change was applied and persisted; carries the resulting state.
    Applied(PluginState),
    /// Nothing changed.
    Rejected(Rejection),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn state(&self) -> Option<&PluginState> {
        match self {
            Transition::Applied(state) => Some(state),
            Transition::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Transition::Applied(_) => None,
            Transition::Rejected(reason) => Some(reason),
        }
    }
}

/// Registered plugins grouped for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginListing {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

impl PluginListing {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty()
    }
}

impl From<PluginState> for PluginListing {
    fn from(state: PluginState) -> Self {
        Self {
            enabled: state.enabled,
            disabled: state.disabled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    store: StateStore,
}

impl Registry {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Current persisted state.
    pub fn state(&self) -> PluginResult<PluginState> {
        self.store.load()
    }

    /// Registers `name` as enabled.
    pub fn add(&self, name: &str) -> PluginResult<Transition> {
        if !is_valid_name(name) {
            return Ok(reject(Rejection::InvalidName(name.to_string())));
        }

        let mut state = self.store.load()?;
        match state.status(name) {
            Some(PluginStatus::Enabled) => {
                return Ok(reject(Rejection::AlreadyEnabled(name.to_string())))
            }
            Some(PluginStatus::Disabled) => {
                return Ok(reject(Rejection::AlreadyDisabled(name.to_string())))
            }
            None => {}
        }

        state.enabled.push(name.to_string());
        self.commit(state, "added", name)
    }

    /// Unregisters `name` whatever its status.
    pub fn remove(&self, name: &str) -> PluginResult<Transition> {
        let mut state = self.store.load()?;

        if !remove_name(&mut state.enabled, name) && !remove_name(&mut state.disabled, name) {
            return Ok(reject(Rejection::NotInstalled(name.to_string())));
        }

        self.commit(state, "removed", name)
    }

    /// Moves `name` from disabled to the end of the enabled list.
    pub fn enable(&self, name: &str) -> PluginResult<Transition> {
        let mut state = self.store.load()?;

        if !remove_name(&mut state.disabled, name) {
            return Ok(reject(Rejection::NotDisabled(name.to_string())));
        }
        state.enabled.push(name.to_string());

        self.commit(state, "enabled", name)
    }

    /// Moves `name` from enabled to the end of the disabled list.
    pub fn disable(&self, name: &str) -> PluginResult<Transition> {
        let mut state = self.store.load()?;

        if !remove_name(&mut state.enabled, name) {
            return Ok(reject(Rejection::NotEnabled(name.to_string())));
        }
        state.disabled.push(name.to_string());

        self.commit(state, "disabled", name)
    }

    /// Pure read of the registered plugins.
    pub fn list(&self) -> PluginResult<PluginListing> {
        Ok(self.store.load()?.into())
    }

    fn commit(&self, state: PluginState, action: &str, name: &str) -> PluginResult<Transition> {
        self.store.save(&state)?;
        info!(plugin = %name, "Plugin {action}");
        Ok(Transition::Applied(state))
    }
}

fn reject(reason: Rejection) -> Transition {
    warn!("{reason}");
    Transition::Rejected(reason)
}

fn remove_name(names: &mut Vec<String>, name: &str) -> bool {
    match names.iter().position(|n| n == name) {
        Some(index) => {
            names.remove(index);
            true
        }
        None => false,
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with(DISABLED_MARKER) && !name.contains(['\n', '\r'])
}
