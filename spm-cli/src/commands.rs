use anyhow::{Context, Result};
use serde_json::Value;
use spm_core::plugin::Transition;
use spm_core::{PluginManager, Settings};
use tracing::debug;

use crate::formatter::Formatter;
use crate::{Command, HookMode, PluginCommand};

pub async fn run(command: Command, settings: &Settings, formatter: &Formatter) -> Result<()> {
    let manager = PluginManager::from_config(&settings.plugins);

    match command {
        Command::Plugin(cmd) => run_plugin(cmd, &manager, formatter).await,
        Command::Hook { name, mode, input } => {
            run_hook(&manager, formatter, &name, mode, input.as_deref()).await
        }
    }
}

async fn run_plugin(cmd: PluginCommand, manager: &PluginManager, formatter: &Formatter) -> Result<()> {
    let transition = match cmd {
        PluginCommand::Add { name } => manager.add(&name)?,
        PluginCommand::Remove { name } => manager.remove(&name)?,
        PluginCommand::Enable { name } => manager.enable(&name)?,
        PluginCommand::Disable { name } => manager.disable(&name)?,
        PluginCommand::Show => {
            print!("{}", formatter.listing(&manager.list()?));
            return Ok(());
        }
        PluginCommand::Hooks => {
            let loaded = manager.ensure_loaded().await?;
            print!("{}", formatter.hooks(&loaded));
            return Ok(());
        }
    };

    // Rejections were already reported as warnings.
    if let Transition::Rejected(reason) = &transition {
        debug!(%reason, "Plugin command had no effect");
    }
    Ok(())
}

async fn run_hook(
    manager: &PluginManager,
    formatter: &Formatter,
    hook: &str,
    mode: HookMode,
    input: Option<&str>,
) -> Result<()> {
    let input = match input {
        Some(raw) => serde_json::from_str(raw).context("--input is not valid JSON")?,
        None => Value::Null,
    };

    debug!(hook = %hook, mode = ?mode, "Invoking hook");

    match mode {
        HookMode::Pipeline => {
            let outcome = manager.pipeline(hook, input).await?;
            println!("{}", formatter.json(&outcome.value));
        }
        HookMode::Series => {
            let results = manager.named_sequential(hook, input).await?;
            println!("{}", formatter.json(&results.to_json()));
        }
        HookMode::Parallel => {
            let results = manager.named_concurrent(hook, input).await?;
            println!("{}", formatter.json(&results.to_json()));
        }
        HookMode::Block => manager.fire_and_forget(hook, input).await?,
    }

    Ok(())
}
