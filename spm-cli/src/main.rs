use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use spm_core::settings::config::spm_home;
use spm_core::SettingsManager;

mod commands;
mod formatter;

use crate::formatter::Formatter;

#[derive(Parser, Debug)]
#[command(name = "spm")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "spm - plugin management")]
struct Args {
    /// Load settings from a specific file instead of ~/.spm/settings.toml
    #[arg(long, value_name = "PATH", global = true)]
    settings: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage installed plugins
    #[command(subcommand)]
    Plugin(PluginCommand),

    /// Invoke a hook on every loaded plugin that defines it
    Hook {
        /// Hook name
        name: String,

        /// How the hooks are composed
        #[arg(long, value_enum, default_value_t = HookMode::Series)]
        mode: HookMode,

        /// JSON value passed to the hooks
        #[arg(long, value_name = "JSON")]
        input: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum PluginCommand {
    /// Register and enable a plugin
    Add { name: String },
    /// Unregister a plugin
    Remove { name: String },
    /// Enable a disabled plugin
    Enable { name: String },
    /// Disable an enabled plugin
    Disable { name: String },
    /// Show enabled and disabled plugins
    Show,
    /// Load enabled plugins and list the hooks they define
    Hooks,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookMode {
    /// Each hook receives the previous hook's result
    Pipeline,
    /// One at a time, results keyed by plugin
    Series,
    /// All at once, results keyed by plugin
    Parallel,
    /// One at a time, results discarded
    Block,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = match &args.settings {
        Some(path) => SettingsManager::from_path(path.clone())?,
        None => SettingsManager::new()?,
    };
    let _guard = setup_tracing(args.verbose, settings.settings().log_to_file)?;
    debug!(settings = ?settings.path(), "Settings loaded");

    let formatter = Formatter::new(!args.no_color);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(commands::run(args.command, settings.settings(), &formatter))
}

fn setup_tracing(verbose: u8, log_to_file: bool) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt;

    let default_filter = match verbose {
        0 => "warn,spm=info,spm_core=info",
        1 => "info,spm=debug,spm_core=debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = if log_to_file {
        let trace_dir = spm_home().join("trace");
        std::fs::create_dir_all(&trace_dir)?;

        let appender = tracing_appender::rolling::never(&trace_dir, "spm.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}
