use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gpis::{ColorMode, ConfigOverrides};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (built ",
    env!("GPIS_BUILD_DATE"),
    ", ",
    env!("GPIS_BUILD_TARGET"),
    ", ",
    env!("GPIS_BUILD_PROFILE"),
    ")"
);

/// Positive humantime duration (`300ms`, `2s`).
fn parse_period(s: &str) -> Result<Duration, String> {
    let d = humantime::parse_duration(s).map_err(|e| e.to_string())?;
    if d.is_zero() {
        return Err("must be greater than zero".to_string());
    }
    Ok(d)
}

#[derive(Parser, Debug)]
#[command(
    name = "gpis",
    version,
    long_version = LONG_VERSION,
    about = "Pair session over git: watch, auto-commit, push and pull"
)]
pub(crate) struct Cli {
    /// Tracked working tree (defaults to the current directory)
    #[arg(long, global = true)]
    pub(crate) root: Option<PathBuf>,

    /// How often to pull from the remote
    #[arg(long = "sync-period", global = true, value_parser = parse_period)]
    pub(crate) sync_period: Option<Duration>,

    /// How often to scan the tree for changes
    #[arg(long = "watch-period", global = true, value_parser = parse_period)]
    pub(crate) watch_period: Option<Duration>,

    /// Remote to publish and probe session branches on
    #[arg(long, global = true)]
    pub(crate) remote: Option<String>,

    /// YAML config file (otherwise GPIS_CONFIG or <root>/.gpis.yml)
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    /// Debug-level logging unless GPIS_LOG/RUST_LOG say otherwise
    #[arg(long, short = 'v', global = true)]
    pub(crate) verbose: bool,

    /// Colorize messages: auto|always|never
    #[arg(long, value_enum, global = true)]
    pub(crate) color: Option<ColorMode>,

    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Keep watching the current branch
    Start,
    /// Create a new session branch, publish it and start watching
    Init,
    /// Check out an existing session branch and start watching
    Join {
        /// Session branch name (must carry the session prefix)
        branch: String,
    },
}

impl Cli {
    pub(crate) fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            root: self.root.clone(),
            config_file: self.config.clone(),
            sync_period: self.sync_period,
            watch_period: self.watch_period,
            remote: self.remote.clone(),
        }
    }
}
