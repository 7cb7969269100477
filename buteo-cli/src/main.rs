//! Buteo: command-line front end for the msyncd sync daemon.
//!
//! # Usage
//!
//! ```text
//! buteo [--config <path>] [--system] [--service <name>] [--timeout <secs>] <command>
//!
//! buteo status [--json]
//! buteo profiles [--category <name>] [--enabled] [--json]
//! buteo start <profile>
//! buteo start-category <category>
//! buteo abort <profile>
//! buteo running [--json]
//! buteo remove <profile>
//! buteo watch [--json]
//! ```

mod commands;
mod session;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use buteo_core::{BusKind, ControllerConfig};
use commands::{
    profiles::{ProfilesArgs, RemoveArgs},
    status::StatusArgs,
    sync::{AbortArgs, RunningArgs, StartArgs, StartCategoryArgs},
    watch::WatchArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "buteo",
    version,
    about = "Inspect and drive the Buteo sync daemon over D-Bus",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show connection state, sync activity and profile count.
    Status(StatusArgs),

    /// List cached sync profiles grouped by category.
    Profiles(ProfilesArgs),

    /// Start syncing one profile.
    Start(StartArgs),

    /// Start every enabled profile of a category.
    StartCategory(StartCategoryArgs),

    /// Abort a running sync.
    Abort(AbortArgs),

    /// List profiles the daemon is syncing right now.
    Running(RunningArgs),

    /// Delete a profile from the daemon.
    Remove(RemoveArgs),

    /// Print controller events until interrupted.
    Watch(WatchArgs),
}

// ---------------------------------------------------------------------------
// Options shared by every command
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Controller config file (default: <config dir>/buteo/controller.yaml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Talk to the daemon on the system bus instead of the session bus.
    #[arg(long, global = true)]
    pub system: bool,

    /// Override the daemon's bus name.
    #[arg(long, global = true)]
    pub service: Option<String>,

    /// Seconds to wait for the daemon to answer.
    #[arg(long, global = true, default_value_t = 5)]
    pub timeout: u64,
}

impl GlobalArgs {
    pub fn load_config(&self) -> Result<ControllerConfig> {
        let config = ControllerConfig::load_or_default(self.config.as_deref())
            .context("failed to load controller config")?;
        Ok(self.apply_overrides(config))
    }

    fn apply_overrides(&self, mut config: ControllerConfig) -> ControllerConfig {
        if self.system {
            config.bus = BusKind::System;
        }
        if let Some(service) = &self.service {
            config.service_name = service.clone();
        }
        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    buteo_controller::init_tracing("warn");

    let global = cli.global;
    match cli.command {
        Commands::Status(args) => args.run(&global),
        Commands::Profiles(args) => args.run(&global),
        Commands::Start(args) => args.run(&global),
        Commands::StartCategory(args) => args.run(&global),
        Commands::Abort(args) => args.run(&global),
        Commands::Running(args) => args.run(&global),
        Commands::Remove(args) => args.run(&global),
        Commands::Watch(args) => args.run(&global),
    }
}
