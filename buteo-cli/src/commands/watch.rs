//! `buteo watch`: stream controller events until Ctrl-C.
//!
//! The daemon does not have to be running; connection changes are printed
//! as it comes and goes.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;

use buteo_controller::ControllerEvent;

use crate::session::{block_on, Session};
use crate::GlobalArgs;

/// Arguments for `buteo watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Print one JSON object per event.
    #[arg(long)]
    pub json: bool,
}

impl WatchArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        block_on(async {
            let mut session = Session::open(global).await?;
            loop {
                tokio::select! {
                    signal = tokio::signal::ctrl_c() => {
                        signal.context("failed to listen for ctrl-c")?;
                        break;
                    }
                    event = session.events.recv() => match event {
                        Ok(event) => self.print(&event)?,
                        Err(RecvError::Lagged(skipped)) => {
                            eprintln!("{}", format!("… {skipped} events dropped").bright_black());
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            session.close().await
        })
    }

    fn print(&self, event: &ControllerEvent) -> Result<()> {
        if self.json {
            println!(
                "{}",
                serde_json::to_string(event).context("failed to serialize event JSON")?
            );
        } else {
            println!("{}", describe(event));
        }
        Ok(())
    }
}

fn describe(event: &ControllerEvent) -> String {
    match event {
        ControllerEvent::ConnectionChanged { connected: true } => {
            format!("{} connected", "●".green().bold())
        }
        ControllerEvent::ConnectionChanged { connected: false } => {
            format!("{} disconnected", "●".red().bold())
        }
        ControllerEvent::SyncStatusChanged => "sync activity changed".bright_black().to_string(),
        ControllerEvent::ProfilesChanged => "profile list changed".bright_black().to_string(),
        ControllerEvent::ProfileChanged {
            profile, change, ..
        } => format!("{} profile '{profile}' {change}", "✎".cyan()),
        ControllerEvent::SyncStatus {
            profile,
            status,
            message,
            ..
        } if message.is_empty() => format!("{} '{profile}' {status}", "▸".yellow().bold()),
        ControllerEvent::SyncStatus {
            profile,
            status,
            message,
            ..
        } => format!("{} '{profile}' {status}: {message}", "▸".yellow().bold()),
    }
}
