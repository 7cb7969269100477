//! `buteo status`: connection, sync activity and cache summary.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use buteo_core::ProfileId;

use crate::session::{block_on, Session};
use crate::GlobalArgs;

/// Arguments for `buteo status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    service: String,
    connected: bool,
    syncing: bool,
    profiles: usize,
    categories: usize,
    running: Vec<ProfileId>,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let service = global.load_config()?.service_name;
        let report = block_on(async {
            let (session, snapshot) = Session::connect(global).await?;
            let running = session
                .handle
                .running_sync_list()
                .await
                .context("failed to query running syncs")?;
            session.close().await?;
            Ok(StatusReport {
                service,
                connected: snapshot.connected,
                syncing: snapshot.syncing,
                profiles: snapshot.profiles_count,
                categories: snapshot.index.categories().count(),
                running: running.into_iter().collect(),
            })
        })?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &StatusReport) {
    let connection = if report.connected {
        "connected".green().bold()
    } else {
        "disconnected".red().bold()
    };
    let activity = if report.syncing {
        "syncing".yellow().bold()
    } else {
        "idle".bright_black()
    };

    println!("{} | {connection} | {activity}", report.service);
    println!(
        "{} profiles in {} categories",
        report.profiles, report.categories
    );
    if report.running.is_empty() {
        return;
    }
    println!("running:");
    for profile in &report.running {
        println!("  ▸ {profile}");
    }
}
