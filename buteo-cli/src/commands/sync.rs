//! `buteo start`, `start-category`, `abort` and `running`.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use buteo_core::{Category, ProfileId};

use crate::session::{block_on, Session};
use crate::GlobalArgs;

/// Arguments for `buteo start`.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Profile id to sync.
    pub profile: String,
}

impl StartArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let profile = ProfileId::from(self.profile);
        let started = block_on(async {
            let (session, _) = Session::connect(global).await?;
            let started = session
                .handle
                .start_sync(profile.clone())
                .await
                .context("failed to request sync")?;
            session.settle().await?;
            session.close().await?;
            Ok(started)
        })?;

        if !started {
            bail!("could not request sync for '{profile}'");
        }
        println!("✓ sync requested for '{profile}'");
        Ok(())
    }
}

/// Arguments for `buteo start-category`.
#[derive(Args, Debug)]
pub struct StartCategoryArgs {
    /// Category whose enabled profiles should sync.
    pub category: String,
}

impl StartCategoryArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let category = Category::from(self.category);
        let (started, profiles) = block_on(async {
            let (session, _) = Session::connect(global).await?;
            let profiles = session
                .handle
                .sync_profiles_by_category(category.clone())
                .await
                .context("failed to read category profiles")?;
            let started = session
                .handle
                .start_sync_by_category(category.clone())
                .await
                .context("failed to request category sync")?;
            session.settle().await?;
            session.close().await?;
            Ok((started, profiles))
        })?;

        if !started {
            bail!("could not start every profile in '{category}'");
        }
        if profiles.is_empty() {
            println!("'{category}' has no enabled profiles; nothing to sync");
            return Ok(());
        }
        println!("✓ sync requested for {} profiles in '{category}'", profiles.len());
        for profile in profiles {
            println!("  ▸ {profile}");
        }
        Ok(())
    }
}

/// Arguments for `buteo abort`.
#[derive(Args, Debug)]
pub struct AbortArgs {
    /// Profile id whose sync should stop.
    pub profile: String,
}

impl AbortArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let profile = ProfileId::from(self.profile);
        block_on(async {
            let (session, _) = Session::connect(global).await?;
            session
                .handle
                .abort_sync(profile.clone())
                .await
                .context("failed to request abort")?;
            session.settle().await?;
            session.close().await
        })?;

        println!("✓ abort requested for '{profile}'");
        Ok(())
    }
}

/// Arguments for `buteo running`.
#[derive(Args, Debug)]
pub struct RunningArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunningArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let running = block_on(async {
            let (session, _) = Session::connect(global).await?;
            let running = session
                .handle
                .running_sync_list()
                .await
                .context("failed to query running syncs")?;
            session.close().await?;
            Ok(running)
        })?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&running)
                    .context("failed to serialize running syncs JSON")?
            );
            return Ok(());
        }

        if running.is_empty() {
            println!("{}", "no syncs running".bright_black());
            return Ok(());
        }
        for profile in running {
            println!("{} {profile}", "▸".yellow().bold());
        }
        Ok(())
    }
}
