//! `buteo profiles` and `buteo remove`: the profile cache.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use buteo_core::{Category, ProfileId, ProfileIndex};

use crate::session::{block_on, Session};
use crate::GlobalArgs;

/// Arguments for `buteo profiles`.
#[derive(Args, Debug)]
pub struct ProfilesArgs {
    /// Only show profiles of this category.
    #[arg(long)]
    pub category: Option<String>,

    /// Hide disabled profiles.
    #[arg(long)]
    pub enabled: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
struct ProfileRow {
    #[tabled(rename = "category")]
    category: String,
    #[tabled(rename = "profile")]
    profile: String,
    #[tabled(rename = "enabled")]
    enabled: bool,
}

impl ProfilesArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let index = block_on(async {
            let (session, snapshot) = Session::connect(global).await?;
            session.close().await?;
            Ok(snapshot.index)
        })?;

        let category = self.category.map(Category::from);
        let rows = collect_rows(&index, category.as_ref(), self.enabled);
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize profiles JSON")?
            );
            return Ok(());
        }

        if rows.is_empty() {
            println!("No sync profiles.");
            return Ok(());
        }
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn collect_rows(index: &ProfileIndex, category: Option<&Category>, only_enabled: bool) -> Vec<ProfileRow> {
    index
        .iter()
        .filter(|(cat, _)| category.map_or(true, |wanted| *cat == wanted))
        .filter(|(_, entry)| !only_enabled || entry.enabled)
        .map(|(cat, entry)| ProfileRow {
            category: cat.to_string(),
            profile: entry.id.to_string(),
            enabled: entry.enabled,
        })
        .collect()
}

/// Arguments for `buteo remove`.
#[derive(Args, Debug)]
pub struct RemoveArgs {
    /// Profile id to delete.
    pub profile: String,
}

impl RemoveArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let profile = ProfileId::from(self.profile);
        let removed = block_on(async {
            let (session, _) = Session::connect(global).await?;
            let removed = session
                .handle
                .remove_profile(profile.clone())
                .await
                .context("failed to remove profile")?;
            session.close().await?;
            Ok(removed)
        })?;

        if !removed {
            bail!("daemon did not remove profile '{profile}'");
        }
        println!("✓ removed '{profile}'");
        Ok(())
    }
}
