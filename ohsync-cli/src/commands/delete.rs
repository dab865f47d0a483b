//! `ohsync delete`: remove project files for one member.

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use colored::Colorize;

use ohsync_core::{Config, DeleteSelector, MemberId};
use ohsync_remote::OhClient;
use ohsync_sync::RemoteStore;

use super::AuthArgs;

/// Arguments for `ohsync delete`.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["basename", "file_id", "all"])))]
pub struct DeleteArgs {
    #[command(flatten)]
    pub auth: AuthArgs,

    /// Member whose files are deleted.
    #[arg(short = 'm', long = "project-member-id", value_name = "ID")]
    pub member: String,

    /// Delete every file with this name.
    #[arg(long)]
    pub basename: Option<String>,

    /// Delete the file with this id.
    #[arg(long)]
    pub file_id: Option<String>,

    /// Delete all of the member's project files.
    #[arg(long)]
    pub all: bool,
}

impl DeleteArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let member = MemberId::from(self.member.as_str());
        if !member.is_well_formed() {
            anyhow::bail!("member id must be eight digits, found '{member}'");
        }
        let selector = match (self.basename.clone(), self.file_id.clone()) {
            (Some(basename), _) => DeleteSelector::Basename(basename),
            (None, Some(id)) => DeleteSelector::Id(id),
            (None, None) => DeleteSelector::All,
        };

        let client = OhClient::new(config, self.auth.credential()).with_size_lookup(false);
        client
            .delete(&member, &selector)
            .with_context(|| format!("could not delete {selector} for member {member}"))?;
        println!(
            "{} Deleted {selector} for member {member}",
            "✓".green().bold()
        );
        Ok(())
    }
}
