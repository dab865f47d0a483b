//! `ohsync download`: fetch member data through the worker pool.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use ohsync_core::{id_list::read_id_list, Config, MemberId};
use ohsync_remote::OhClient;
use ohsync_sync::RemoteStore;
use ohsync_transfer::{download_all, member_descriptors, select_members, MemberFiles};

use super::{max_bytes, print_download_report, AuthArgs};

/// Arguments for `ohsync download`.
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Target directory; created when missing.
    #[arg(short = 'd', long)]
    pub directory: PathBuf,

    #[command(flatten)]
    pub auth: AuthArgs,

    /// Download a single member's data straight into the directory.
    #[arg(short = 'm', long = "project-member-id", value_name = "ID")]
    pub member: Option<String>,

    /// Only files from this source, written without a source folder.
    #[arg(long, conflicts_with = "project_data")]
    pub source: Option<String>,

    /// Download the files this project uploaded instead of shared sources.
    #[arg(long)]
    pub project_data: bool,

    /// File of member ids to include, one per line.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["member", "excludelist", "access_token"])]
    pub memberlist: Option<PathBuf>,

    /// File of member ids to skip, one per line.
    #[arg(long, value_name = "FILE", conflicts_with_all = ["member", "access_token"])]
    pub excludelist: Option<PathBuf>,

    /// Name files `{id}.{basename}` and keep every version.
    #[arg(long)]
    pub id_filename: bool,

    /// Skip files above this size (default from config).
    #[arg(long, value_name = "SIZE")]
    pub max_size: Option<String>,

    /// Concurrent downloads (default from config).
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,
}

impl DownloadArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let limit = max_bytes(config, self.max_size.as_deref())?;
        let memberlist = self
            .memberlist
            .as_deref()
            .map(read_id_list)
            .transpose()
            .context("could not read --memberlist")?;
        let excludelist = self
            .excludelist
            .as_deref()
            .map(read_id_list)
            .transpose()
            .context("could not read --excludelist")?;

        let client = OhClient::new(config, self.auth.credential()).with_size_lookup(false);
        let visible: Vec<MemberId> = client
            .list_members()
            .context("could not list members")?
            .into_iter()
            .map(|summary| summary.member_id)
            .collect();

        let single = self.member.is_some() || self.auth.is_member_token();
        let members = match &self.member {
            Some(member) => {
                let member = MemberId::from(member.as_str());
                if !visible.contains(&member) {
                    anyhow::bail!("member {member} is not visible to this token");
                }
                vec![member]
            }
            None => select_members(visible, memberlist.as_deref(), excludelist.as_deref()),
        };

        let files = if self.project_data {
            MemberFiles::Project
        } else {
            MemberFiles::Shared {
                source: self.source.clone(),
            }
        };

        let mut descriptors = Vec::new();
        for member in &members {
            let data = client
                .member_data(member)
                .with_context(|| format!("could not list files for member {member}"))?;
            let member_dir = if single {
                self.directory.clone()
            } else {
                self.directory.join(member.as_str())
            };
            descriptors.extend(member_descriptors(
                &member_dir,
                &data,
                &files,
                self.id_filename,
            ));
        }

        std::fs::create_dir_all(&self.directory)
            .with_context(|| format!("could not create '{}'", self.directory.display()))?;
        let workers = self.workers.unwrap_or(config.workers);
        let report = download_all(Arc::new(client.fetcher()), descriptors, workers, limit)?;
        print_download_report(&report)
    }
}
