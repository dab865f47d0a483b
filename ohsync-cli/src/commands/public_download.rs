//! `ohsync public-download [-s <source>] [-u <username>] [-d <dir>]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use ohsync_core::Config;
use ohsync_remote::{Credential, OhClient};
use ohsync_transfer::{download_all, public_descriptors, DEFAULT_WORKERS};

use super::{max_bytes, print_download_report};

/// Arguments for `ohsync public-download`.
#[derive(Args, Debug)]
pub struct PublicDownloadArgs {
    /// Only data from this source.
    #[arg(short = 's', long)]
    pub source: Option<String>,

    /// Only data shared by this user.
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Target directory; created when missing.
    #[arg(short = 'd', long, default_value = ".")]
    pub directory: PathBuf,

    /// Skip files above this size (default from config).
    #[arg(long, value_name = "SIZE")]
    pub max_size: Option<String>,
}

impl PublicDownloadArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let limit = max_bytes(config, self.max_size.as_deref())?;
        let client = OhClient::new(config, Credential::Anonymous);
        let records = client
            .list_public_files(self.source.as_deref(), self.username.as_deref())
            .context("could not list public data")?;

        std::fs::create_dir_all(&self.directory)
            .with_context(|| format!("could not create '{}'", self.directory.display()))?;
        let descriptors = public_descriptors(&self.directory, &records);
        let report = download_all(
            Arc::new(client.fetcher()),
            descriptors,
            DEFAULT_WORKERS,
            limit,
        )?;
        print_download_report(&report)
    }
}
