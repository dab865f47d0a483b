pub mod delete;
pub mod download;
pub mod metadata;
pub mod public_download;
pub mod upload;

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use ohsync_core::{size::parse_size, Config, Freshness};
use ohsync_remote::Credential;
use ohsync_transfer::DownloadReport;

// ---------------------------------------------------------------------------
// Shared arguments
// ---------------------------------------------------------------------------

/// Exactly one token: a project master token or a member token.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct AuthArgs {
    /// Project master access token (sees every member).
    #[arg(short = 'T', long, value_name = "TOKEN")]
    pub master_access_token: Option<String>,

    /// A single member's OAuth2 access token.
    #[arg(short = 't', long, value_name = "TOKEN")]
    pub access_token: Option<String>,
}

impl AuthArgs {
    pub fn credential(&self) -> Credential {
        match (&self.master_access_token, &self.access_token) {
            (Some(master), _) => Credential::Master(master.clone()),
            (None, Some(token)) => Credential::Member(token.clone()),
            (None, None) => Credential::Anonymous,
        }
    }

    pub fn is_member_token(&self) -> bool {
        self.access_token.is_some()
    }
}

/// Thin wrapper so clap can parse [`Freshness`] from CLI args.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessArg(pub Freshness);

impl FromStr for FreshnessArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "size" => Ok(Self(Freshness::Size)),
            "checksum" | "md5" => Ok(Self(Freshness::Checksum)),
            other => Err(format!(
                "unknown freshness '{other}'; expected: size, checksum"
            )),
        }
    }
}

impl fmt::Display for FreshnessArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// `--max-size` when given, else the configured limit.
pub fn max_bytes(config: &Config, flag: Option<&str>) -> Result<u64> {
    match flag {
        Some(size) => parse_size(size).with_context(|| format!("invalid --max-size '{size}'")),
        None => config.max_bytes().context("invalid max_size in config"),
    }
}

// ---------------------------------------------------------------------------
// Download reporting
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct DownloadRow {
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "status")]
    status: String,
}

/// Print the pool's results; fails when any file failed.
pub fn print_download_report(report: &DownloadReport) -> Result<()> {
    let mut rows: Vec<(usize, DownloadRow)> = report
        .completed
        .iter()
        .map(|c| {
            (
                c.index,
                DownloadRow {
                    file: c.descriptor.label.clone(),
                    status: c.outcome.label().to_string(),
                },
            )
        })
        .chain(report.failed.iter().map(|f| {
            (
                f.index,
                DownloadRow {
                    file: f.descriptor.label.clone(),
                    status: format!("failed: {}", f.error),
                },
            )
        }))
        .collect();
    rows.sort_by_key(|(index, _)| *index);

    if rows.is_empty() {
        println!("Nothing to download.");
        return Ok(());
    }

    let mut table = Table::new(rows.into_iter().map(|(_, row)| row));
    table.with(Style::rounded());
    println!("{table}");

    if report.is_success() {
        println!(
            "{} {} files processed",
            "✓".green().bold(),
            report.completed.len()
        );
        Ok(())
    } else {
        anyhow::bail!(
            "{} of {} downloads failed",
            report.failed.len(),
            report.completed.len() + report.failed.len()
        )
    }
}
