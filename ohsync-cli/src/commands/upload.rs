//! `ohsync upload`: reconcile a directory with the remote project files.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use ohsync_core::{Config, Freshness, MemberId};
use ohsync_remote::OhClient;
use ohsync_sync::{upload_directory, ApplyReport, FileOutcome, UploadMode, UploadRequest};

use super::{max_bytes, AuthArgs, FreshnessArg};

/// Arguments for `ohsync upload`.
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Directory to upload: plain files, or one folder per member id.
    #[arg(short = 'd', long)]
    pub directory: PathBuf,

    /// Metadata CSV describing every file in the directory.
    #[arg(long, value_name = "CSV")]
    pub metadata_csv: PathBuf,

    #[command(flatten)]
    pub auth: AuthArgs,

    /// Target member for a directory without member folders.
    #[arg(short = 'm', long = "project-member-id", value_name = "ID")]
    pub member: Option<String>,

    /// Only upload files that are not on the server yet.
    #[arg(long)]
    pub safe: bool,

    /// Also delete remote files missing from the metadata CSV.
    #[arg(long)]
    pub sync: bool,

    /// Largest file to upload, e.g. 128m (default from config).
    #[arg(long, value_name = "SIZE")]
    pub max_size: Option<String>,

    /// How to decide a remote file is already up to date: size or checksum.
    #[arg(long, value_name = "MODE")]
    pub freshness: Option<FreshnessArg>,

    /// Show what would be uploaded or deleted without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl UploadArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        let mode = UploadMode::from_flags(self.safe, self.sync)?;
        let freshness = self.freshness.map_or(config.freshness, |f| f.0);
        let request = UploadRequest {
            directory: self.directory,
            manifest_path: self.metadata_csv,
            mode,
            member: self.member.map(MemberId::from),
            max_bytes: max_bytes(config, self.max_size.as_deref())?,
            freshness,
            dry_run: self.dry_run,
        };

        let client = OhClient::new(config, self.auth.credential())
            .with_size_lookup(freshness == Freshness::Size);
        let reports = upload_directory(&client, &request).with_context(|| {
            format!("upload of '{}' failed", request.directory.display())
        })?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&reports).context("failed to serialize upload JSON")?
            );
        } else {
            print_reports(&reports, mode);
        }

        let failed: usize = reports.iter().map(|r| r.failures().count()).sum();
        if failed > 0 {
            anyhow::bail!("{failed} files failed to transfer");
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn print_reports(reports: &[ApplyReport], mode: UploadMode) {
    for report in reports {
        let prefix = if report.dry_run { "[dry-run] " } else { "" };
        let marker = if report.has_failures() {
            "✗".red().bold()
        } else {
            "✓".green().bold()
        };
        if report.files.is_empty() {
            println!("{prefix}{marker} member {}: nothing to do", report.member);
            continue;
        }

        println!(
            "{prefix}{marker} member {} ({mode} mode): {} uploaded, {} deleted, {} skipped, {} failed",
            report.member,
            report.count("uploaded") + report.count("would upload"),
            report.count("deleted") + report.count("would delete"),
            report.count("skipped"),
            report.count("failed"),
        );
        let rows: Vec<FileRow> = report
            .files
            .iter()
            .map(|f| FileRow {
                file: f.filename.clone(),
                status: status_marker(&f.outcome),
                detail: f.outcome.detail(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }
}

fn status_marker(outcome: &FileOutcome) -> String {
    let symbol = match outcome {
        FileOutcome::Uploaded { .. } | FileOutcome::WouldUpload => "↑",
        FileOutcome::Deleted | FileOutcome::WouldDelete => "-",
        FileOutcome::Skipped(_) => "·",
        FileOutcome::Failed(_) => "✗",
    };
    format!("{symbol} {}", outcome.label())
}
