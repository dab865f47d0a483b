//! `ohsync metadata <dir> (--create-csv <out> | --review <csv>)`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use colored::Colorize;

use ohsync_core::Config;
use ohsync_sync::{draft_manifest, manifest, review};

use super::max_bytes;

/// Draft a metadata CSV from a directory, or review an existing one.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("action").required(true).args(["create_csv", "review"])))]
pub struct MetadataArgs {
    /// Directory holding the files (or member folders) to describe.
    pub directory: PathBuf,

    /// Write a draft CSV with tags, md5 and creation dates filled in.
    #[arg(long, value_name = "OUT")]
    pub create_csv: Option<PathBuf>,

    /// Check a CSV against the directory and report every problem.
    #[arg(long, value_name = "CSV")]
    pub review: Option<PathBuf>,

    /// Files above this size are left out of a draft (default from config).
    #[arg(long, value_name = "SIZE")]
    pub max_size: Option<String>,
}

impl MetadataArgs {
    pub fn run(self, config: &Config) -> Result<()> {
        match (&self.create_csv, &self.review) {
            (Some(out), _) => self.create(config, out),
            (None, Some(csv)) => self.review(csv),
            (None, None) => anyhow::bail!("provide --create-csv or --review"),
        }
    }

    fn create(&self, config: &Config, out: &Path) -> Result<()> {
        let limit = max_bytes(config, self.max_size.as_deref())?;
        let draft = draft_manifest(&self.directory, limit).with_context(|| {
            format!("could not draft metadata for '{}'", self.directory.display())
        })?;
        manifest::write_to_path(&draft, out)
            .with_context(|| format!("could not write '{}'", out.display()))?;

        println!(
            "{} Wrote {} entries to {}",
            "✓".green().bold(),
            draft.file_count(),
            out.display()
        );
        println!("  Fill in the description column before uploading.");
        Ok(())
    }

    fn review(&self, csv: &Path) -> Result<()> {
        let report = review(&self.directory, csv)
            .with_context(|| format!("could not review '{}'", csv.display()))?;
        if report.is_valid() {
            println!("{} {} is valid", "✓".green().bold(), csv.display());
            return Ok(());
        }

        for diagnostic in &report.diagnostics {
            println!("{} {diagnostic}", "✗".red().bold());
        }
        anyhow::bail!(
            "{} problems found in '{}'",
            report.diagnostics.len(),
            csv.display()
        )
    }
}
