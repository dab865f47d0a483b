//! ohsync: keep Open Humans project data in step with local directories.
//!
//! # Usage
//!
//! ```text
//! ohsync upload -d <dir> --metadata-csv <csv> (-T <master> | -t <token>) [-m <member>] [--safe | --sync] [--dry-run]
//! ohsync metadata <dir> (--create-csv <out> | --review <csv>)
//! ohsync download -d <dir> (-T <master> | -t <token>) [-m <member>] [--source <s> | --project-data]
//! ohsync public-download [-s <source>] [-u <username>] [-d <dir>]
//! ohsync delete (-T <master> | -t <token>) -m <member> (--basename <b> | --file-id <id> | --all)
//! ```

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    delete::DeleteArgs, download::DownloadArgs, metadata::MetadataArgs,
    public_download::PublicDownloadArgs, upload::UploadArgs,
};
use ohsync_core::{config, Config};
use ohsync_transfer::logging::{init_tracing, level_for};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "ohsync",
    version,
    about = "Upload, review and download Open Humans project data",
    long_about = None,
)]
struct Cli {
    /// Log progress to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log every request and decision.
    #[arg(long, global = true)]
    debug: bool,

    /// Open Humans server to talk to (overrides the config file).
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile a local directory with a member's project files.
    Upload(UploadArgs),

    /// Draft or review a metadata CSV for a directory.
    Metadata(MetadataArgs),

    /// Download member data with a project or member token.
    Download(DownloadArgs),

    /// Download public data sets.
    PublicDownload(PublicDownloadArgs),

    /// Delete project files for a member.
    Delete(DeleteArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(level_for(cli.verbose, cli.debug));

    let mut config: Config = config::load().context("failed to load ~/.ohsync/config.yaml")?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    match cli.command {
        Commands::Upload(args) => args.run(&config),
        Commands::Metadata(args) => args.run(&config),
        Commands::Download(args) => args.run(&config),
        Commands::PublicDownload(args) => args.run(&config),
        Commands::Delete(args) => args.run(&config),
    }
}
