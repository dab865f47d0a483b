//! Bulk transfer runtime: download jobs, the bounded worker pool and log
//! setup for the `ohsync` binary.

pub mod descriptors;
pub mod download;
mod error;
pub mod logging;
pub mod pool;

pub use descriptors::{
    member_descriptors, public_descriptors, select_members, DownloadDescriptor, MemberFiles,
};
pub use download::{download_file, DownloadOutcome, FetchResponse, Fetcher};
pub use error::PoolError;
pub use pool::{download_all, run_pool, DownloadReport, DEFAULT_WORKERS};
