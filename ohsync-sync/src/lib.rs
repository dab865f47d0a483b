//! # ohsync-sync
//!
//! Directory-to-remote reconciliation.
//!
//! [`scanner`] characterizes local files, [`manifest`] reads and writes the
//! metadata CSV, [`plan`] decides what to upload or delete and [`apply`]
//! carries the plan out against a [`remote::RemoteStore`]. Call
//! [`pipeline::upload_directory`] to run the whole thing.

pub mod apply;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod plan;
pub mod remote;
pub mod review;
pub mod scanner;
pub mod validate;

pub use apply::{ApplyReport, FileOutcome, FileReport};
pub use error::{MismatchError, RowError, SyncError};
pub use pipeline::{upload_directory, UploadRequest};
pub use plan::{Action, Plan, SkipReason, UploadMode};
pub use remote::{MemoryStore, RemoteStore, UploadMetadata};
pub use review::{review, Diagnostic, ReviewReport};
pub use scanner::{draft_manifest, LocalInventory};
