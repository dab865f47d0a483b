//! Error types for ohsync-sync.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use ohsync_core::{ManifestShape, MemberId, RemoteError};

/// All fatal errors that can arise from scanning, manifest handling and
/// reconciliation. Per-file transfer failures are not errors at this level;
/// they travel in [`crate::apply::FileOutcome::Failed`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The manifest header is unusable (missing `tags`, wrong leading columns).
    #[error("manifest schema error: {0}")]
    Schema(String),

    /// A manifest row has the wrong shape or an empty key cell.
    #[error("manifest {0}")]
    Row(#[from] RowError),

    /// A manifest entry carries invalid metadata.
    #[error("invalid metadata for {}: {problem}", describe_entry(.member.as_ref(), .filename))]
    RowValidation {
        member: Option<MemberId>,
        filename: String,
        problem: String,
    },

    /// Local files and manifest entries disagree.
    #[error(transparent)]
    Mismatch(#[from] MismatchError),

    /// `safe` and `sync` requested together.
    #[error("safe and sync modes are mutually incompatible")]
    PolicyConflict,

    /// The directory layout cannot be used with the given manifest or options.
    #[error("layout error: {0}")]
    Layout(String),

    /// A single-subject upload with no way to pick the target member.
    #[error("no member specified and the credential can see {visible} members")]
    MemberRequired { visible: usize },

    /// A member directory that the remote store does not know.
    #[error("member {0} is not part of this project")]
    UnknownMember(MemberId),

    /// A fatal remote failure (unreachable store, rejected credential).
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding or decoding failure not tied to a row.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A row-level manifest problem. `row` is 1-based with the header as row 1.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row}: {message}")]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

/// Symmetric difference between local filenames and manifest filenames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct MismatchError {
    pub member: Option<MemberId>,
    /// On disk but not in the manifest.
    pub local_only: BTreeSet<String>,
    /// In the manifest but not on disk.
    pub manifest_only: BTreeSet<String>,
}

impl fmt::Display for MismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            Some(member) => write!(f, "manifest does not match files for member {member}")?,
            None => write!(f, "manifest does not match directory contents")?,
        }
        write!(
            f,
            " (local only: [{}]; manifest only: [{}])",
            join(&self.local_only),
            join(&self.manifest_only)
        )
    }
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Shape disagreement helper used by the pipeline and review.
pub(crate) fn shape_err(expected: ManifestShape, found: ManifestShape, why: &str) -> SyncError {
    SyncError::Layout(format!("{why} needs a {expected} manifest, found {found}"))
}

pub(crate) fn describe_entry(member: Option<&MemberId>, filename: &str) -> String {
    match member {
        Some(member) => format!("member {member}, file '{filename}'"),
        None => format!("file '{filename}'"),
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_lists_both_sides() {
        let err = MismatchError {
            member: Some(MemberId::from("01234567")),
            local_only: BTreeSet::from(["x.json".to_string()]),
            manifest_only: BTreeSet::from(["c.json".to_string(), "d.json".to_string()]),
        };
        let msg = err.to_string();
        assert!(msg.contains("01234567"));
        assert!(msg.contains("local only: [x.json]"));
        assert!(msg.contains("manifest only: [c.json, d.json]"));
    }

    #[test]
    fn row_validation_names_member_and_file() {
        let err = SyncError::RowValidation {
            member: Some(MemberId::from("01234567")),
            filename: "a.json".to_string(),
            problem: "\"description\" is required".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("member 01234567"));
        assert!(msg.contains("'a.json'"));
    }
}
