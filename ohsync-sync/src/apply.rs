//! Execute a [`Plan`] against a [`RemoteStore`].
//!
//! Per-file failures are recorded and the run continues. Only an unreachable
//! store aborts.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use ohsync_core::{
    transfer_io_err, DeleteSelector, MemberId, RemoteError, SubjectManifest, TransferError,
};

use crate::error::SyncError;
use crate::plan::{Action, Plan, SkipReason};
use crate::remote::{RemoteStore, UploadMetadata};

/// What happened to one file.
#[derive(Debug)]
pub enum FileOutcome {
    Uploaded { file_id: String },
    /// Dry run: the upload would have happened.
    WouldUpload,
    Skipped(SkipReason),
    Deleted,
    /// Dry run: the delete would have happened.
    WouldDelete,
    Failed(TransferError),
}

impl FileOutcome {
    /// Short label used by the CLI tables and JSON output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uploaded { .. } => "uploaded",
            Self::WouldUpload => "would upload",
            Self::Skipped(_) => "skipped",
            Self::Deleted => "deleted",
            Self::WouldDelete => "would delete",
            Self::Failed(_) => "failed",
        }
    }

    /// Detail text: the new file id, skip reason or failure.
    pub fn detail(&self) -> String {
        match self {
            Self::Uploaded { file_id } => format!("file id {file_id}"),
            Self::Skipped(reason) => reason.to_string(),
            Self::Failed(err) => err.to_string(),
            Self::WouldUpload | Self::Deleted | Self::WouldDelete => String::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl Serialize for FileOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut out = serializer.serialize_struct("FileOutcome", 2)?;
        out.serialize_field("status", self.label())?;
        out.serialize_field("detail", &self.detail())?;
        out.end()
    }
}

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub outcome: FileOutcome,
}

/// Outcome of applying one member's plan.
#[derive(Debug, Serialize)]
pub struct ApplyReport {
    pub member: MemberId,
    pub dry_run: bool,
    /// Sorted by filename.
    pub files: Vec<FileReport>,
}

impl ApplyReport {
    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.outcome.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Number of files whose outcome carries `label`.
    pub fn count(&self, label: &str) -> usize {
        self.files
            .iter()
            .filter(|f| f.outcome.label() == label)
            .count()
    }
}

/// Apply `plan` for `member`, reading upload bodies from `directory`.
///
/// Uploads that replace an existing record delete the old record by id only
/// after the new upload succeeded. With `dry_run`, nothing is sent.
pub fn apply(
    store: &dyn RemoteStore,
    member: &MemberId,
    directory: &Path,
    manifest: &SubjectManifest,
    plan: &Plan,
    dry_run: bool,
) -> Result<ApplyReport, SyncError> {
    let mut files = Vec::new();

    for rejected in &plan.rejected {
        tracing::warn!(
            "not uploading {}: {} bytes exceeds the {} byte limit",
            rejected.filename,
            rejected.size,
            rejected.max
        );
        files.push(FileReport {
            filename: rejected.filename.clone(),
            outcome: FileOutcome::Failed(TransferError::SizeExceeded {
                size: rejected.size,
                max: rejected.max,
            }),
        });
    }
    for skipped in &plan.skipped {
        tracing::info!("skipping {}: {}", skipped.filename, skipped.reason);
        files.push(FileReport {
            filename: skipped.filename.clone(),
            outcome: FileOutcome::Skipped(skipped.reason),
        });
    }

    for action in &plan.actions {
        let outcome = match action {
            Action::Upload { filename, .. } if dry_run => {
                tracing::info!("[dry-run] would upload {filename} for member {member}");
                FileOutcome::WouldUpload
            }
            Action::Delete { remote } if dry_run => {
                tracing::info!(
                    "[dry-run] would delete {} for member {member}",
                    remote.basename
                );
                FileOutcome::WouldDelete
            }
            Action::Upload { filename, replaces } => {
                let metadata = manifest
                    .get(filename)
                    .map(UploadMetadata::from)
                    .unwrap_or_default();
                let outcome = upload_one(store, member, directory, filename, &metadata)?;
                if let (FileOutcome::Uploaded { .. }, Some(old)) = (&outcome, replaces) {
                    remove_replaced(store, member, &old.id)?;
                }
                outcome
            }
            Action::Delete { remote } => {
                tracing::info!("deleting {} for member {member}", remote.basename);
                let selector = DeleteSelector::Basename(remote.basename.clone());
                match store.delete(member, &selector) {
                    Ok(()) => FileOutcome::Deleted,
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => FileOutcome::Failed(e.into()),
                }
            }
        };
        files.push(FileReport {
            filename: action.filename().to_string(),
            outcome,
        });
    }

    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(ApplyReport {
        member: member.clone(),
        dry_run,
        files,
    })
}

fn upload_one(
    store: &dyn RemoteStore,
    member: &MemberId,
    directory: &Path,
    filename: &str,
    metadata: &UploadMetadata,
) -> Result<FileOutcome, SyncError> {
    let path = directory.join(filename);
    let mut file = match File::open(&path) {
        Ok(file) => file,
        Err(e) => return Ok(FileOutcome::Failed(transfer_io_err(&path, e))),
    };
    let size = match file.metadata() {
        Ok(meta) => meta.len(),
        Err(e) => return Ok(FileOutcome::Failed(transfer_io_err(&path, e))),
    };
    if size == 0 {
        return Ok(FileOutcome::Failed(TransferError::EmptyFile));
    }

    tracing::info!("uploading {filename} ({size} bytes) for member {member}");
    match store.upload(member, filename, &mut file, size, metadata) {
        Ok(file_id) => {
            tracing::debug!("{filename} stored as file id {file_id}");
            Ok(FileOutcome::Uploaded { file_id })
        }
        Err(e) => classify(e, filename),
    }
}

fn remove_replaced(store: &dyn RemoteStore, member: &MemberId, id: &str) -> Result<(), SyncError> {
    match store.delete(member, &DeleteSelector::Id(id.to_string())) {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            // The new copy is in place; the stale one only shadows history.
            tracing::warn!("could not remove replaced file id {id}: {e}");
            Ok(())
        }
    }
}

fn classify(err: RemoteError, filename: &str) -> Result<FileOutcome, SyncError> {
    if err.is_fatal() {
        return Err(err.into());
    }
    tracing::warn!("upload of {filename} failed: {err}");
    Ok(FileOutcome::Failed(err.into()))
}
