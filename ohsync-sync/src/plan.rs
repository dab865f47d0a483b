//! Reconciliation: decide which uploads and deletes bring a member's remote
//! file set in line with a local directory and its manifest.
//!
//! Planning is pure. Nothing here touches the network or the filesystem.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use ohsync_core::{Freshness, LocalFileRecord, MemberId, RemoteFileRecord, SubjectManifest};

use crate::error::{MismatchError, SyncError};
use crate::scanner::LocalInventory;

/// Policy for files that already exist remotely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// Upload everything, replacing remote files unless they are already
    /// up to date by the chosen freshness check.
    #[default]
    Default,
    /// Never touch an existing remote file; upload only new names.
    Safe,
    /// Like `Default`, and delete remote files that are not in the manifest.
    Sync,
}

impl UploadMode {
    pub fn from_flags(safe: bool, sync: bool) -> Result<Self, SyncError> {
        match (safe, sync) {
            (true, true) => Err(SyncError::PolicyConflict),
            (true, false) => Ok(Self::Safe),
            (false, true) => Ok(Self::Sync),
            (false, false) => Ok(Self::Default),
        }
    }
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Safe => "safe",
            Self::Sync => "sync",
        })
    }
}

/// A single remote mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    /// Upload the local file. When `replaces` is set, that record is removed
    /// once the new upload has succeeded.
    Upload {
        filename: String,
        replaces: Option<RemoteFileRecord>,
    },
    /// Remove a remote file that no longer has a local counterpart.
    Delete { remote: RemoteFileRecord },
}

impl Action {
    pub fn filename(&self) -> &str {
        match self {
            Self::Upload { filename, .. } => filename,
            Self::Delete { remote } => &remote.basename,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Safe mode and the name exists remotely.
    RemoteExists,
    /// Remote size equals local size.
    SizeMatch,
    /// Remote MD5 equals local MD5.
    ChecksumMatch,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RemoteExists => "already exists remotely",
            Self::SizeMatch => "remote size matches",
            Self::ChecksumMatch => "remote checksum matches",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: SkipReason,
}

/// A local file that is over the size limit and will not be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedFile {
    pub filename: String,
    pub size: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Uploads in filename order, then deletes in filename order.
    pub actions: Vec<Action>,
    pub skipped: Vec<SkippedFile>,
    pub rejected: Vec<RejectedFile>,
}

impl Plan {
    pub fn uploads(&self) -> impl Iterator<Item = &Action> {
        self.actions
            .iter()
            .filter(|a| matches!(a, Action::Upload { .. }))
    }

    pub fn deletes(&self) -> impl Iterator<Item = &Action> {
        self.actions
            .iter()
            .filter(|a| matches!(a, Action::Delete { .. }))
    }
}

/// Local filenames and manifest filenames must be the same set.
pub fn check_matches(
    member: Option<&MemberId>,
    local: &LocalInventory,
    manifest: &SubjectManifest,
) -> Result<(), MismatchError> {
    let local_names = local.names();
    let local_only: std::collections::BTreeSet<String> = local_names
        .iter()
        .filter(|name| !manifest.contains_key(*name))
        .cloned()
        .collect();
    let manifest_only: std::collections::BTreeSet<String> = manifest
        .keys()
        .filter(|name| !local_names.contains(*name))
        .cloned()
        .collect();
    if local_only.is_empty() && manifest_only.is_empty() {
        return Ok(());
    }
    Err(MismatchError {
        member: member.cloned(),
        local_only,
        manifest_only,
    })
}

/// Build the plan for one subject.
///
/// `remote` is the member's project-owned files keyed by basename (see
/// [`ohsync_core::MemberData::project_files`]). `max_bytes` is the limit the
/// inventory was scanned with.
pub fn plan(
    local: &LocalInventory,
    manifest: &SubjectManifest,
    remote: &BTreeMap<String, RemoteFileRecord>,
    mode: UploadMode,
    freshness: Freshness,
    max_bytes: u64,
) -> Result<Plan, SyncError> {
    check_matches(None, local, manifest)?;
    let mut out = Plan::default();

    for filename in manifest.keys() {
        let existing = remote.get(filename);

        if mode == UploadMode::Safe && existing.is_some() {
            out.skipped.push(SkippedFile {
                filename: filename.clone(),
                reason: SkipReason::RemoteExists,
            });
            continue;
        }

        if let Some(size) = local.oversized.get(filename) {
            out.rejected.push(RejectedFile {
                filename: filename.clone(),
                size: *size,
                max: max_bytes,
            });
            continue;
        }

        // check_matches guarantees the file is either oversized or in `files`.
        let Some(record) = local.files.get(filename) else {
            continue;
        };
        if let Some(remote) = existing {
            if let Some(reason) = up_to_date(record, remote, freshness) {
                tracing::debug!("{filename}: {reason}, skipping");
                out.skipped.push(SkippedFile {
                    filename: filename.clone(),
                    reason,
                });
                continue;
            }
        }
        out.actions.push(Action::Upload {
            filename: filename.clone(),
            replaces: existing.cloned(),
        });
    }

    if mode == UploadMode::Sync {
        for (basename, record) in remote {
            if !manifest.contains_key(basename) {
                out.actions.push(Action::Delete {
                    remote: record.clone(),
                });
            }
        }
    }

    Ok(out)
}

fn up_to_date(
    local: &LocalFileRecord,
    remote: &RemoteFileRecord,
    freshness: Freshness,
) -> Option<SkipReason> {
    match freshness {
        Freshness::Size => (remote.size == Some(local.size)).then_some(SkipReason::SizeMatch),
        Freshness::Checksum => remote
            .checksum
            .as_deref()
            .filter(|sum| sum.eq_ignore_ascii_case(&local.checksum))
            .map(|_| SkipReason::ChecksumMatch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ohsync_core::ManifestEntry;

    fn local(files: &[(&str, u64, &str)]) -> LocalInventory {
        let mut inv = LocalInventory::default();
        for (name, size, sum) in files {
            inv.files.insert(
                name.to_string(),
                LocalFileRecord {
                    name: name.to_string(),
                    size: *size,
                    checksum: sum.to_string(),
                    created_at: Utc.timestamp_opt(0, 0).unwrap(),
                    inferred_tags: Default::default(),
                },
            );
        }
        inv
    }

    fn manifest(names: &[&str]) -> SubjectManifest {
        names
            .iter()
            .map(|n| (n.to_string(), ManifestEntry::new(*n)))
            .collect()
    }

    fn remote(files: &[(&str, Option<u64>, Option<&str>)]) -> BTreeMap<String, RemoteFileRecord> {
        files
            .iter()
            .enumerate()
            .map(|(i, (name, size, sum))| {
                let record = RemoteFileRecord {
                    id: format!("{}", i + 1),
                    basename: name.to_string(),
                    size: *size,
                    checksum: sum.map(str::to_string),
                    ..RemoteFileRecord::default()
                };
                (name.to_string(), record)
            })
            .collect()
    }

    #[test]
    fn flags_conflict() {
        assert!(matches!(
            UploadMode::from_flags(true, true),
            Err(SyncError::PolicyConflict)
        ));
        assert_eq!(UploadMode::from_flags(false, false).unwrap(), UploadMode::Default);
    }

    #[test]
    fn default_mode_uploads_everything_new() {
        let plan = plan(
            &local(&[("a", 1, "x"), ("b", 2, "y")]),
            &manifest(&["a", "b"]),
            &BTreeMap::new(),
            UploadMode::Default,
            Freshness::Size,
            100,
        )
        .unwrap();
        assert_eq!(plan.actions.len(), 2);
        assert_eq!(plan.uploads().count(), 2);
    }

    #[test]
    fn mismatch_is_reported_before_planning() {
        let err = plan(
            &local(&[("a", 1, "x"), ("b", 1, "x"), ("c", 1, "x")]),
            &manifest(&["a", "b"]),
            &BTreeMap::new(),
            UploadMode::Default,
            Freshness::Size,
            100,
        )
        .unwrap_err();
        match err {
            SyncError::Mismatch(m) => {
                assert_eq!(m.local_only.into_iter().collect::<Vec<_>>(), vec!["c"]);
                assert!(m.manifest_only.is_empty());
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn size_freshness_skips_equal_sizes_and_replaces_others() {
        let plan = plan(
            &local(&[("a", 5, "x"), ("b", 6, "y")]),
            &manifest(&["a", "b"]),
            &remote(&[("a", Some(5), None), ("b", Some(9), None)]),
            UploadMode::Default,
            Freshness::Size,
            100,
        )
        .unwrap();
        assert_eq!(
            plan.skipped,
            vec![SkippedFile {
                filename: "a".into(),
                reason: SkipReason::SizeMatch
            }]
        );
        match &plan.actions[..] {
            [Action::Upload { filename, replaces: Some(old) }] => {
                assert_eq!(filename, "b");
                assert_eq!(old.id, "2");
            }
            other => panic!("unexpected actions {other:?}"),
        }
    }

    #[test]
    fn checksum_freshness_needs_known_matching_sum() {
        let plan = plan(
            &local(&[("a", 5, "abc"), ("b", 5, "def"), ("c", 5, "000")]),
            &manifest(&["a", "b", "c"]),
            &remote(&[("a", Some(5), Some("ABC")), ("b", Some(5), None), ("c", Some(5), Some("111"))]),
            UploadMode::Default,
            Freshness::Checksum,
            100,
        )
        .unwrap();
        assert_eq!(plan.skipped.len(), 1);
        assert_eq!(plan.skipped[0].reason, SkipReason::ChecksumMatch);
        let uploads: Vec<&str> = plan.uploads().map(Action::filename).collect();
        assert_eq!(uploads, vec!["b", "c"]);
    }

    #[test]
    fn safe_mode_never_replaces_or_deletes() {
        let plan = plan(
            &local(&[("a", 5, "x"), ("new", 1, "y")]),
            &manifest(&["a", "new"]),
            &remote(&[("a", Some(99), None), ("stale", Some(1), None)]),
            UploadMode::Safe,
            Freshness::Size,
            100,
        )
        .unwrap();
        assert_eq!(plan.deletes().count(), 0);
        assert_eq!(
            plan.actions,
            vec![Action::Upload {
                filename: "new".into(),
                replaces: None
            }]
        );
        assert_eq!(plan.skipped[0].reason, SkipReason::RemoteExists);
    }

    #[test]
    fn sync_mode_deletes_unlisted_remote_files() {
        let plan = plan(
            &local(&[("a", 5, "x")]),
            &manifest(&["a"]),
            &remote(&[("a", Some(5), None), ("old", Some(1), None)]),
            UploadMode::Sync,
            Freshness::Size,
            100,
        )
        .unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].filename(), "old");
        assert!(matches!(plan.actions[0], Action::Delete { .. }));
    }

    #[test]
    fn oversized_files_are_rejected_not_uploaded() {
        let mut inv = local(&[("a", 5, "x")]);
        inv.oversized.insert("huge".into(), 500);
        let plan = plan(
            &inv,
            &manifest(&["a", "huge"]),
            &BTreeMap::new(),
            UploadMode::Default,
            Freshness::Size,
            100,
        )
        .unwrap();
        assert_eq!(plan.uploads().count(), 1);
        assert_eq!(
            plan.rejected,
            vec![RejectedFile {
                filename: "huge".into(),
                size: 500,
                max: 100
            }]
        );
    }
}
