//! Shared upload pipeline entrypoint used by the CLI.
//!
//! Every local check (manifest, layout, file sets, metadata) runs before the
//! first remote call, so a bad directory never causes a partial upload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ohsync_core::{Freshness, Manifest, ManifestShape, MemberId, MemberSummary, SubjectManifest};

use crate::apply::{apply, ApplyReport};
use crate::error::{shape_err, MismatchError, SyncError};
use crate::manifest;
use crate::plan::{check_matches, plan, UploadMode};
use crate::remote::RemoteStore;
use crate::scanner::{detect_layout, scan, Layout, LocalInventory};
use crate::validate::validate_subject;

/// Inputs for one upload run.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub directory: PathBuf,
    pub manifest_path: PathBuf,
    pub mode: UploadMode,
    /// Target member for a single-subject directory.
    pub member: Option<MemberId>,
    pub max_bytes: u64,
    pub freshness: Freshness,
    pub dry_run: bool,
}

/// One subject, checked locally and ready to plan.
struct Prepared {
    /// `None` for a single-subject directory until the target is resolved.
    member: Option<MemberId>,
    directory: PathBuf,
    inventory: LocalInventory,
    entries: SubjectManifest,
}

/// Upload a directory. Returns one report per member, in member id order.
pub fn upload_directory(
    store: &dyn RemoteStore,
    request: &UploadRequest,
) -> Result<Vec<ApplyReport>, SyncError> {
    let prepared = prepare(request)?;

    let visible = store.list_members()?;
    let targets = resolve_targets(request, prepared, &visible)?;

    let mut reports = Vec::with_capacity(targets.len());
    for (member, subject) in targets {
        let data = store.member_data(&member)?;
        let remote = data.project_files();
        let plan = plan(
            &subject.inventory,
            &subject.entries,
            &remote,
            request.mode,
            request.freshness,
            request.max_bytes,
        )?;
        tracing::info!(
            "member {member}: {} to upload, {} to delete, {} skipped, {} over the size limit",
            plan.uploads().count(),
            plan.deletes().count(),
            plan.skipped.len(),
            plan.rejected.len()
        );
        reports.push(apply(
            store,
            &member,
            &subject.directory,
            &subject.entries,
            &plan,
            request.dry_run,
        )?);
    }
    Ok(reports)
}

/// Load, scan and validate everything without touching the network.
fn prepare(request: &UploadRequest) -> Result<Vec<Prepared>, SyncError> {
    if let Some(member) = &request.member {
        if !member.is_well_formed() {
            return Err(SyncError::Layout(format!(
                "member id must be eight digits, found '{member}'"
            )));
        }
    }

    let parsed = manifest::load(&request.manifest_path)?;
    let layout = detect_layout(&request.directory)?;

    match (layout, parsed) {
        (Layout::Single, Manifest::Single(entries)) => {
            let subject = prepare_subject(None, &request.directory, entries, request.max_bytes)?;
            Ok(vec![subject])
        }
        (Layout::Multi(members), Manifest::Multi(mut listed)) => {
            if request.member.is_some() {
                return Err(SyncError::Layout(
                    "a member-specific upload cannot use member subfolders".to_string(),
                ));
            }
            let mut out = Vec::with_capacity(members.len());
            for member in members {
                let entries = listed.remove(&member).unwrap_or_default();
                let directory = request.directory.join(member.as_str());
                out.push(prepare_subject(
                    Some(member),
                    &directory,
                    entries,
                    request.max_bytes,
                )?);
            }
            check_leftovers(listed)?;
            Ok(out)
        }
        (Layout::Single, Manifest::Multi(_)) => Err(shape_err(
            ManifestShape::Single,
            ManifestShape::Multi,
            "a directory without member subfolders",
        )),
        (Layout::Multi(_), Manifest::Single(_)) => Err(shape_err(
            ManifestShape::Multi,
            ManifestShape::Single,
            "a directory of member subfolders",
        )),
    }
}

fn prepare_subject(
    member: Option<MemberId>,
    directory: &Path,
    entries: SubjectManifest,
    max_bytes: u64,
) -> Result<Prepared, SyncError> {
    let inventory = scan(directory, max_bytes)?;
    check_matches(member.as_ref(), &inventory, &entries)?;
    validate_subject(member.as_ref(), &entries)?;
    Ok(Prepared {
        member,
        directory: directory.to_path_buf(),
        inventory,
        entries,
    })
}

/// Manifest members without a folder are fine only if they list no files.
fn check_leftovers(listed: BTreeMap<MemberId, SubjectManifest>) -> Result<(), SyncError> {
    for (member, entries) in listed {
        if !entries.is_empty() {
            return Err(MismatchError {
                member: Some(member),
                local_only: Default::default(),
                manifest_only: entries.into_keys().collect(),
            }
            .into());
        }
    }
    Ok(())
}

fn resolve_targets(
    request: &UploadRequest,
    prepared: Vec<Prepared>,
    visible: &[MemberSummary],
) -> Result<Vec<(MemberId, Prepared)>, SyncError> {
    let is_visible = |m: &MemberId| visible.iter().any(|s| &s.member_id == m);
    let mut out = Vec::with_capacity(prepared.len());
    for subject in prepared {
        let member = match (&subject.member, &request.member) {
            (Some(member), _) => member.clone(),
            (None, Some(requested)) => requested.clone(),
            (None, None) => match visible {
                [only] => only.member_id.clone(),
                _ => {
                    return Err(SyncError::MemberRequired {
                        visible: visible.len(),
                    })
                }
            },
        };
        if !is_visible(&member) {
            return Err(SyncError::UnknownMember(member));
        }
        out.push((member, subject));
    }
    Ok(out)
}
