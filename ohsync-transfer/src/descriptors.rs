//! Turn remote listings into download jobs with local target paths.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ohsync_core::{MemberData, MemberId, PublicFileRecord};

/// One file to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadDescriptor {
    pub url: String,
    pub target: PathBuf,
    /// Human-readable name for logs and reports.
    pub label: String,
    /// Size reported by the listing, used when the fetch does not report one.
    pub expected_size: Option<u64>,
}

/// Which of a member's files to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberFiles {
    /// Files shared with the project from other sources. With `source`,
    /// only that source, written flat into the member directory; otherwise
    /// one subdirectory per source.
    Shared { source: Option<String> },
    /// The project's own files.
    Project,
}

/// Apply allow/deny lists to the visible members, keeping their order.
pub fn select_members(
    visible: impl IntoIterator<Item = MemberId>,
    memberlist: Option<&[MemberId]>,
    excludelist: Option<&[MemberId]>,
) -> Vec<MemberId> {
    let allow: Option<BTreeSet<&MemberId>> = memberlist.map(|l| l.iter().collect());
    let deny: BTreeSet<&MemberId> = excludelist.unwrap_or_default().iter().collect();
    visible
        .into_iter()
        .filter(|member| {
            if allow.as_ref().is_some_and(|a| !a.contains(member)) {
                tracing::debug!("skipping {member}, not in memberlist");
                return false;
            }
            if deny.contains(member) {
                tracing::debug!("skipping {member}, in excludelist");
                return false;
            }
            true
        })
        .collect()
}

/// Download jobs for one member's files, written under `member_dir`.
///
/// Duplicate basenames resolve to the newest record; with `id_filename`
/// files are keyed `{id}.{basename}` and every record is kept.
pub fn member_descriptors(
    member_dir: &Path,
    data: &MemberData,
    files: &MemberFiles,
    id_filename: bool,
) -> Vec<DownloadDescriptor> {
    let describe = |key: &str, target: PathBuf, record: &ohsync_core::RemoteFileRecord| {
        DownloadDescriptor {
            url: record.download_url.clone(),
            target,
            label: format!("{}/{key}", data.member_id),
            expected_size: record.size,
        }
    };

    match files {
        MemberFiles::Project => data
            .project_files_keyed(id_filename)
            .iter()
            .map(|(key, record)| describe(key, member_dir.join(key), record))
            .collect(),
        MemberFiles::Shared { source: None } => data
            .shared_files(id_filename)
            .iter()
            .map(|(key, record)| describe(key, member_dir.join(&record.source).join(key), record))
            .collect(),
        MemberFiles::Shared {
            source: Some(source),
        } => data
            .shared_files(id_filename)
            .iter()
            .filter(|(_, record)| &record.source == source)
            .map(|(key, record)| describe(key, member_dir.join(key), record))
            .collect(),
    }
}

/// Download jobs for public data results: `{user_id}-{basename}` in
/// `directory`.
pub fn public_descriptors(directory: &Path, records: &[PublicFileRecord]) -> Vec<DownloadDescriptor> {
    records
        .iter()
        .filter_map(|record| {
            let basename = url_basename(&record.download_url);
            if basename.is_empty() {
                tracing::warn!("no filename in download url {}", record.download_url);
                return None;
            }
            let filename = format!("{}-{basename}", record.user_id);
            Some(DownloadDescriptor {
                url: record.download_url.clone(),
                target: directory.join(&filename),
                label: filename,
                expected_size: None,
            })
        })
        .collect()
}

/// Last path segment of a URL with any query string removed.
pub fn url_basename(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query.rsplit('/').next().unwrap_or(without_query)
}
