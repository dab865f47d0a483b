//! Domain types shared by the scanner, the manifest codec, the reconciliation
//! engine and the remote adapters.
//!
//! All filesystem paths use `PathBuf`; filenames inside a member scope are
//! plain `String`s because they double as reconciliation keys.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A project member identifier (eight ASCII digits when well formed).
///
/// Construction never validates: manifests and directory listings may carry
/// malformed ids that must be reported, not rejected on sight. Use
/// [`MemberId::is_well_formed`] at the validation boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    /// `true` when the id matches `^[0-9]{8}$`.
    pub fn is_well_formed(&self) -> bool {
        is_member_id(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `true` when `value` matches `^[0-9]{8}$`.
pub fn is_member_id(value: &str) -> bool {
    value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for MemberId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Local inventory
// ---------------------------------------------------------------------------

/// One regular file found by a directory scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFileRecord {
    pub name: String,
    pub size: u64,
    /// Lowercase hex MD5 of the full file content.
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    /// Advisory only; never overrides a manifest tag list.
    pub inferred_tags: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Intended remote metadata for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    /// `None` when the manifest has no `description` column at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    #[serde(rename = "md5", skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Any further named column, mapped 1:1.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ManifestEntry {
    /// Entry with the given filename, no description column and no tags.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }
}

/// Entries for one subject, keyed by filename.
pub type SubjectManifest = BTreeMap<String, ManifestEntry>;

/// A loaded manifest in one of its two concrete shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    /// Keyed directly by filename (header starts with `filename`).
    Single(SubjectManifest),
    /// Keyed by member id, then filename (header starts with
    /// `project_member_id,filename`). A member whose only row was the
    /// "no files" sentinel maps to an empty [`SubjectManifest`].
    Multi(BTreeMap<MemberId, SubjectManifest>),
}

impl Manifest {
    pub fn shape(&self) -> ManifestShape {
        match self {
            Manifest::Single(_) => ManifestShape::Single,
            Manifest::Multi(_) => ManifestShape::Multi,
        }
    }

    /// Total number of file entries across all subjects.
    pub fn file_count(&self) -> usize {
        match self {
            Manifest::Single(entries) => entries.len(),
            Manifest::Multi(members) => members.values().map(BTreeMap::len).sum(),
        }
    }
}

/// Discriminant of [`Manifest`], useful in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestShape {
    Single,
    Multi,
}

impl fmt::Display for ManifestShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestShape::Single => write!(f, "single-subject"),
            ManifestShape::Multi => write!(f, "multi-subject"),
        }
    }
}

// ---------------------------------------------------------------------------
// Remote inventory
// ---------------------------------------------------------------------------

/// A file as reported by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileRecord {
    pub id: String,
    pub basename: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub download_url: String,
    /// Byte size, when the store exposes it.
    #[serde(default)]
    pub size: Option<u64>,
    /// Lowercase hex MD5, when the store exposes it.
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Everything the store knows about one member's files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberData {
    pub member_id: MemberId,
    #[serde(default)]
    pub sources_shared: Vec<String>,
    #[serde(default)]
    pub files: Vec<RemoteFileRecord>,
}

impl MemberData {
    /// Files owned by the project itself: any record whose source is not one
    /// of the member's shared sources. Duplicate basenames keep the newest.
    pub fn project_files(&self) -> BTreeMap<String, RemoteFileRecord> {
        self.collapse(|r| !self.is_shared(r), false)
    }

    /// Files shared from other sources, collapsed like [`Self::project_files`].
    ///
    /// With `id_filename`, keys become `"{id}.{basename}"` so same-named files
    /// from different uploads do not collapse.
    pub fn shared_files(&self, id_filename: bool) -> BTreeMap<String, RemoteFileRecord> {
        self.collapse(|r| self.is_shared(r), id_filename)
    }

    /// Project-owned files keyed like [`Self::shared_files`].
    pub fn project_files_keyed(&self, id_filename: bool) -> BTreeMap<String, RemoteFileRecord> {
        self.collapse(|r| !self.is_shared(r), id_filename)
    }

    fn is_shared(&self, record: &RemoteFileRecord) -> bool {
        self.sources_shared.iter().any(|s| s == &record.source)
    }

    fn collapse(
        &self,
        keep: impl Fn(&RemoteFileRecord) -> bool,
        id_filename: bool,
    ) -> BTreeMap<String, RemoteFileRecord> {
        let mut out: BTreeMap<String, RemoteFileRecord> = BTreeMap::new();
        for record in self.files.iter().filter(|r| keep(r)) {
            let key = if id_filename {
                format!("{}.{}", record.id, record.basename)
            } else {
                record.basename.clone()
            };
            match out.get(&key) {
                Some(existing) if existing.created_at >= record.created_at => {}
                _ => {
                    out.insert(key, record.clone());
                }
            }
        }
        out
    }
}

/// Row of a member listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub member_id: MemberId,
    #[serde(default)]
    pub sources_shared: Vec<String>,
    #[serde(default)]
    pub file_count: usize,
}

/// One result of the public data listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicFileRecord {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub source: String,
    pub download_url: String,
}

/// Which remote files a delete call targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteSelector {
    Basename(String),
    Id(String),
    All,
}

impl fmt::Display for DeleteSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteSelector::Basename(name) => write!(f, "basename '{name}'"),
            DeleteSelector::Id(id) => write!(f, "file id {id}"),
            DeleteSelector::All => write!(f, "all files"),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy enums
// ---------------------------------------------------------------------------

/// How the engine decides a remote file already satisfies a local one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Same byte size means "already uploaded".
    #[default]
    Size,
    /// Same MD5 means "already uploaded"; unknown remote checksum uploads.
    Checksum,
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Size => write!(f, "size"),
            Freshness::Checksum => write!(f, "checksum"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(id: &str, basename: &str, source: &str, minutes: i64) -> RemoteFileRecord {
        RemoteFileRecord {
            id: id.to_string(),
            basename: basename.to_string(),
            source: source.to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minutes),
            download_url: format!("https://files.example/{id}"),
            size: None,
            checksum: None,
        }
    }

    #[test]
    fn member_id_format() {
        assert!(MemberId::from("01234567").is_well_formed());
        assert!(!MemberId::from("1234567").is_well_formed());
        assert!(!MemberId::from("0123456a").is_well_formed());
        assert!(!MemberId::from("012345678").is_well_formed());
    }

    #[test]
    fn newtype_display() {
        assert_eq!(MemberId::from("01234567").to_string(), "01234567");
    }

    #[test]
    fn project_files_exclude_shared_sources_and_keep_newest() {
        let data = MemberData {
            member_id: MemberId::from("01234567"),
            sources_shared: vec!["direct-sharing-1".to_string()],
            files: vec![
                record("1", "a.json", "direct-sharing-9", 0),
                record("2", "a.json", "direct-sharing-9", 5),
                record("3", "b.json", "direct-sharing-1", 0),
            ],
        };
        let project = data.project_files();
        assert_eq!(project.len(), 1);
        assert_eq!(project["a.json"].id, "2");

        let shared = data.shared_files(false);
        assert_eq!(shared.keys().collect::<Vec<_>>(), vec!["b.json"]);
    }

    #[test]
    fn id_filename_keys_do_not_collapse() {
        let data = MemberData {
            member_id: MemberId::from("01234567"),
            sources_shared: vec!["s".to_string()],
            files: vec![record("1", "a.json", "s", 0), record("2", "a.json", "s", 1)],
        };
        let shared = data.shared_files(true);
        assert_eq!(
            shared.keys().cloned().collect::<Vec<_>>(),
            vec!["1.a.json".to_string(), "2.a.json".to_string()]
        );
    }

    #[test]
    fn manifest_file_count() {
        let mut members = BTreeMap::new();
        members.insert(MemberId::from("00000001"), SubjectManifest::new());
        let mut two = SubjectManifest::new();
        two.insert("a".to_string(), ManifestEntry::new("a"));
        members.insert(MemberId::from("00000002"), two);
        let manifest = Manifest::Multi(members);
        assert_eq!(manifest.file_count(), 1);
        assert_eq!(manifest.shape(), ManifestShape::Multi);
    }

    #[test]
    fn freshness_display() {
        assert_eq!(Freshness::Size.to_string(), "size");
        assert_eq!(Freshness::Checksum.to_string(), "checksum");
    }
}
