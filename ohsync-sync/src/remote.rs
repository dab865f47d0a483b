//! The remote store seam.
//!
//! [`RemoteStore`] is the contract the reconciliation engine needs from the
//! data-hosting service. The HTTP implementation lives in `ohsync-remote`;
//! [`MemoryStore`] keeps everything in process for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use serde::Serialize;

use ohsync_core::{
    DeleteSelector, ManifestEntry, MemberData, MemberId, MemberSummary, RemoteError,
    RemoteFileRecord,
};

/// Metadata sent alongside an uploaded file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadMetadata {
    pub description: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl From<&ManifestEntry> for UploadMetadata {
    fn from(entry: &ManifestEntry) -> Self {
        Self {
            description: entry.description.clone().unwrap_or_default(),
            tags: entry.tags.clone(),
            md5: entry.checksum.clone(),
            creation_date: entry.creation_date.clone(),
            start_date: entry.start_date.clone(),
            end_date: entry.end_date.clone(),
            extra: entry.extra.clone(),
        }
    }
}

/// Operations the engine needs from the remote service.
///
/// Implementations classify failures: [`RemoteError::Unreachable`] aborts the
/// whole run, every other variant fails only the file at hand.
pub trait RemoteStore {
    /// Members visible to the credential.
    fn list_members(&self) -> Result<Vec<MemberSummary>, RemoteError>;

    /// Shared sources and files for one member.
    fn member_data(&self, member: &MemberId) -> Result<MemberData, RemoteError>;

    /// Upload `size` bytes from `body` as `filename`, returning the new file id.
    fn upload(
        &self,
        member: &MemberId,
        filename: &str,
        body: &mut dyn Read,
        size: u64,
        metadata: &UploadMetadata,
    ) -> Result<String, RemoteError>;

    fn delete(&self, member: &MemberId, selector: &DeleteSelector) -> Result<(), RemoteError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A [`RemoteStore`] held entirely in memory.
///
/// Uploads record size and MD5 the way the real service reports them, and
/// new records get strictly increasing creation times so "newest wins"
/// collapsing behaves deterministically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    members: BTreeMap<MemberId, MemberData>,
    metadata: BTreeMap<String, UploadMetadata>,
    next_id: u64,
    rejected_names: BTreeSet<String>,
    interrupted_names: BTreeSet<String>,
    unreachable: bool,
    uploads: usize,
    deletes: usize,
}

/// Project source label given to records created through [`MemoryStore`].
pub const MEMORY_PROJECT_SOURCE: &str = "direct-sharing-0";

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member with the given shared sources.
    pub fn with_member(self, member: impl Into<MemberId>, sources_shared: &[&str]) -> Self {
        let member = member.into();
        self.lock().members.insert(
            member.clone(),
            MemberData {
                member_id: member,
                sources_shared: sources_shared.iter().map(|s| s.to_string()).collect(),
                files: Vec::new(),
            },
        );
        self
    }

    /// Seed a remote record for a registered member.
    pub fn insert_file(&self, member: &MemberId, record: RemoteFileRecord) {
        if let Some(data) = self.lock().members.get_mut(member) {
            data.files.push(record);
        }
    }

    /// Make every upload of `filename` fail with a non-fatal rejection.
    pub fn reject_uploads_named(&self, filename: &str) {
        self.lock().rejected_names.insert(filename.to_string());
    }

    /// Make every upload of `filename` break off mid-transfer.
    pub fn interrupt_uploads_named(&self, filename: &str) {
        self.lock().interrupted_names.insert(filename.to_string());
    }

    /// Make every call fail as if the service could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Current records for a member, in insertion order.
    pub fn files(&self, member: &MemberId) -> Vec<RemoteFileRecord> {
        self.lock()
            .members
            .get(member)
            .map(|d| d.files.clone())
            .unwrap_or_default()
    }

    /// Metadata recorded for an uploaded file id.
    pub fn metadata(&self, file_id: &str) -> Option<UploadMetadata> {
        self.lock().metadata.get(file_id).cloned()
    }

    /// Number of successful upload and delete calls so far.
    pub fn mutation_counts(&self) -> (usize, usize) {
        let state = self.lock();
        (state.uploads, state.deletes)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryState {
    fn check_reachable(&self) -> Result<(), RemoteError> {
        if self.unreachable {
            return Err(RemoteError::Unreachable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn member_mut(&mut self, member: &MemberId) -> Result<&mut MemberData, RemoteError> {
        self.members.get_mut(member).ok_or_else(|| unknown(member))
    }
}

fn unknown(member: &MemberId) -> RemoteError {
    RemoteError::Status {
        code: 404,
        body: format!("unknown member {member}"),
    }
}

impl RemoteStore for MemoryStore {
    fn list_members(&self) -> Result<Vec<MemberSummary>, RemoteError> {
        let state = self.lock();
        state.check_reachable()?;
        Ok(state
            .members
            .values()
            .map(|d| MemberSummary {
                member_id: d.member_id.clone(),
                sources_shared: d.sources_shared.clone(),
                file_count: d.files.len(),
            })
            .collect())
    }

    fn member_data(&self, member: &MemberId) -> Result<MemberData, RemoteError> {
        let state = self.lock();
        state.check_reachable()?;
        state.members.get(member).cloned().ok_or_else(|| unknown(member))
    }

    fn upload(
        &self,
        member: &MemberId,
        filename: &str,
        body: &mut dyn Read,
        size: u64,
        metadata: &UploadMetadata,
    ) -> Result<String, RemoteError> {
        let mut content = Vec::new();
        body.read_to_end(&mut content)?;

        let mut state = self.lock();
        state.check_reachable()?;
        if state.interrupted_names.contains(filename) {
            return Err(RemoteError::Interrupted(format!(
                "connection reset while sending {filename}"
            )));
        }
        if state.rejected_names.contains(filename) {
            return Err(RemoteError::Status {
                code: 400,
                body: format!("upload of {filename} rejected"),
            });
        }
        if content.len() as u64 != size {
            return Err(RemoteError::Status {
                code: 400,
                body: format!("expected {size} bytes, received {}", content.len()),
            });
        }

        state.next_id += 1;
        let id = state.next_id.to_string();
        let created_at = Utc
            .timestamp_opt(1_500_000_000 + state.next_id as i64, 0)
            .single()
            .unwrap_or_default();
        let record = RemoteFileRecord {
            id: id.clone(),
            basename: filename.to_string(),
            source: MEMORY_PROJECT_SOURCE.to_string(),
            created_at,
            download_url: format!("memory://{member}/{id}/{filename}"),
            size: Some(size),
            checksum: Some(hex::encode(md5::compute(&content).0)),
        };
        state.member_mut(member)?.files.push(record);
        state.metadata.insert(id.clone(), metadata.clone());
        state.uploads += 1;
        Ok(id)
    }

    fn delete(&self, member: &MemberId, selector: &DeleteSelector) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.check_reachable()?;
        let data = state.member_mut(member)?;
        let shared: BTreeSet<String> = data.sources_shared.iter().cloned().collect();
        data.files.retain(|record| {
            if shared.contains(&record.source) {
                return true;
            }
            match selector {
                DeleteSelector::Basename(name) => &record.basename != name,
                DeleteSelector::Id(id) => &record.id != id,
                DeleteSelector::All => false,
            }
        });
        state.deletes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member() -> MemberId {
        MemberId::from("01234567")
    }

    #[test]
    fn upload_records_size_checksum_and_metadata() {
        let store = MemoryStore::new().with_member("01234567", &[]);
        let meta = UploadMetadata {
            description: "greeting".to_string(),
            tags: vec!["txt".to_string()],
            ..UploadMetadata::default()
        };
        let id = store
            .upload(&member(), "a.txt", &mut &b"hello"[..], 5, &meta)
            .unwrap();
        let files = store.files(&member());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, Some(5));
        assert_eq!(
            files[0].checksum.as_deref(),
            Some("5d41402abc4b2a76b9719d911017c592")
        );
        assert_eq!(store.metadata(&id), Some(meta));
    }

    #[test]
    fn later_uploads_are_newer() {
        let store = MemoryStore::new().with_member("01234567", &[]);
        let meta = UploadMetadata::default();
        store.upload(&member(), "a", &mut &b"1"[..], 1, &meta).unwrap();
        let second = store.upload(&member(), "a", &mut &b"22"[..], 2, &meta).unwrap();
        let data = store.member_data(&member()).unwrap();
        assert_eq!(data.project_files()["a"].id, second);
    }

    #[test]
    fn delete_leaves_shared_files_alone() {
        let store = MemoryStore::new().with_member("01234567", &["other-project"]);
        store.insert_file(
            &member(),
            RemoteFileRecord {
                id: "9".to_string(),
                basename: "a".to_string(),
                source: "other-project".to_string(),
                ..RemoteFileRecord::default()
            },
        );
        store
            .upload(&member(), "a", &mut &b"x"[..], 1, &UploadMetadata::default())
            .unwrap();
        store.delete(&member(), &DeleteSelector::All).unwrap();
        let files = store.files(&member());
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "9");
    }

    #[test]
    fn unreachable_is_fatal_and_unknown_member_is_not() {
        let store = MemoryStore::new();
        assert!(!store.member_data(&member()).unwrap_err().is_fatal());
        store.set_unreachable(true);
        assert!(store.list_members().unwrap_err().is_fatal());
    }

    #[test]
    fn metadata_serializes_without_empty_optionals() {
        let mut entry = ManifestEntry::new("a.json");
        entry.description = Some("d".to_string());
        entry.tags = vec!["json".to_string()];
        entry.extra.insert("lab".to_string(), "wet".to_string());
        let json = serde_json::to_value(UploadMetadata::from(&entry)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"description": "d", "tags": ["json"], "lab": "wet"})
        );
    }
}
