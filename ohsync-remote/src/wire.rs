//! JSON shapes of the Open Humans API and their conversion to core types.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use ohsync_core::{MemberData, MemberId, PublicFileRecord, RemoteFileRecord};

/// A paginated listing: `{count, next, previous, results}`.
#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// One row of `project/members/`.
#[derive(Debug, Deserialize)]
pub(crate) struct WireMember {
    pub project_member_id: String,
    #[serde(default)]
    pub sources_shared: Vec<String>,
    #[serde(default)]
    pub file_count: usize,
    /// Per-member URL that pages through the full file list.
    #[serde(default)]
    pub exchange_member: Option<String>,
    #[serde(default)]
    pub data: Vec<WireFile>,
}

/// A page of `project/exchange-member/`.
#[derive(Debug, Deserialize)]
pub(crate) struct ExchangeMember {
    #[serde(default)]
    pub project_member_id: Option<String>,
    #[serde(default)]
    pub sources_shared: Vec<String>,
    #[serde(default)]
    pub data: Vec<WireFile>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireFile {
    pub id: Value,
    pub basename: String,
    #[serde(default)]
    pub source: String,
    pub created: DateTime<Utc>,
    pub download_url: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl WireFile {
    pub fn into_record(self) -> RemoteFileRecord {
        let checksum = self
            .metadata
            .as_ref()
            .and_then(|m| m.get("md5"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_lowercase);
        RemoteFileRecord {
            id: id_string(&self.id),
            basename: self.basename,
            source: self.source,
            created_at: self.created,
            download_url: self.download_url,
            size: None,
            checksum,
        }
    }
}

/// Response of `files/upload/direct/`.
#[derive(Debug, Deserialize)]
pub(crate) struct DirectUpload {
    pub url: String,
    pub id: Value,
}

/// One row of `/api/public-data/`.
#[derive(Debug, Deserialize)]
pub(crate) struct WirePublicFile {
    pub user: WireUser,
    #[serde(default)]
    pub source: String,
    pub download_url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireUser {
    pub id: Value,
    #[serde(default)]
    pub username: Option<String>,
}

impl WirePublicFile {
    pub fn into_record(self) -> PublicFileRecord {
        PublicFileRecord {
            user_id: id_string(&self.user.id),
            username: self.user.username,
            source: self.source,
            download_url: self.download_url,
        }
    }
}

/// Ids come back as numbers or strings depending on the endpoint.
pub(crate) fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn member_data(
    member_id: &str,
    sources_shared: Vec<String>,
    files: Vec<WireFile>,
) -> MemberData {
    MemberData {
        member_id: MemberId::from(member_id),
        sources_shared,
        files: files.into_iter().map(WireFile::into_record).collect(),
    }
}
