//! [`RemoteStore`] over the Open Humans direct-sharing API.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;

use ohsync_core::{
    Config, DeleteSelector, MemberData, MemberId, MemberSummary, RemoteError, TransferError,
};
use ohsync_sync::{RemoteStore, UploadMetadata};
use ohsync_transfer::{FetchResponse, Fetcher};

use crate::wire::{self, DirectUpload, ExchangeMember, Page, WireMember};

const MEMBERS_PATH: &str = "/api/direct-sharing/project/members/";
const EXCHANGE_MEMBER_PATH: &str = "/api/direct-sharing/project/exchange-member/";
const UPLOAD_DIRECT_PATH: &str = "/api/direct-sharing/project/files/upload/direct/";
const UPLOAD_COMPLETE_PATH: &str = "/api/direct-sharing/project/files/upload/complete/";
const DELETE_PATH: &str = "/api/direct-sharing/project/files/delete/";

/// Which token the client holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Project master access token: sees every member.
    Master(String),
    /// One member's OAuth2 access token.
    Member(String),
    /// No token; only public data is reachable.
    Anonymous,
}

impl Credential {
    pub fn token(&self) -> &str {
        match self {
            Credential::Master(token) | Credential::Member(token) => token,
            Credential::Anonymous => "",
        }
    }
}

pub struct OhClient {
    agent: ureq::Agent,
    base_url: String,
    credential: Credential,
    lookup_sizes: bool,
    /// Member listing, dropped for a member whenever its files change.
    cache: Mutex<Option<BTreeMap<MemberId, MemberData>>>,
}

impl OhClient {
    pub fn new(config: &Config, credential: Credential) -> Self {
        Self {
            agent: build_agent(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credential,
            lookup_sizes: true,
            cache: Mutex::new(None),
        }
    }

    /// Whether [`RemoteStore::member_data`] fetches the size of every
    /// project-owned file. Only size-based freshness needs it.
    pub fn with_size_lookup(mut self, lookup: bool) -> Self {
        self.lookup_sizes = lookup;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn agent(&self) -> &ureq::Agent {
        &self.agent
    }

    /// A fetcher sharing this client's connection pool.
    pub fn fetcher(&self) -> HttpFetcher {
        HttpFetcher {
            agent: self.agent.clone(),
        }
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET `url` and decode JSON. `with_token` adds `access_token`; `next`
    /// links from paginated responses already carry it.
    pub(crate) fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        with_token: bool,
    ) -> Result<T, RemoteError> {
        tracing::debug!("GET {}", redact(url));
        let mut request = self.agent.get(url);
        if with_token {
            request = request.query("access_token", self.credential.token());
        }
        let response = request.call().map_err(map_error)?;
        response.into_json().map_err(decode_err)
    }

    fn members(&self) -> Result<BTreeMap<MemberId, MemberData>, RemoteError> {
        let mut cache = self.lock_cache();
        if let Some(members) = cache.as_ref() {
            return Ok(members.clone());
        }
        let fetched = match &self.credential {
            Credential::Master(_) => self.fetch_project_members()?,
            Credential::Member(_) => {
                let data = self.exchange_member(&self.api_url(EXCHANGE_MEMBER_PATH), true)?;
                BTreeMap::from([(data.member_id.clone(), data)])
            }
            Credential::Anonymous => BTreeMap::new(),
        };
        *cache = Some(fetched.clone());
        Ok(fetched)
    }

    fn fetch_project_members(&self) -> Result<BTreeMap<MemberId, MemberData>, RemoteError> {
        let mut out = BTreeMap::new();
        let mut page: Page<WireMember> = self.get_json(&self.api_url(MEMBERS_PATH), true)?;
        let mut counter = 1;
        loop {
            tracing::info!("retrieved member page {counter}");
            for member in page.results {
                let data = match &member.exchange_member {
                    Some(url) if member.data.len() < member.file_count => {
                        tracing::debug!(
                            "member {} lists {} of {} files, fetching the rest",
                            member.project_member_id,
                            member.data.len(),
                            member.file_count
                        );
                        let mut full = self.exchange_member(url, false)?;
                        full.member_id = MemberId::from(member.project_member_id.as_str());
                        full.sources_shared = member.sources_shared;
                        full
                    }
                    _ => wire::member_data(
                        &member.project_member_id,
                        member.sources_shared,
                        member.data,
                    ),
                };
                out.insert(data.member_id.clone(), data);
            }
            let Some(next) = page.next else { break };
            page = self.get_json(&next, false)?;
            counter += 1;
        }
        Ok(out)
    }

    /// Follow an exchange-member listing through every `next` page.
    fn exchange_member(&self, url: &str, with_token: bool) -> Result<MemberData, RemoteError> {
        let mut page: ExchangeMember = self.get_json(url, with_token)?;
        let member_id = page.project_member_id.clone().unwrap_or_default();
        let sources_shared = std::mem::take(&mut page.sources_shared);
        let mut files = std::mem::take(&mut page.data);
        while let Some(next) = page.next.take() {
            page = self.get_json(&next, false)?;
            files.append(&mut page.data);
        }
        Ok(wire::member_data(&member_id, sources_shared, files))
    }

    /// Byte size of a remote file from the `Content-Length` of a GET whose
    /// body is never read.
    fn remote_size(&self, url: &str) -> Option<u64> {
        match self.agent.get(url).call() {
            Ok(response) => content_length(&response),
            Err(err) => {
                tracing::debug!("size lookup failed for {}: {err}", redact(url));
                None
            }
        }
    }

    /// PUT the body to the presigned storage URL. The API host has already
    /// answered by now, so a broken connection fails only this file.
    fn put_object(&self, url: &str, body: &mut dyn Read, size: u64) -> Result<(), RemoteError> {
        let put = self
            .agent
            .put(url)
            .set("Content-Length", &size.to_string())
            .send(body)
            .map_err(|err| match err {
                ureq::Error::Transport(transport) => {
                    RemoteError::Interrupted(format!("{}: {transport}", redact(url)))
                }
                status => map_error(status),
            })?;
        expect_status(put, 200)?;
        Ok(())
    }

    fn invalidate(&self, member: &MemberId) {
        if let Some(members) = self.lock_cache().as_mut() {
            members.remove(member);
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, Option<BTreeMap<MemberId, MemberData>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
        expected: u16,
    ) -> Result<ureq::Response, RemoteError> {
        let response = self
            .agent
            .post(&self.api_url(path))
            .query("access_token", self.credential.token())
            .send_form(form)
            .map_err(map_error)?;
        expect_status(response, expected)
    }
}

impl RemoteStore for OhClient {
    fn list_members(&self) -> Result<Vec<MemberSummary>, RemoteError> {
        Ok(self
            .members()?
            .into_values()
            .map(|data| MemberSummary {
                file_count: data.files.len(),
                member_id: data.member_id,
                sources_shared: data.sources_shared,
            })
            .collect())
    }

    fn member_data(&self, member: &MemberId) -> Result<MemberData, RemoteError> {
        let mut members = self.members()?;
        if !members.contains_key(member) {
            // Dropped from the cache after a mutation: refetch.
            *self.lock_cache() = None;
            members = self.members()?;
        }
        let mut data = members.remove(member).ok_or_else(|| RemoteError::Status {
            code: 404,
            body: format!("member {member} is not visible to this token"),
        })?;

        if self.lookup_sizes {
            let shared = data.sources_shared.clone();
            for record in data.files.iter_mut().filter(|r| !shared.contains(&r.source)) {
                record.size = self.remote_size(&record.download_url);
            }
        }
        Ok(data)
    }

    fn upload(
        &self,
        member: &MemberId,
        filename: &str,
        body: &mut dyn Read,
        size: u64,
        metadata: &UploadMetadata,
    ) -> Result<String, RemoteError> {
        if size == 0 {
            return Err(RemoteError::Status {
                code: 400,
                body: TransferError::EmptyFile.to_string(),
            });
        }
        let metadata =
            serde_json::to_string(metadata).map_err(|e| RemoteError::Decode(e.to_string()))?;

        let direct = self.post_form(
            UPLOAD_DIRECT_PATH,
            &[
                ("project_member_id", member.as_str()),
                ("metadata", &metadata),
                ("filename", filename),
            ],
            201,
        )?;
        let direct: DirectUpload = direct.into_json().map_err(decode_err)?;
        let file_id = wire::id_string(&direct.id);

        tracing::debug!("PUT {} bytes for {filename}", size);
        self.put_object(&direct.url, body, size)?;

        self.post_form(
            UPLOAD_COMPLETE_PATH,
            &[("project_member_id", member.as_str()), ("file_id", &file_id)],
            200,
        )?;
        self.invalidate(member);
        tracing::info!("upload complete: {filename}");
        Ok(file_id)
    }

    fn delete(&self, member: &MemberId, selector: &DeleteSelector) -> Result<(), RemoteError> {
        let (key, value) = delete_field(selector);
        self.post_form(
            DELETE_PATH,
            &[("project_member_id", member.as_str()), (key, value)],
            200,
        )?;
        self.invalidate(member);
        tracing::info!("deleted {selector} for member {member}");
        Ok(())
    }
}

/// The single form field that picks the delete target.
pub(crate) fn delete_field(selector: &DeleteSelector) -> (&'static str, &str) {
    match selector {
        DeleteSelector::Basename(name) => ("file_basename", name),
        DeleteSelector::Id(id) => ("file_id", id),
        DeleteSelector::All => ("all_files", "true"),
    }
}

// ---------------------------------------------------------------------------
// Downloads
// ---------------------------------------------------------------------------

/// Plain HTTP GET [`Fetcher`]; see [`OhClient::fetcher`].
#[derive(Clone)]
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl Fetcher for HttpFetcher {
    fn open(&self, url: &str) -> Result<FetchResponse, RemoteError> {
        let response = self.agent.get(url).call().map_err(map_error)?;
        Ok(FetchResponse {
            size: content_length(&response),
            body: Box::new(response.into_reader()),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_agent(timeout_secs: u64) -> ureq::Agent {
    let timeout = Duration::from_secs(timeout_secs);
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}

fn content_length(response: &ureq::Response) -> Option<u64> {
    response
        .header("Content-Length")
        .and_then(|value| value.trim().parse().ok())
}

/// Non-2xx answers become [`RemoteError::Status`]; anything that never got
/// an answer is [`RemoteError::Unreachable`].
pub(crate) fn map_error(err: ureq::Error) -> RemoteError {
    match err {
        ureq::Error::Status(code, response) => RemoteError::Status {
            code,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => RemoteError::Unreachable(transport.to_string()),
    }
}

fn expect_status(response: ureq::Response, expected: u16) -> Result<ureq::Response, RemoteError> {
    if response.status() == expected {
        return Ok(response);
    }
    Err(RemoteError::Status {
        code: response.status(),
        body: response.into_string().unwrap_or_default(),
    })
}

fn decode_err(err: std::io::Error) -> RemoteError {
    RemoteError::Decode(err.to_string())
}

/// Drop the query string so tokens and signatures stay out of logs.
pub(crate) fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(DeleteSelector::Basename("a.json".into()), ("file_basename", "a.json"))]
    #[case(DeleteSelector::Id("17".into()), ("file_id", "17"))]
    #[case(DeleteSelector::All, ("all_files", "true"))]
    fn delete_sends_exactly_one_selector(
        #[case] selector: DeleteSelector,
        #[case] expected: (&str, &str),
    ) {
        assert_eq!(delete_field(&selector), expected);
    }

    #[test]
    fn status_errors_keep_code_and_body() {
        let response = ureq::Response::new(403, "Forbidden", "bad token").unwrap();
        match map_error(ureq::Error::Status(403, response)) {
            RemoteError::Status { code, body } => {
                assert_eq!(code, 403);
                assert_eq!(body, "bad token");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn unexpected_success_code_is_status_error() {
        let response = ureq::Response::new(200, "OK", "{}").unwrap();
        let err = expect_status(response, 201).unwrap_err();
        assert!(matches!(err, RemoteError::Status { code: 200, .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let config = Config {
            base_url: "http://localhost:8000/".to_string(),
            ..Config::default()
        };
        let client = OhClient::new(&config, Credential::Master("t".into()));
        assert_eq!(
            client.api_url(MEMBERS_PATH),
            "http://localhost:8000/api/direct-sharing/project/members/"
        );
    }

    #[test]
    fn redact_strips_tokens() {
        assert_eq!(
            redact("https://oh/api/x/?access_token=secret"),
            "https://oh/api/x/"
        );
    }

    #[test]
    fn broken_storage_put_fails_only_the_file() {
        let config = Config {
            timeout_secs: 2,
            ..Config::default()
        };
        let client = OhClient::new(&config, Credential::Master("t".into()));
        let err = client
            .put_object("http://127.0.0.1:9/bucket/a.json?X-Amz-Signature=s", &mut &b"abc"[..], 3)
            .unwrap_err();
        assert!(matches!(err, RemoteError::Interrupted(_)), "{err:?}");
        assert!(!err.is_fatal());
        assert!(!err.to_string().contains("X-Amz-Signature"));
        assert!(matches!(TransferError::from(err), TransferError::Network(_)));
    }

    #[test]
    fn unreachable_host_is_fatal() {
        let config = Config {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..Config::default()
        };
        let client = OhClient::new(&config, Credential::Master("t".into()));
        let err = client.list_members().unwrap_err();
        assert!(err.is_fatal(), "{err:?}");
    }
}
