//! Public data listing (`/api/public-data/`). Needs no token.

use ohsync_core::{PublicFileRecord, RemoteError};

use crate::client::{map_error, OhClient};
use crate::wire::{Page, WirePublicFile};

const PUBLIC_DATA_PATH: &str = "/api/public-data/";

impl OhClient {
    /// Every public file, optionally narrowed to one source and/or user.
    pub fn list_public_files(
        &self,
        source: Option<&str>,
        username: Option<&str>,
    ) -> Result<Vec<PublicFileRecord>, RemoteError> {
        tracing::info!("retrieving public data listing");
        let mut request = self.agent().get(&self.api_url(PUBLIC_DATA_PATH));
        if let Some(source) = source {
            request = request.query("source", source);
        }
        if let Some(username) = username {
            request = request.query("username", username);
        }
        let first = request.call().map_err(map_error)?;
        let mut page: Page<WirePublicFile> = first
            .into_json()
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        let mut results = Vec::new();
        let mut counter = 1;
        loop {
            tracing::info!("retrieved public data page {counter}");
            results.extend(page.results.into_iter().map(WirePublicFile::into_record));
            let Some(next) = page.next else { break };
            page = self.get_json(&next, false)?;
            counter += 1;
        }
        tracing::info!("{} public files listed", results.len());
        Ok(results)
    }
}
