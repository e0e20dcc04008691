// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use tracing::debug;

use crate::error::ApiError;
use crate::http::HttpClient;

use super::endpoint::{ApiEndpoint, MEDIA_NAMESPACE};
use super::fetch::fetch_json;
use super::types::{SearchEnvelope, SearchHit, SearchResult};

/// File extensions the search keeps
pub const AUDIO_EXTENSIONS: [&str; 3] = ["ogg", "webm", "wav"];

/// Check whether a title names one of the recognized audio formats
pub fn is_audio_title(title: &str) -> bool {
    title
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| {
            !stem.is_empty() && AUDIO_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a))
        })
}

/// Keep only media-namespace hits whose titles are audio files
pub(crate) fn filter_audio_hits(hits: Vec<SearchHit>) -> Vec<SearchResult> {
    hits.into_iter()
        .filter(|hit| hit.ns == MEDIA_NAMESPACE)
        .filter_map(|hit| {
            let title = hit.title?;
            is_audio_title(&title).then_some(SearchResult {
                identifier: hit.pageid.unwrap_or(0),
                title,
                namespace: hit.ns,
            })
        })
        .collect()
}

/// Free-text search over the remote media repository
pub struct SearchClient<C: ?Sized> {
    client: Arc<C>,
    endpoint: ApiEndpoint,
}

impl<C: ?Sized> Clone for SearchClient<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl<C: HttpClient + ?Sized> SearchClient<C> {
    pub fn new(client: Arc<C>, endpoint: ApiEndpoint) -> Self {
        Self { client, endpoint }
    }

    /// Search for audio files matching `query`.
    ///
    /// A blank query returns an empty list without touching the network.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.endpoint.search_url(query);
        let envelope: SearchEnvelope = fetch_json(self.client.as_ref(), &url).await?;

        if let Some(error) = envelope.error {
            return Err(ApiError::Remote {
                code: error.code,
                info: error.info,
            });
        }

        let hits = envelope.query.map(|q| q.search).unwrap_or_default();
        let total = hits.len();
        let results = filter_audio_hits(hits);
        debug!(query, total, kept = results.len(), "Search completed");

        Ok(results)
    }
}
