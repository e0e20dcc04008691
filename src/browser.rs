// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use crate::api::{ApiEndpoint, DetailResolver, FileDetails, SearchClient, SearchResult};
use crate::http::HttpClient;
use crate::request::{RequestFailure, RequestHandle, RequestSlot};

/// Search and detail lookups with observable request state.
///
/// A new search supersedes the previous search; a new detail lookup
/// supersedes the previous lookup. Dropping the browser aborts both.
pub struct SoundBrowser<C: ?Sized> {
    search: SearchClient<C>,
    details: DetailResolver<C>,
    search_slot: RequestSlot<Vec<SearchResult>>,
    details_slot: RequestSlot<FileDetails>,
}

impl<C: HttpClient + ?Sized + 'static> SoundBrowser<C> {
    pub fn new(client: Arc<C>, endpoint: ApiEndpoint) -> Self {
        Self {
            search: SearchClient::new(Arc::clone(&client), endpoint.clone()),
            details: DetailResolver::new(client, endpoint),
            search_slot: RequestSlot::new(),
            details_slot: RequestSlot::new(),
        }
    }

    pub fn search(&self, query: &str) -> RequestHandle<Vec<SearchResult>> {
        let client = self.search.clone();
        let query = query.to_string();
        self.search_slot.launch(async move {
            client.search(&query).await.map_err(RequestFailure::from)
        })
    }

    pub fn resolve_details(&self, identifier: &str) -> RequestHandle<FileDetails> {
        let resolver = self.details.clone();
        let identifier = identifier.to_string();
        self.details_slot.launch(async move {
            resolver
                .resolve_details(&identifier)
                .await
                .map_err(RequestFailure::from)
        })
    }
}
