// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use tracing::debug;

use crate::error::ApiError;
use crate::http::HttpClient;

use super::endpoint::ApiEndpoint;
use super::fetch::fetch_json;
use super::types::{DetailEnvelope, FileDetails};

/// Resolves a file title to its direct download URL
pub struct DetailResolver<C: ?Sized> {
    client: Arc<C>,
    endpoint: ApiEndpoint,
}

impl<C: ?Sized> Clone for DetailResolver<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            endpoint: self.endpoint.clone(),
        }
    }
}

impl<C: HttpClient + ?Sized> DetailResolver<C> {
    pub fn new(client: Arc<C>, endpoint: ApiEndpoint) -> Self {
        Self { client, endpoint }
    }

    /// Look up the first page for `identifier` and its first file URL.
    ///
    /// An envelope without pages, or whose first page carries no image info,
    /// is reported as [`ApiError::NotFound`].
    pub async fn resolve_details(&self, identifier: &str) -> Result<FileDetails, ApiError> {
        let url = self.endpoint.details_url(identifier);
        let envelope: DetailEnvelope = fetch_json(self.client.as_ref(), &url).await?;

        if let Some(error) = envelope.error {
            return Err(ApiError::Remote {
                code: error.code,
                info: error.info,
            });
        }

        let page = envelope
            .query
            .and_then(|q| q.pages.into_iter().next())
            .ok_or_else(|| ApiError::NotFound {
                what: "pages",
                identifier: identifier.to_string(),
            })?;

        let info = page
            .imageinfo
            .into_iter()
            .next()
            .and_then(|info| info.url.map(|url| (url, info.descriptionurl)))
            .ok_or_else(|| ApiError::NotFound {
                what: "file URL",
                identifier: identifier.to_string(),
            })?;

        let (direct_url, description_url) = info;
        debug!(identifier, %direct_url, "Resolved file details");

        Ok(FileDetails {
            title: page.title,
            direct_url,
            description_url,
        })
    }
}
