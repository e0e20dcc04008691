// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::http::{HttpClient, status_reason};

/// Issue a single GET against the API and decode its JSON envelope.
///
/// Non-2xx statuses, empty bodies and undecodable bodies each map to their
/// own error; nothing is retried.
pub(crate) async fn fetch_json<C, T>(client: &C, url: &Url) -> Result<T, ApiError>
where
    C: HttpClient + ?Sized,
    T: DeserializeOwned,
{
    let url = url.as_str();
    debug!(url, "Calling API");

    let response = client
        .get_bytes(url)
        .await
        .map_err(|e| ApiError::from_transport(url, e))?;

    if !response.is_success() {
        return Err(ApiError::Status {
            status: response.status,
            message: status_reason(response.status),
        });
    }

    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::EmptyResponse {
            url: url.to_string(),
        });
    }

    serde_json::from_slice(&response.body).map_err(|e| ApiError::Malformed {
        url: url.to_string(),
        source: e,
    })
}
