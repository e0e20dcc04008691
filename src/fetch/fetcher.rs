// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::{Catalog, CatalogEntry, NewCatalogEntry};
use crate::error::FetchError;
use crate::http::HttpClient;
use crate::progress::{NoopReporter, ProgressEvent, SharedProgressReporter};

use super::download::{partial_path_for, write_body};
use super::filename::{reserve_unique_path, storage_name_parts};

/// Downloads sounds into the storage root and records them in the catalog
pub struct Fetcher<C: ?Sized> {
    client: Arc<C>,
    catalog: Arc<dyn Catalog>,
    storage_root: PathBuf,
    reporter: SharedProgressReporter,
}

impl<C: HttpClient + ?Sized> Fetcher<C> {
    pub fn new(client: Arc<C>, catalog: Arc<dyn Catalog>, storage_root: impl Into<PathBuf>) -> Self {
        Self {
            client,
            catalog,
            storage_root: storage_root.into(),
            reporter: NoopReporter::shared(),
        }
    }

    pub fn with_reporter(mut self, reporter: SharedProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Download `url` into the storage root and catalog it under `display_name`.
    ///
    /// Nothing is written for non-success responses. On any failure after the
    /// target name was reserved, the reserved and partial files are removed.
    pub async fn fetch_and_catalog(
        &self,
        url: &str,
        display_name: &str,
    ) -> Result<CatalogEntry, FetchError> {
        let result = self.fetch_inner(url, display_name).await;
        if let Err(e) = &result {
            self.reporter.report(ProgressEvent::FetchFailed {
                display_name: display_name.to_string(),
                error: e.to_string(),
            });
        }
        result
    }

    async fn fetch_inner(&self, url: &str, display_name: &str) -> Result<CatalogEntry, FetchError> {
        debug!(url, display_name, "Fetching sound");

        let response = self
            .client
            .get_stream(url)
            .await
            .map_err(|e| FetchError::request_failed(url, e))?;

        if !(200..300).contains(&response.status) {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            });
        }

        tokio::fs::create_dir_all(&self.storage_root)
            .await
            .map_err(|e| FetchError::CreateDirectoryFailed {
                path: self.storage_root.clone(),
                source: e,
            })?;

        let (stem, ext) = storage_name_parts(display_name, url);
        let final_path = reserve_unique_path(&self.storage_root, &stem, &ext).map_err(|e| {
            FetchError::FileCreateFailed {
                path: self.storage_root.join(format!("{stem}.{ext}")),
                source: e,
            }
        })?;
        let partial_path = partial_path_for(&final_path);

        let written = write_body(response, url, &partial_path, display_name, &self.reporter).await;
        let bytes_downloaded = match written {
            Ok(0) => {
                discard(&[&partial_path, &final_path]).await;
                return Err(FetchError::EmptyPayload {
                    url: url.to_string(),
                });
            }
            Ok(bytes) => bytes,
            Err(e) => {
                discard(&[&partial_path, &final_path]).await;
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&partial_path, &final_path).await {
            discard(&[&partial_path, &final_path]).await;
            return Err(FetchError::FileWriteFailed {
                path: final_path,
                source: e,
            });
        }

        let entry = match self
            .catalog
            .insert_or_replace(&NewCatalogEntry::new(display_name, &final_path))
        {
            Ok(entry) => entry,
            Err(e) => {
                discard(&[&final_path]).await;
                return Err(FetchError::Catalog {
                    path: final_path,
                    source: e,
                });
            }
        };

        self.reporter.report(ProgressEvent::FetchCompleted {
            display_name: display_name.to_string(),
            bytes_downloaded,
            local_path: final_path,
        });

        Ok(entry)
    }
}

/// Best-effort removal of files left behind by a failed fetch
async fn discard(paths: &[&Path]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "Failed to remove leftover file");
        }
    }
}
