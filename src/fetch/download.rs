use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::FetchError;
use crate::http::HttpResponse;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Suffix for files still being written
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Path of the in-progress file that will later be renamed to `final_path`
pub fn partial_path_for(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Stream a response body into `output_path`.
///
/// Reports progress through the reporter and returns the number of bytes
/// written. The caller checks the status beforehand.
pub async fn write_body(
    response: HttpResponse,
    url: &str,
    output_path: &Path,
    display_name: &str,
    reporter: &SharedProgressReporter,
) -> Result<u64, FetchError> {
    reporter.report(ProgressEvent::FetchStarting {
        display_name: display_name.to_string(),
        content_length: response.content_length,
    });

    let mut file =
        File::create(output_path)
            .await
            .map_err(|e| FetchError::FileCreateFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

    let mut bytes_downloaded: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| FetchError::stream_failed(url, e))?;

        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::FileWriteFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

        bytes_downloaded += chunk.len() as u64;

        reporter.report(ProgressEvent::FetchProgress {
            display_name: display_name.to_string(),
            bytes_downloaded,
            total_bytes: response.content_length,
        });
    }

    // Ensure all data is flushed to disk
    file.flush()
        .await
        .map_err(|e| FetchError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_downloaded)
}
