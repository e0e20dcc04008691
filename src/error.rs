use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification shared by every error in the crate.
///
/// Callers map a kind to user-facing text and a retry decision without
/// matching on each concrete error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection, transport or timeout failure
    NetworkFailure,
    /// The server answered with a non-success status or an error envelope
    ApiError,
    /// A success response without a usable body
    EmptyResponse,
    /// Zero results where at least one was expected
    NotFound,
    /// Reading or writing local files failed
    Filesystem,
    /// An external program exited unsuccessfully or could not run
    ExternalProcess,
    /// The request was replaced by a newer one before it finished
    Superseded,
}

/// Errors from the search and detail endpoints
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("API error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("API returned error '{code}': {info}")]
    Remote { code: String, info: String },

    #[error("Empty response body from {url}")]
    EmptyResponse { url: String },

    #[error("Unparseable response body from {url}: {source}")]
    Malformed {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No {what} found for '{identifier}'")]
    NotFound {
        what: &'static str,
        identifier: String,
    },

    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    pub(crate) fn from_transport(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ApiError::Timeout {
                url: url.to_string(),
            }
        } else {
            ApiError::Network {
                url: url.to_string(),
                source,
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network { .. } | ApiError::Timeout { .. } | ApiError::InvalidUrl(_) => {
                ErrorKind::NetworkFailure
            }
            ApiError::Status { .. } | ApiError::Remote { .. } => ErrorKind::ApiError,
            ApiError::EmptyResponse { .. } | ApiError::Malformed { .. } => {
                ErrorKind::EmptyResponse
            }
            ApiError::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

/// Errors from the persistent catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to open catalog database {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to create catalog directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Catalog entry {0} not found")]
    NotFound(i64),
}

impl CatalogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Filesystem,
        }
    }
}

/// Errors that can occur while downloading a sound into local storage
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Download from {url} timed out")]
    Timeout { url: String },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download from {url} returned an empty payload")]
    EmptyPayload { url: String },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to catalog {path}: {source}")]
    Catalog {
        path: PathBuf,
        #[source]
        source: CatalogError,
    },
}

impl FetchError {
    fn from_transport(url: &str, source: reqwest::Error, streaming: bool) -> Self {
        let url = url.to_string();
        if source.is_timeout() {
            FetchError::Timeout { url }
        } else if streaming {
            FetchError::StreamFailed { url, source }
        } else {
            FetchError::HttpFailed { url, source }
        }
    }

    pub(crate) fn request_failed(url: &str, source: reqwest::Error) -> Self {
        Self::from_transport(url, source, false)
    }

    pub(crate) fn stream_failed(url: &str, source: reqwest::Error) -> Self {
        Self::from_transport(url, source, true)
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::HttpFailed { .. }
            | FetchError::StreamFailed { .. }
            | FetchError::Timeout { .. } => ErrorKind::NetworkFailure,
            FetchError::HttpStatus { .. } => ErrorKind::ApiError,
            FetchError::EmptyPayload { .. } => ErrorKind::EmptyResponse,
            FetchError::CreateDirectoryFailed { .. }
            | FetchError::FileCreateFailed { .. }
            | FetchError::FileWriteFailed { .. }
            | FetchError::Catalog { .. } => ErrorKind::Filesystem,
        }
    }
}

/// Errors that can occur when mixing two audio files
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Input file {0} does not exist")]
    MissingInput(PathBuf),

    #[error("Output {0} would overwrite an input")]
    OutputIsInput(PathBuf),

    #[error("ffmpeg not found at '{path}'")]
    ProgramNotFound { path: String },

    #[error("ffmpeg exited with code {code:?}{}", stderr_suffix(.stderr))]
    ProcessFailed {
        code: Option<i32>,
        stderr: Option<String>,
    },

    #[error("ffmpeg did not finish within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Merge produced no output at {0}")]
    MissingOutput(PathBuf),

    #[error("I/O error while merging: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to catalog merged file: {0}")]
    Catalog(#[from] CatalogError),
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    match stderr {
        Some(text) if !text.trim().is_empty() => format!(": {}", text.trim()),
        _ => String::new(),
    }
}

impl MergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::MissingInput(_)
            | MergeError::OutputIsInput(_)
            | MergeError::Io(_)
            | MergeError::Catalog(_) => ErrorKind::Filesystem,
            MergeError::ProgramNotFound { .. }
            | MergeError::ProcessFailed { .. }
            | MergeError::Timeout { .. }
            | MergeError::MissingOutput(_) => ErrorKind::ExternalProcess,
        }
    }
}

/// Errors from the playback and recording backends
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to start '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Recording is already in progress")]
    AlreadyRecording,

    #[error("No recording in progress")]
    NotRecording,

    #[error("Player exited with code {code:?}")]
    PlaybackFailed { code: Option<i32> },

    #[error("Recorder exited with code {code:?}")]
    RecorderFailed { code: Option<i32> },

    #[error("I/O error talking to media process: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::Io(_) => ErrorKind::Filesystem,
            _ => ErrorKind::ExternalProcess,
        }
    }
}

/// Errors that can occur when scanning the storage directory
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read directory {path}: {source}")]
    ReadDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Invalid(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_message_carries_code() {
        let err = ApiError::Status {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "API error 503: Service Unavailable");
        assert_eq!(err.kind(), ErrorKind::ApiError);
    }

    #[test]
    fn not_found_maps_to_not_found_kind() {
        let err = ApiError::NotFound {
            what: "pages",
            identifier: "File:Rain.ogg".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("File:Rain.ogg"));
    }

    #[test]
    fn fetch_status_is_api_error_kind() {
        let err = FetchError::HttpStatus {
            url: "https://example.com/a.ogg".to_string(),
            status: 404,
        };
        assert_eq!(err.kind(), ErrorKind::ApiError);
    }

    #[test]
    fn fetch_kinds_are_distinct() {
        let empty = FetchError::EmptyPayload {
            url: "https://example.com/a.ogg".to_string(),
        };
        let write = FetchError::FileWriteFailed {
            path: PathBuf::from("/tmp/a.ogg"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(empty.kind(), ErrorKind::EmptyResponse);
        assert_eq!(write.kind(), ErrorKind::Filesystem);
    }

    #[test]
    fn merge_failure_includes_stderr() {
        let err = MergeError::ProcessFailed {
            code: Some(1),
            stderr: Some("Error opening input\n".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "ffmpeg exited with code Some(1): Error opening input"
        );
        assert_eq!(err.kind(), ErrorKind::ExternalProcess);
    }

    #[test]
    fn merge_failure_without_stderr() {
        let err = MergeError::ProcessFailed {
            code: Some(1),
            stderr: None,
        };
        assert_eq!(err.to_string(), "ffmpeg exited with code Some(1)");
    }
}
