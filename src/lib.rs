pub mod api;
pub mod browser;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod media;
pub mod merge;
pub mod progress;
pub mod request;
pub mod storage;

// Re-export main types for convenience
pub use api::{ApiEndpoint, DetailResolver, FileDetails, SearchClient, SearchResult};
pub use browser::SoundBrowser;
pub use catalog::{Catalog, CatalogEntry, NewCatalogEntry, SqliteCatalog};
pub use config::{Config, load_config, load_default_config};
pub use error::{
    ApiError, CatalogError, ConfigError, ErrorKind, FetchError, MediaError, MergeError,
    StorageError,
};
pub use fetch::{Fetcher, unique_file_name};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use media::{Player, Recorder, player_from_config, recorder_from_config};
pub use merge::{FfmpegMerger, Merger, merge_and_catalog};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use request::{RequestFailure, RequestHandle, RequestSlot, RequestState};
pub use storage::{StorageState, scan_storage_root};
