use std::path::PathBuf;
use std::sync::Arc;

/// Events emitted while a sound is fetched into local storage
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The server accepted the request and the body is about to stream
    FetchStarting {
        display_name: String,
        /// Expected content length in bytes, if known
        content_length: Option<u64>,
    },

    /// Download progress update
    FetchProgress {
        display_name: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// The file is in place and cataloged
    FetchCompleted {
        display_name: String,
        bytes_downloaded: u64,
        local_path: PathBuf,
    },

    /// The fetch failed; nothing was kept
    FetchFailed { display_name: String, error: String },

    /// Leftovers of interrupted downloads were removed from the storage root
    PartialFilesCleanedUp { count: usize },
}

/// Trait for reporting progress events during fetches.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
