mod details;
mod endpoint;
mod fetch;
mod search;
mod types;

pub use details::DetailResolver;
pub use endpoint::{ApiEndpoint, MEDIA_NAMESPACE};
pub use search::{AUDIO_EXTENSIONS, SearchClient, is_audio_title};
pub use types::{FileDetails, SearchResult};
