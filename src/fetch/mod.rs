mod download;
mod fetcher;
mod filename;

pub use download::{PARTIAL_SUFFIX, partial_path_for};
pub use fetcher::Fetcher;
pub use filename::{
    GENERATED_EXTENSION, MERGE_BASE_NAME, RECORDING_BASE_NAME, reserve_unique_path,
    storage_name_parts, unique_file_name,
};
