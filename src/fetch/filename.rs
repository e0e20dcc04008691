use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use url::Url;

/// Base name for microphone recordings
pub const RECORDING_BASE_NAME: &str = "audio";

/// Base name for mixed files
pub const MERGE_BASE_NAME: &str = "merge";

/// Extension for files this tool produces itself
pub const GENERATED_EXTENSION: &str = "mp3";

/// Extension used when neither the title nor the URL names a format
const FALLBACK_EXTENSION: &str = "ogg";

/// Stem used when sanitizing leaves nothing behind
const FALLBACK_STEM: &str = "sound";

/// Maximum length for the stem of a stored file
const MAX_STEM_LENGTH: usize = 100;

/// Namespace prefix of media titles on MediaWiki sites
const FILE_NAMESPACE_PREFIX: &str = "file:";

/// Return the first of `base.ext`, `base_1.ext`, `base_2.ext`, … that does
/// not exist in `dir`
pub fn unique_file_name(dir: &Path, base: &str, ext: &str) -> String {
    let mut index = 0usize;
    loop {
        let candidate = if index == 0 {
            format!("{base}.{ext}")
        } else {
            format!("{base}_{index}.{ext}")
        };
        if !dir.join(&candidate).exists() {
            return candidate;
        }
        index += 1;
    }
}

/// Pick a unique name in `dir` and create it as an empty file.
///
/// Creation uses `create_new`, so two callers racing for the same name never
/// both win; the loser probes again.
pub fn reserve_unique_path(dir: &Path, base: &str, ext: &str) -> io::Result<PathBuf> {
    loop {
        let path = dir.join(unique_file_name(dir, base, ext));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Split a display name into a filesystem-safe stem and an audio extension.
///
/// The `File:` namespace prefix is dropped. The extension comes from the
/// display name when it names an audio format, then from the URL path, and
/// finally falls back to `ogg`.
pub fn storage_name_parts(display_name: &str, url: &str) -> (String, String) {
    let name = strip_namespace_prefix(display_name.trim());

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if is_valid_audio_extension(ext) => (stem, Some(ext.to_lowercase())),
        _ => (name, None),
    };

    let ext = ext
        .or_else(|| extension_from_url(url))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

    let stem = sanitize_stem(stem);
    let stem = if stem.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        stem
    };

    (stem, ext)
}

fn strip_namespace_prefix(name: &str) -> &str {
    match name.get(..FILE_NAMESPACE_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(FILE_NAMESPACE_PREFIX) => {
            name[FILE_NAMESPACE_PREFIX.len()..].trim_start()
        }
        _ => name,
    }
}

/// Get an audio extension from the last path segment of a URL
fn extension_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|filename| filename.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| is_valid_audio_extension(ext))
        .map(str::to_lowercase)
}

/// Check if a character is allowed in file stems (whitelist approach)
fn is_valid_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ')
}

/// Sanitize a title for use in a filename using whitelist approach
fn sanitize_stem(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| if is_valid_filename_char(c) { c } else { '-' })
        .collect();

    let collapsed = collapse_separators(&sanitized);
    let trimmed = collapsed.trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace());
    let truncated = truncate_at_boundary(trimmed, MAX_STEM_LENGTH);

    // Catches names the whitelist allows but some filesystems reserve (e.g. `CON`)
    sanitize_filename::sanitize_with_options(
        truncated,
        sanitize_filename::Options {
            windows: true,
            truncate: true,
            replacement: "",
        },
    )
}

/// Collapse multiple spaces and dashes into single dashes
fn collapse_separators(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut last_was_separator = false;

    for c in s.chars() {
        if c == '-' || c.is_whitespace() {
            if !last_was_separator {
                result.push('-');
                last_was_separator = true;
            }
        } else {
            result.push(c);
            last_was_separator = false;
        }
    }

    result
}

/// Truncate string at a word boundary
fn truncate_at_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }

    let truncated: String = s.chars().take(max_len).collect();
    if let Some(pos) = truncated.rfind('-')
        && pos > max_len / 2
    {
        return truncated[..pos].to_string();
    }

    truncated.trim_end_matches('-').to_string()
}

/// Check if a string is a valid audio file extension
fn is_valid_audio_extension(ext: &str) -> bool {
    matches!(
        ext.to_lowercase().as_str(),
        "ogg" | "oga" | "opus" | "webm" | "wav" | "flac" | "mp3" | "m4a"
    )
}
