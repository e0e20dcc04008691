use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_DIR: &str = "soundpull";
const ENV_PREFIX: &str = "SOUNDPULL_";

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub merge: MergeConfig,
    pub playback: PlaybackConfig,
    pub recording: RecordingConfig,
}

/// Remote media repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Site root; the API lives at `<base_url>/w/api.php`
    pub base_url: String,
    /// Token attached to every API request as `token=<value>`
    pub token: Option<String>,
    /// Qualifier appended to every search query
    pub search_qualifier: String,
    pub search_limit: u32,
    /// Total limit for one API call
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Longest pause between received bytes; downloads have no total limit
    pub read_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://commons.wikimedia.org".to_string(),
            token: None,
            search_qualifier: "sounds".to_string(),
            search_limit: 20,
            timeout_secs: 30,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Where downloaded, recorded and merged files live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root_dir: PathBuf,
    pub catalog_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        Self {
            root_dir: base.join("sounds"),
            catalog_path: base.join("catalog.db"),
        }
    }
}

/// ffmpeg invocation used for mixing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub ffmpeg_path: String,
    pub timeout_secs: u64,
    pub log_level: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            timeout_secs: 300,
            log_level: "error".to_string(),
        }
    }
}

/// Which playback backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackBackend {
    Ffplay,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub backend: PlaybackBackend,
    pub ffplay_path: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            backend: PlaybackBackend::Ffplay,
            ffplay_path: "ffplay".to_string(),
        }
    }
}

/// Which recording backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingBackend {
    Ffmpeg,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub backend: RecordingBackend,
    pub ffmpeg_path: String,
    /// ffmpeg input format (`-f`), e.g. `pulse`, `alsa`, `avfoundation`
    pub input_format: String,
    /// ffmpeg input device (`-i`)
    pub device: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        let input_format = if cfg!(target_os = "macos") {
            "avfoundation"
        } else if cfg!(target_os = "windows") {
            "dshow"
        } else {
            "pulse"
        };
        let device = if cfg!(target_os = "macos") {
            ":0"
        } else {
            "default"
        };
        Self {
            backend: RecordingBackend::Ffmpeg,
            ffmpeg_path: "ffmpeg".to_string(),
            input_format: input_format.to_string(),
            device: device.to_string(),
        }
    }
}

/// Default location of the configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

fn base_figment() -> Figment {
    Figment::from(Serialized::defaults(Config::default()))
}

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

/// Load configuration from an explicit file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let config = base_figment()
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()?;

    Ok(config)
}

/// Load configuration from the default file if it exists, then the environment
pub fn load_default_config() -> Result<Config, ConfigError> {
    let mut figment = base_figment();
    if let Some(path) = default_config_path().filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(path));
    }
    Ok(figment.merge(env_provider()).extract()?)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    Ok(base_figment().merge(Toml::string(toml_str)).extract()?)
}
