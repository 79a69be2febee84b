// Configuration loading and parsing (tracker.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Refresh interval
// ---------------------------------------------------------------------------

pub const MIN_REFRESH_SECS: u64 = 15;
pub const MAX_REFRESH_SECS: u64 = 120;
pub const DEFAULT_REFRESH_SECS: u64 = 60;

/// Polling interval, always within `MIN_REFRESH_SECS..=MAX_REFRESH_SECS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshInterval(Duration);

impl RefreshInterval {
    pub fn from_secs(secs: u64) -> Result<Self, ConfigError> {
        if !(MIN_REFRESH_SECS..=MAX_REFRESH_SECS).contains(&secs) {
            return Err(ConfigError::ValidationError {
                field: "polling.refresh_interval_secs".into(),
                message: format!(
                    "must be between {MIN_REFRESH_SECS} and {MAX_REFRESH_SECS} seconds, got {secs}"
                ),
            });
        }
        Ok(Self(Duration::from_secs(secs)))
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }

    pub fn as_secs(self) -> u64 {
        self.0.as_secs()
    }
}

impl Default for RefreshInterval {
    fn default() -> Self {
        Self(Duration::from_secs(DEFAULT_REFRESH_SECS))
    }
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub polling: PollingConfig,
    pub feed: FeedConfig,
    pub db_path: String,
    pub watchlist_seed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub refresh_interval: RefreshInterval,
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    #[serde(default = "default_sport_id")]
    pub sport_id: u32,
}

fn default_sport_id() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// tracker.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire tracker.toml file.
#[derive(Debug, Clone, Deserialize)]
struct TrackerFile {
    polling: PollingSection,
    feed: FeedConfig,
    database: DatabaseSection,
    #[serde(default)]
    watchlist: WatchlistSection,
}

#[derive(Debug, Clone, Deserialize)]
struct PollingSection {
    refresh_interval_secs: u64,
    fetch_timeout_secs: u64,
    max_concurrent_fetches: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WatchlistSection {
    #[serde(default)]
    seed: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/tracker.toml` relative to
/// the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let tracker_path = base_dir.join("config").join("tracker.toml");
    let text = read_file(&tracker_path)?;
    let file: TrackerFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: tracker_path.clone(),
        source: e,
    })?;

    validate(&file)?;

    Ok(Config {
        polling: PollingConfig {
            refresh_interval: RefreshInterval::from_secs(file.polling.refresh_interval_secs)?,
            fetch_timeout: Duration::from_secs(file.polling.fetch_timeout_secs),
            max_concurrent_fetches: file.polling.max_concurrent_fetches,
        },
        feed: FeedConfig {
            base_url: file.feed.base_url.trim_end_matches('/').to_string(),
            sport_id: file.feed.sport_id,
        },
        db_path: file.database.path,
        watchlist_seed: file.watchlist.seed,
    })
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the crate root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn validate(file: &TrackerFile) -> Result<(), ConfigError> {
    RefreshInterval::from_secs(file.polling.refresh_interval_secs)?;

    if file.polling.fetch_timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "polling.fetch_timeout_secs".into(),
            message: "must be > 0".into(),
        });
    }

    if file.polling.max_concurrent_fetches == 0 {
        return Err(ConfigError::ValidationError {
            field: "polling.max_concurrent_fetches".into(),
            message: "must be > 0".into(),
        });
    }

    let url = file.feed.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "feed.base_url".into(),
            message: format!("must be an http(s) URL, got {url:?}"),
        });
    }

    if file.database.path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
