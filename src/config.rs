//! Configuration file parser for ~/.config/feedscout/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::util::HostPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_USER_AGENT: &str = "feedscout/0.1 (+feed discovery; polite)";

/// Well-known feed locations, in probe order.
///
/// The first two are publisher-specific (Mediapart, FranceTV Info) and the
/// last one is Le Monde's; they were observed to win before the generic ones.
pub const DEFAULT_COMMON_PATHS: &[&str] = &[
    "/articles/feed",
    "/titres.rss",
    "/feed",
    "/rss",
    "/atom",
    "/feed.xml",
    "/rss.xml",
    "/atom.xml",
    "/feed/rss",
    "/blog/feed",
    "/blog/rss",
    "/rss/feed",
    "/index.xml",
    "/rss/une.xml",
];

// ============================================================================
// Configuration Structs
// ============================================================================

/// Engine configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// User-Agent sent with every outbound request.
    pub user_agent: String,

    /// Product token matched against robots.txt `User-agent` groups.
    pub robots_agent: String,

    /// Per-request send timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted response body size in bytes.
    pub max_response_bytes: usize,

    /// How long a parsed feed stays fresh in the cache, in seconds.
    pub cache_ttl_secs: u64,

    /// Maximum number of feeds held in the cache (least recently used evicted first).
    pub cache_capacity: usize,

    /// Skip the HTML scan when robots.txt disallows the page (otherwise only logged).
    pub enforce_robots: bool,

    /// Allow requests to loopback and private addresses.
    pub allow_private_hosts: bool,

    /// Ordered feed suffixes probed when no `<link>` tag resolves.
    pub common_paths: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            robots_agent: "feedscout".to_string(),
            request_timeout_secs: 30,
            max_response_bytes: 10 * 1024 * 1024,
            cache_ttl_secs: 900,
            cache_capacity: 256,
            enforce_robots: false,
            allow_private_hosts: false,
            common_paths: DEFAULT_COMMON_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "user_agent",
        "robots_agent",
        "request_timeout_secs",
        "max_response_bytes",
        "cache_ttl_secs",
        "cache_capacity",
        "enforce_robots",
        "allow_private_hosts",
        "common_paths",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            cache_ttl_secs = config.cache_ttl_secs,
            common_paths = config.common_paths.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn host_policy(&self) -> HostPolicy {
        if self.allow_private_hosts {
            HostPolicy::AllowPrivate
        } else {
            HostPolicy::PublicOnly
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
