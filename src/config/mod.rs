use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub valkey: ValkeyConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// GraphQL endpoint of the game's event indexer
    #[serde(default = "default_feed_url")]
    pub graphql_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Base URL of the broadcast API
    #[serde(default = "default_broadcast_url")]
    pub api_url: String,
    /// Bearer token - loaded from env HERALD_BROADCAST_TOKEN
    #[serde(default)]
    pub token: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValkeyConfig {
    #[serde(default = "default_valkey_url")]
    pub url: String,
    /// Key namespace, e.g. "herald" → "herald:watermark".
    #[serde(default = "default_valkey_prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Records requested per event kind per fetch.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Upper bound on pages drained within one cycle.
    #[serde(default = "default_max_pages")]
    pub max_pages_per_cycle: usize,
    /// Published message ids kept before the oldest post is retracted.
    #[serde(default = "default_retention_max")]
    pub retention_max: usize,
    /// Delay between the end of one cycle and the start of the next.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// First-run watermark is `now - grace_secs`.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_feed_url() -> String {
    "http://localhost:42069/graphql".to_string()
}
fn default_broadcast_url() -> String {
    "https://api.example.social/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_valkey_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_valkey_prefix() -> String {
    "herald".to_string()
}
fn default_page_size() -> usize {
    25
}
fn default_max_pages() -> usize {
    10
}
fn default_retention_max() -> usize {
    3000
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_grace_secs() -> i64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            graphql_url: default_feed_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            api_url: default_broadcast_url(),
            token: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ValkeyConfig {
    fn default() -> Self {
        Self {
            url: default_valkey_url(),
            prefix: default_valkey_prefix(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_pages_per_cycle: default_max_pages(),
            retention_max: default_retention_max(),
            poll_interval_secs: default_poll_interval_secs(),
            grace_secs: default_grace_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;

        // Secrets come from the environment, never the config file
        if let Ok(token) = std::env::var("HERALD_BROADCAST_TOKEN") {
            config.broadcast.token = token;
        }

        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load a default config with env-only overrides (no file needed).
    pub fn from_env() -> Self {
        Config {
            feed: FeedConfig {
                graphql_url: std::env::var("HERALD_FEED_URL").unwrap_or_else(|_| default_feed_url()),
                ..FeedConfig::default()
            },
            broadcast: BroadcastConfig {
                api_url: std::env::var("HERALD_BROADCAST_URL")
                    .unwrap_or_else(|_| default_broadcast_url()),
                token: std::env::var("HERALD_BROADCAST_TOKEN").unwrap_or_default(),
                ..BroadcastConfig::default()
            },
            valkey: ValkeyConfig {
                url: std::env::var("VALKEY_URL").unwrap_or_else(|_| default_valkey_url()),
                prefix: std::env::var("HERALD_PREFIX").unwrap_or_else(|_| default_valkey_prefix()),
            },
            poller: PollerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Live publishing needs a token; paper mode does not.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        if self.broadcast.token.is_empty() {
            return Err(ConfigError::MissingEnv("HERALD_BROADCAST_TOKEN".to_string()));
        }
        Ok(&self.broadcast.token)
    }
}
