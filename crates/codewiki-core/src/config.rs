//! Configuration for the CodeWiki bridge.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. An optional TOML file: `$CODEWIKI_CONFIG`, or `config.toml` in the
//!    platform config directory (e.g. `~/.config/codewiki-mcp/config.toml`)
//! 3. `CODEWIKI_*` environment variables
//!
//! ## Example Configuration File
//!
//! ```toml
//! base_url = "https://codewiki.google"
//! verbose = false
//!
//! [timeouts]
//! hard_secs = 60
//! page_load_secs = 30
//!
//! [retry]
//! max_attempts = 3
//! delay_secs = 2
//!
//! [cache]
//! ttl_secs = 600
//! max_size = 100
//! ```
//!
//! Invalid numeric environment values are ignored rather than fatal so a
//! typo in a shell profile cannot take the server down.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "CODEWIKI_CONFIG";

/// User agent presented to the target site.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                              AppleWebKit/537.36 (KHTML, like Gecko) \
                              Chrome/120.0.0.0 Safari/537.36";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root URL of the documentation service.
    pub base_url: String,
    /// Hard and per-phase timeouts.
    pub timeouts: TimeoutConfig,
    /// Attempt limit and backoff.
    pub retry: RetryConfig,
    /// Response size limits.
    pub response: ResponseConfig,
    /// In-memory page cache sizing.
    pub cache: CacheConfig,
    /// Chat polling cadence.
    pub chat: ChatConfig,
    /// Browser launch options.
    pub browser: BrowserConfig,
    /// Enable debug-level logging.
    pub verbose: bool,
}

/// Timeouts, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wall-clock budget for a whole tool call, across retries.
    pub hard_secs: u64,
    /// Navigation budget for a single page load.
    pub page_load_secs: u64,
    /// How long to wait for content markers or the chat input.
    pub element_wait_secs: u64,
    /// Polling budget for a chat answer.
    pub response_wait_secs: u64,
}

/// Retry behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub delay_secs: u64,
}

/// Limits on returned text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Character cap for any single tool response body.
    pub max_chars: usize,
    /// Preview length for topic listings.
    pub preview_chars: usize,
}

/// Cache sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime.
    pub ttl_secs: u64,
    /// Maximum entries per namespace.
    pub max_size: usize,
}

/// Chat and render pacing, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Pause after submitting a question before the first sample.
    pub initial_delay_secs: u64,
    /// Gap between answer samples.
    pub poll_interval_secs: u64,
    /// Minimum time an answer must stay unchanged to count as final.
    pub stable_interval_secs: u64,
    /// Settle delay used when no content marker shows up during a render.
    pub js_load_delay_secs: u64,
}

/// Browser launch options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Explicit Chrome/Chromium executable. Auto-detected when unset.
    pub chrome_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://codewiki.google".to_string(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            response: ResponseConfig::default(),
            cache: CacheConfig::default(),
            chat: ChatConfig::default(),
            browser: BrowserConfig::default(),
            verbose: false,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            hard_secs: 60,
            page_load_secs: 30,
            element_wait_secs: 20,
            response_wait_secs: 45,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay_secs: 3,
        }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_chars: 30_000,
            preview_chars: 200,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_size: 50,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5,
            poll_interval_secs: 2,
            stable_interval_secs: 2,
            js_load_delay_secs: 3,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Missing files are not an error; unreadable or malformed ones are.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .or_else(Self::default_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file. Absent keys take their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config {}: {e}", path.display())))
    }

    fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "codewiki", "codewiki-mcp")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Overlay `CODEWIKI_*` variables supplied by `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let int = |key: &str, slot: &mut u64| {
            if let Some(v) = lookup(key).and_then(|raw| raw.trim().parse().ok()) {
                *slot = v;
            }
        };
        int("CODEWIKI_HARD_TIMEOUT", &mut self.timeouts.hard_secs);
        int("CODEWIKI_PAGE_LOAD_TIMEOUT", &mut self.timeouts.page_load_secs);
        int("CODEWIKI_ELEMENT_WAIT_TIMEOUT", &mut self.timeouts.element_wait_secs);
        int("CODEWIKI_RESPONSE_WAIT_TIMEOUT", &mut self.timeouts.response_wait_secs);
        int("CODEWIKI_RETRY_DELAY", &mut self.retry.delay_secs);
        int("CODEWIKI_CACHE_TTL", &mut self.cache.ttl_secs);
        int("CODEWIKI_RESPONSE_INITIAL_DELAY", &mut self.chat.initial_delay_secs);
        int("CODEWIKI_RESPONSE_POLL_INTERVAL", &mut self.chat.poll_interval_secs);
        int("CODEWIKI_RESPONSE_STABLE_INTERVAL", &mut self.chat.stable_interval_secs);
        int("CODEWIKI_JS_LOAD_DELAY", &mut self.chat.js_load_delay_secs);

        if let Some(v) = parse_env(&lookup, "CODEWIKI_MAX_RETRIES") {
            self.retry.max_attempts = v;
        }
        if let Some(v) = parse_env(&lookup, "CODEWIKI_RESPONSE_MAX_CHARS") {
            self.response.max_chars = v;
        }
        if let Some(v) = parse_env(&lookup, "CODEWIKI_TOPIC_PREVIEW_CHARS") {
            self.response.preview_chars = v;
        }
        if let Some(v) = parse_env(&lookup, "CODEWIKI_CACHE_MAX_SIZE") {
            self.cache.max_size = v;
        }
        if let Some(url) = lookup("CODEWIKI_BASE_URL").filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(path) = lookup("CODEWIKI_CHROME_PATH").filter(|v| !v.trim().is_empty()) {
            self.browser.chrome_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(flag) = lookup("CODEWIKI_VERBOSE").and_then(|v| parse_bool(&v)) {
            self.verbose = flag;
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(Error::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.cache.max_size == 0 {
            return Err(Error::Config("cache.max_size must be at least 1".into()));
        }
        if self.response.max_chars == 0 {
            return Err(Error::Config("response.max_chars must be at least 1".into()));
        }
        if self.timeouts.hard_secs == 0 {
            return Err(Error::Config("timeouts.hard_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Hard wall-clock budget per tool call.
    pub const fn hard_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.hard_secs)
    }

    /// Navigation budget.
    pub const fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.page_load_secs)
    }

    /// Element wait budget.
    pub const fn element_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.element_wait_secs)
    }

    /// Chat answer polling budget.
    pub const fn response_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.response_wait_secs)
    }

    /// Pause between attempts.
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry.delay_secs)
    }

    /// Cache entry lifetime.
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Settle delay when content markers never appear.
    pub const fn js_load_delay(&self) -> Duration {
        Duration::from_secs(self.chat.js_load_delay_secs)
    }
}

fn parse_env<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|raw| raw.trim().parse().ok())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}
