use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Maximum age of a cache snapshot usable at startup, in minutes
    #[serde(default = "default_cache_max_age")]
    pub cache_max_age: u64,
    /// Per-attempt fetch timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
    /// Quiet period before a search query is applied, in milliseconds
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
    /// Proxy URL templates, tried in order. The encoded feed URL is appended.
    #[serde(default)]
    pub proxies: Vec<String>,
    pub feeds: Vec<FeedConfig>,
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_cache_max_age() -> u64 {
    15
}

fn default_request_timeout() -> u64 {
    10
}

fn default_search_debounce_ms() -> u64 {
    300
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    pub category: String,
    pub icon: String,
    /// Image shown instead of `icon` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.refresh_interval == 0 {
            anyhow::bail!("refresh_interval must be at least 1 minute");
        }
        if chrono::Duration::try_minutes(i64::try_from(self.cache_max_age)?).is_none() {
            anyhow::bail!("cache_max_age of {} minutes is out of range", self.cache_max_age);
        }
        Ok(())
    }

    pub fn refresh_every(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.saturating_mul(60))
    }

    pub fn cache_max_age(&self) -> chrono::Duration {
        i64::try_from(self.cache_max_age)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .unwrap_or_else(chrono::Duration::max_value)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}
