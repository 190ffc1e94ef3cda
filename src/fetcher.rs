use std::fmt;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::FeedConfig;
use crate::model::FeedEntry;
use crate::parser::{parse_feed, ParseError};

/// Why a single proxy attempt failed.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    HttpStatus(u16),
    #[error("timed out")]
    Timeout,
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// One failed attempt through one proxy.
#[derive(Debug)]
pub struct ProxyAttemptFailed {
    pub proxy_index: usize,
    pub proxy: String,
    pub reason: AttemptError,
}

impl fmt::Display for ProxyAttemptFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proxy {} ({}): {}", self.proxy_index, self.proxy, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("all proxies failed for '{source_name}' after {} attempts", .attempts.len())]
    AllProxiesExhausted {
        source_name: String,
        attempts: Vec<ProxyAttemptFailed>,
    },
}

/// Entries from a successful fetch, plus the attempts that failed before it.
#[derive(Debug)]
pub struct FetchReport {
    pub entries: Vec<FeedEntry>,
    pub failed_attempts: Vec<ProxyAttemptFailed>,
}

pub struct Fetcher {
    client: Client,
    proxies: Vec<String>,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(proxies: Vec<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent("FeedDigest/1.0 (RSS Aggregator)")
            .build()?;

        Ok(Self {
            client,
            proxies,
            timeout,
        })
    }

    /// Fetches and parses `source`, walking the proxy list in order until one
    /// attempt succeeds. Each attempt is bounded by the fetcher's timeout.
    pub async fn fetch(&self, source: &FeedConfig) -> Result<FetchReport, FetchError> {
        let mut failed_attempts = Vec::new();

        for (proxy_index, proxy) in self.proxies.iter().enumerate() {
            let url = proxy_url(proxy, &source.url);

            let result = tokio::time::timeout(self.timeout, self.fetch_through(&url, source))
                .await
                .unwrap_or(Err(AttemptError::Timeout));

            match result {
                Ok(entries) => {
                    info!(
                        "Fetched {} entries for '{}' via proxy {}",
                        entries.len(),
                        source.name,
                        proxy_index
                    );
                    return Ok(FetchReport {
                        entries,
                        failed_attempts,
                    });
                }
                Err(reason) => {
                    warn!("Proxy {} failed for '{}': {}", proxy_index, source.name, reason);
                    failed_attempts.push(ProxyAttemptFailed {
                        proxy_index,
                        proxy: proxy.clone(),
                        reason,
                    });
                }
            }
        }

        Err(FetchError::AllProxiesExhausted {
            source_name: source.name.clone(),
            attempts: failed_attempts,
        })
    }

    async fn fetch_through(
        &self,
        url: &str,
        source: &FeedConfig,
    ) -> Result<Vec<FeedEntry>, AttemptError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        Ok(parse_feed(&bytes, source)?)
    }
}

/// Builds the request URL for `feed_url` through the proxy `template`.
pub fn proxy_url(template: &str, feed_url: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(feed_url.as_bytes()).collect();
    format!("{}{}", template, encoded)
}
