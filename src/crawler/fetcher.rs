//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with the crawler's identifying user agent
//! - A shared minimum interval between requests across all workers
//! - Bounded retry with a fixed delay between attempts

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::HoundError;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Example
///
/// ```no_run
/// use paperhound::config::UserAgentConfig;
/// use paperhound::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "paperhound".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Global minimum interval between outbound requests
///
/// Every request from every worker passes through the same throttle, so the
/// archive sees at most one request per `min_interval` from this process.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Waits until a request may be sent, then claims the slot
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Retry and pacing policy for the fetcher
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub min_interval: Duration,
}

impl FetchPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            min_interval: Duration::from_millis(config.request_delay_ms),
        }
    }
}

/// Issues throttled GET requests with a bounded number of attempts
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    policy: FetchPolicy,
    throttle: Throttle,
}

impl Fetcher {
    pub fn new(client: Client, policy: FetchPolicy) -> Self {
        Self {
            client,
            throttle: Throttle::new(policy.min_interval),
            policy,
        }
    }

    /// Builds a fetcher from the crawler and user agent configuration
    pub fn from_config(
        crawler: &CrawlerConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, HoundError> {
        let client = build_http_client(
            user_agent,
            Duration::from_secs(crawler.request_timeout_secs),
        )?;
        Ok(Self::new(client, FetchPolicy::from_config(crawler)))
    }

    /// Fetches `url` and returns the response body
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Return body |
    /// | Other status | Retry after `retry_delay` |
    /// | Transport error / timeout | Retry after `retry_delay` |
    /// | Attempts exhausted | `FetchExhausted` naming the URL |
    ///
    /// Callers treat `FetchExhausted` as final for this URL.
    pub async fn fetch(&self, url: &str) -> Result<String, HoundError> {
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match self.attempt(url).await {
                Ok(body) => {
                    tracing::trace!("Fetched {} ({} bytes)", url, body.len());
                    return Ok(body);
                }
                Err(e) => {
                    tracing::debug!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        self.policy.max_attempts,
                        url,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
            }
        }

        tracing::warn!(
            "Giving up on {} after {} attempts",
            url,
            self.policy.max_attempts
        );
        Err(HoundError::FetchExhausted {
            url: url.to_string(),
            attempts: self.policy.max_attempts,
            last_error,
        })
    }

    async fn attempt(&self, url: &str) -> Result<String, HoundError> {
        self.throttle.wait().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| HoundError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HoundError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| HoundError::Http {
            url: url.to_string(),
            source,
        })
    }
}
