use anyhow::{anyhow, Context, Result};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::thread;
use std::time::Duration;
use tracing::info;

use crate::config::ScraperConfig;

/// Source of page bodies. Production fetches over HTTP; tests hand back
/// fixture HTML.
pub trait PageFetcher {
    fn fetch(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            retryable_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

enum AttemptError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

/// Blocking fetcher that paces requests evenly and retries transient
/// failures with doubling delays. Client errors like 404 fail immediately.
pub struct WebPageFetcher {
    client: reqwest::blocking::Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    retry: RetryPolicy,
}

impl WebPageFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(&config.scraping.user_agent)
            .timeout(Duration::from_secs(config.scraping.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.rate_limits.requests_per_second)
                .ok_or_else(|| anyhow!("Invalid requests_per_second value"))?,
        )
        .allow_burst(nonzero!(1u32));
        let rate_limiter = RateLimiter::direct(quota);

        let retry = RetryPolicy {
            max_attempts: config.scraping.max_retries,
            initial_delay: Duration::from_millis(config.scraping.initial_retry_delay_ms),
            ..RetryPolicy::default()
        };

        Ok(Self {
            client,
            rate_limiter,
            retry,
        })
    }

    fn get_once(&self, url: &str) -> Result<String, AttemptError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| AttemptError::Retryable(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let err = anyhow!("Failed to fetch page: HTTP {}", status);
            if self.retry.retryable_statuses.contains(&status.as_u16()) {
                return Err(AttemptError::Retryable(err));
            }
            return Err(AttemptError::Fatal(err));
        }
        response
            .text()
            .map_err(|e| AttemptError::Retryable(e.into()))
    }
}

impl PageFetcher for WebPageFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        // Wait for rate limiter
        while self.rate_limiter.check().is_err() {
            thread::sleep(Duration::from_millis(100));
        }

        let mut delay = self.retry.initial_delay;
        let mut attempt = 1;

        loop {
            match self.get_once(url) {
                Ok(body) => return Ok(body),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(e)) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(e.context("Max retries exceeded"));
                    }
                    info!("Retry attempt {} after error: {}", attempt, e);
                    thread::sleep(delay);
                    delay *= 2;
                    attempt += 1;
                }
            }
        }
    }
}
