//! Byte downloads for logo images and stored documents.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, Instrument};

/// Upper bound on a downloaded logo or reference document.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl BackoffPolicy {
    /// Doubles per retry, capped at `max_delay`.
    pub fn delay(&self, retry: usize) -> Duration {
        let factor = 1u32.checked_shl(retry as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Throttling and upstream trouble are worth another attempt; client errors are not.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub max_in_flight: usize,
    pub max_per_host: usize,
    pub max_body_bytes: usize,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: None,
            max_in_flight: 16,
            max_per_host: 4,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
}

/// GET-only client with a global and a per-host concurrency cap plus bounded retries.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    in_flight: Semaphore,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
    config: HttpClientConfig,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        let client = builder.build().context("building http client")?;

        Ok(Self {
            client,
            in_flight: Semaphore::new(config.max_in_flight.max(1)),
            hosts: Mutex::new(HashMap::new()),
            config,
        })
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?
            .to_string();

        let host_limit = self.host_limit(&host).await;
        // Neither semaphore is ever closed.
        let _slot = self.in_flight.acquire().await.ok();
        let _host_slot = host_limit.acquire().await.ok();

        self.get_with_retries(parsed)
            .instrument(info_span!("http_fetch", %host, url))
            .await
    }

    async fn host_limit(&self, host: &str) -> Arc<Semaphore> {
        let mut hosts = self.hosts.lock().await;
        Arc::clone(
            hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_per_host.max(1)))),
        )
    }

    async fn get_with_retries(&self, url: Url) -> Result<FetchedResponse, FetchError> {
        let backoff = self.config.backoff;
        let mut retry = 0;
        loop {
            let failure = match self.client.get(url.clone()).send().await {
                Ok(resp) if resp.status().is_success() => return self.read_body(resp).await,
                Ok(resp) => {
                    let status = resp.status();
                    let err = FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: resp.url().to_string(),
                    };
                    (err, is_retryable_status(status))
                }
                Err(err) => {
                    let retryable = is_retryable_error(&err);
                    (FetchError::Request(err), retryable)
                }
            };

            match failure {
                (err, true) if retry < backoff.max_retries => {
                    debug!(retry, "retrying after: {err}");
                    tokio::time::sleep(backoff.delay(retry)).await;
                    retry += 1;
                }
                (err, _) => return Err(err),
            }
        }
    }

    async fn read_body(&self, resp: reqwest::Response) -> Result<FetchedResponse, FetchError> {
        let limit = self.config.max_body_bytes;
        let final_url = resp.url().to_string();
        if resp.content_length().is_some_and(|len| len as usize > limit) {
            return Err(FetchError::TooLarge { url: final_url, limit });
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = resp.bytes().await?;
        if body.len() > limit {
            return Err(FetchError::TooLarge { url: final_url, limit });
        }
        debug!(bytes = body.len(), content_type = content_type.as_deref(), "fetched");
        Ok(FetchedResponse {
            final_url,
            content_type,
            body: body.to_vec(),
        })
    }
}
