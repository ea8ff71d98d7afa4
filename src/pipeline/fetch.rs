//! Outbound HTTP: download the source PDF and call webhooks, with retries.
//!
//! ## Retry Strategy
//!
//! Only server-class failures (HTTP 5xx) are retried. A 4xx will not get
//! better by waiting and a transport error (DNS, TLS, refused connection)
//! is surfaced immediately to the caller. Delays follow
//! [`RetryPolicy::delay_for`]: with the page-fetch policy the sequence is
//! 1 s → 2 s → 4 s → 8 s (each × a random factor in `[1, 2)`, capped at
//! 10 s), i.e. four sleeps between five attempts.
//!
//! When every attempt returns 5xx the *last response* is handed back rather
//! than an error, so callers decide what a non-success status means for
//! them (terminal for a page fetch, ignorable for a notification).

use crate::config::RetryPolicy;
use crate::error::{PageError, TransportError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// A fully buffered HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Minimal GET client. The seam lets tests script responses.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_http_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// `reqwest`-backed client that also serves `file://` URLs from disk.
///
/// Local files answer 200 with their contents or 404 when missing, so a
/// source kept in [`crate::storage::LocalObjectStorage`] without a public
/// base URL flows through the same status-driven code path as a remote one.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, timeout })
    }

    async fn get_remote(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: url.to_string(),
                }
            } else {
                TransportError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        debug!("GET {} → {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }

    async fn get_local(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let path = file_url_path(url)?;
        match tokio::time::timeout(self.timeout, tokio::fs::read(&path)).await {
            Err(_) => Err(TransportError::Timeout {
                url: url.to_string(),
            }),
            Ok(Ok(body)) => Ok(HttpResponse { status: 200, body }),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(HttpResponse {
                status: 404,
                body: Vec::new(),
            }),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::PermissionDenied => Ok(HttpResponse {
                status: 403,
                body: Vec::new(),
            }),
            Ok(Err(e)) => Err(TransportError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        if is_http_url(url) {
            self.get_remote(url).await
        } else if url.starts_with("file://") {
            self.get_local(url).await
        } else {
            Err(TransportError::UnsupportedUrl(url.to_string()))
        }
    }
}

/// Turn a `file://` URL into a filesystem path, dropping any query string.
fn file_url_path(url: &str) -> Result<PathBuf, TransportError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|_| TransportError::UnsupportedUrl(url.to_string()))?;
    parsed
        .to_file_path()
        .map_err(|_| TransportError::UnsupportedUrl(url.to_string()))
}

/// Wraps an [`HttpClient`] with 5xx-only exponential backoff.
#[derive(Clone)]
pub struct RetryingFetcher {
    client: Arc<dyn HttpClient>,
}

impl RetryingFetcher {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }

    /// GET `url`, retrying 5xx responses according to `policy`.
    ///
    /// Returns the first non-5xx response, or the last 5xx response once
    /// `policy.max_attempts` is reached. Transport errors are not retried.
    pub async fn fetch(
        &self,
        url: &str,
        policy: &RetryPolicy,
    ) -> Result<HttpResponse, TransportError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let response = self.client.get(url).await?;

            if !response.is_server_error() || attempt >= max_attempts {
                if response.is_server_error() {
                    warn!(
                        "GET {}: HTTP {} after {} attempts, giving up",
                        redact_query(url),
                        response.status,
                        attempt
                    );
                }
                return Ok(response);
            }

            let delay = policy.delay_for(attempt);
            warn!(
                "GET {}: HTTP {}, retry {}/{} after {}ms",
                redact_query(url),
                response.status,
                attempt,
                max_attempts - 1,
                delay.as_millis()
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Fetch the source PDF for `page`, treating any final non-success
    /// status as a terminal [`PageError::Fetch`].
    pub async fn fetch_bytes(
        &self,
        url: &str,
        policy: &RetryPolicy,
        page: u32,
    ) -> Result<Vec<u8>, PageError> {
        let response = self
            .fetch(url, policy)
            .await
            .map_err(|e| PageError::Fetch {
                page,
                status: None,
                detail: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(PageError::Fetch {
                page,
                status: Some(response.status),
                detail: "Failed to fetch PDF".to_string(),
            });
        }

        info!(
            "Page {}: fetched source PDF ({} bytes)",
            page,
            response.body.len()
        );
        Ok(response.body)
    }
}

/// Strip the query string so signed URLs and secrets stay out of logs.
pub fn redact_query(url: &str) -> &str {
    url.split_once('?').map(|(base, _)| base).unwrap_or(url)
}
