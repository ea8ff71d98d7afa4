//! Configuration types for PDF-to-page-image conversion.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Every worker in a batch receives a clone of
//! the same config, so two pages of one document are always fetched with the
//! same retry policy. The render scale is not configurable: every page of
//! every version is rendered at [`DEFAULT_SCALE_FACTOR`].

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// PDF user space is 72 units per inch.
pub const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Render scale for page images: 3× the 72-DPI base, i.e. 216 DPI.
///
/// A rerun after a partial failure only renders the missing pages, so the
/// scale must not vary between runs.
pub const DEFAULT_SCALE_FACTOR: f32 = 216.0 / PDF_POINTS_PER_INCH;

/// Exponential-backoff policy for outbound HTTP calls.
///
/// Only server-class failures (HTTP 5xx) are retried; see
/// [`crate::pipeline::fetch::RetryingFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always ≥ 1.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub min_timeout_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_timeout_ms: u64,
    /// Growth factor between consecutive delays.
    pub factor: f64,
    /// Multiply each delay by a random value in `[1, 2)`.
    pub randomize: bool,
}

impl RetryPolicy {
    /// Policy for downloading the source PDF of a page: 5 attempts.
    pub const fn page_fetch() -> Self {
        Self {
            max_attempts: 5,
            min_timeout_ms: 1_000,
            max_timeout_ms: 10_000,
            factor: 2.0,
            randomize: true,
        }
    }

    /// Policy for every other outbound call: 3 attempts.
    pub const fn outbound_default() -> Self {
        Self {
            max_attempts: 3,
            ..Self::page_fetch()
        }
    }

    /// A policy that never retries.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::page_fetch()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// `min(max_timeout, round(min_timeout × factor^(attempt-1) × r))` where
    /// `r` is drawn from `[1, 2)` when `randomize` is set and is `1` otherwise.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.randomize {
            rand::thread_rng().gen_range(1.0..2.0)
        } else {
            1.0
        };
        self.delay_with_jitter(attempt, jitter)
    }

    fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.min_timeout_ms as f64 * self.factor.powi(exponent) * jitter;
        let capped = raw.round().min(self.max_timeout_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::outbound_default()
    }
}

/// Configuration for a document conversion run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2pages::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(4)
///     .revalidate_url("https://app.example.com")
///     .revalidate_token("s3cret")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum number of page tasks in flight for one document. Default: 10.
    ///
    /// Every page of the version is still dispatched; this only bounds how
    /// many rasters (and source downloads) are held in memory at once.
    pub concurrency: usize,

    /// Retry policy for the per-page source download. Default: 5 attempts.
    pub page_fetch_retry: RetryPolicy,

    /// Retry policy for other outbound calls (revalidation). Default: 3 attempts.
    pub default_retry: RetryPolicy,

    /// Per-request HTTP timeout in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// Lifetime of the signed source URL handed to page tasks. Default: 3600.
    pub signed_url_ttl_secs: u64,

    /// Base URL of the web app exposing `/api/revalidate`. Notification is
    /// skipped when unset.
    pub revalidate_url: Option<String>,

    /// Shared secret passed as the `secret` query parameter.
    pub revalidate_token: Option<String>,

    /// Path to a pdfium shared library. If None, binds to the system library.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Optional observer for per-page events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            page_fetch_retry: RetryPolicy::page_fetch(),
            default_retry: RetryPolicy::outbound_default(),
            request_timeout_secs: 120,
            signed_url_ttl_secs: 3600,
            revalidate_url: None,
            revalidate_token: None,
            pdfium_lib_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("concurrency", &self.concurrency)
            .field("page_fetch_retry", &self.page_fetch_retry)
            .field("default_retry", &self.default_retry)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("signed_url_ttl_secs", &self.signed_url_ttl_secs)
            .field("revalidate_url", &self.revalidate_url)
            .field(
                "revalidate_token",
                &self.revalidate_token.as_ref().map(|_| "<redacted>"),
            )
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Render scale relative to 72 DPI; always [`DEFAULT_SCALE_FACTOR`].
    pub fn scale_factor(&self) -> f32 {
        DEFAULT_SCALE_FACTOR
    }

    /// Effective render resolution in dots per inch.
    pub fn dpi(&self) -> f32 {
        self.scale_factor() * PDF_POINTS_PER_INCH
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn page_fetch_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.page_fetch_retry = policy;
        self
    }

    pub fn default_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.default_retry = policy;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn signed_url_ttl_secs(mut self, secs: u64) -> Self {
        self.config.signed_url_ttl_secs = secs;
        self
    }

    pub fn revalidate_url(mut self, url: impl Into<String>) -> Self {
        self.config.revalidate_url = Some(url.into());
        self
    }

    pub fn revalidate_token(mut self, token: impl Into<String>) -> Self {
        self.config.revalidate_token = Some(token.into());
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        for (name, policy) in [
            ("page_fetch_retry", &c.page_fetch_retry),
            ("default_retry", &c.default_retry),
        ] {
            if policy.max_attempts == 0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name}.max_attempts must be ≥ 1"
                )));
            }
            if policy.min_timeout_ms > policy.max_timeout_ms {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name}: min timeout {}ms exceeds max timeout {}ms",
                    policy.min_timeout_ms, policy.max_timeout_ms
                )));
            }
        }
        if let Some(url) = &c.revalidate_url {
            reqwest::Url::parse(url).map_err(|e| {
                PipelineError::InvalidConfig(format!("revalidate_url {url:?} is not a URL: {e}"))
            })?;
        }
        if c.revalidate_url.is_some() && c.revalidate_token.is_none() {
            return Err(PipelineError::InvalidConfig(
                "revalidate_url is set but revalidate_token is missing".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_216_dpi() {
        let config = PipelineConfig::default();
        assert_eq!(config.scale_factor(), 3.0);
        assert_eq!(config.dpi(), 216.0);
        assert_eq!(config.page_fetch_retry.max_attempts, 5);
        assert_eq!(config.default_retry.max_attempts, 3);
    }

    #[test]
    fn backoff_without_jitter_doubles_then_caps() {
        let policy = RetryPolicy {
            randomize: false,
            ..RetryPolicy::page_fetch()
        };
        let delays: Vec<u64> = (1..=5)
            .map(|n| policy.delay_for(n).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 10_000]);
    }

    #[test]
    fn jittered_backoff_stays_within_bounds() {
        let policy = RetryPolicy::page_fetch();
        for attempt in 1..=6u32 {
            let base = 1_000u64 * 2u64.pow(attempt - 1);
            let lo = base.min(10_000);
            let hi = (base * 2).min(10_000);
            for _ in 0..50 {
                let d = policy.delay_for(attempt).as_millis() as u64;
                assert!(d >= lo && d <= hi, "attempt {attempt}: {d} not in {lo}..={hi}");
            }
        }
    }

    #[test]
    fn builder_clamps_and_validates() {
        let config = PipelineConfig::builder()
            .concurrency(0)
            .build()
            .unwrap();
        assert_eq!(config.concurrency, 1);

        let err = PipelineConfig::builder()
            .page_fetch_retry(RetryPolicy {
                max_attempts: 0,
                ..RetryPolicy::page_fetch()
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn revalidate_url_requires_token() {
        let err = PipelineConfig::builder()
            .revalidate_url("https://app.example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn revalidate_url_must_parse() {
        let err = PipelineConfig::builder()
            .revalidate_url("app.example.com/no-scheme")
            .revalidate_token("s3cret")
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(ref m) if m.contains("revalidate_url")));
    }

    #[test]
    fn debug_redacts_token() {
        let config = PipelineConfig::builder()
            .revalidate_url("https://app.example.com")
            .revalidate_token("hunter2")
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
