//! Best-effort revalidation webhook fired after a successful conversion.

use crate::config::{PipelineConfig, RetryPolicy};
use crate::pipeline::fetch::{redact_query, RetryingFetcher};
use tracing::{debug, info, warn};

/// Calls `GET <base>/api/revalidate?secret=<token>&documentId=<id>`.
#[derive(Clone)]
pub struct RevalidationNotifier {
    fetcher: RetryingFetcher,
    base_url: Option<String>,
    token: Option<String>,
    policy: RetryPolicy,
}

impl RevalidationNotifier {
    pub fn new(fetcher: RetryingFetcher, config: &PipelineConfig) -> Self {
        Self {
            fetcher,
            base_url: config.revalidate_url.clone(),
            token: config.revalidate_token.clone(),
            policy: config.default_retry,
        }
    }

    /// Webhook URL for `document_id`, or None when notification is disabled.
    pub fn endpoint(&self, document_id: &str) -> Option<String> {
        let base = self.base_url.as_deref()?;
        let token = self.token.as_deref()?;
        // Keep any path prefix of the base: `join` replaces the last segment
        // unless it ends with a slash.
        let base = format!("{}/", base.trim_end_matches('/'));
        let mut url = reqwest::Url::parse(&base).ok()?.join("api/revalidate").ok()?;
        url.query_pairs_mut()
            .append_pair("secret", token)
            .append_pair("documentId", document_id);
        Some(url.to_string())
    }

    /// Returns whether the endpoint answered with a success status.
    /// Never fails: problems are logged and reported as `false`.
    pub async fn notify(&self, document_id: &str) -> bool {
        let Some(url) = self.endpoint(document_id) else {
            match &self.base_url {
                Some(base) => warn!(
                    "Revalidation URL {:?} is not a valid base; skipping document {}",
                    base, document_id
                ),
                None => debug!("Revalidation disabled; skipping document {}", document_id),
            }
            return false;
        };

        match self.fetcher.fetch(&url, &self.policy).await {
            Ok(response) if response.is_success() => {
                info!("Revalidated document {}", document_id);
                true
            }
            Ok(response) => {
                warn!(
                    "Revalidation of document {} returned HTTP {} ({})",
                    document_id,
                    response.status,
                    redact_query(&url)
                );
                false
            }
            Err(e) => {
                warn!("Revalidation of document {} failed: {}", document_id, e);
                false
            }
        }
    }
}
