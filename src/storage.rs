//! Object storage collaborator: signed download URLs and page uploads.
//!
//! An upload that cannot complete reports it through empty fields in
//! [`PutFileResult`] rather than an error; the page worker turns a missing
//! type or locator into [`crate::error::PageError::Upload`].

use crate::error::StorageError;
use crate::model::StorageType;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use uuid::Uuid;

/// A file to store on behalf of a team.
#[derive(Debug, Clone)]
pub struct PutFileRequest {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub team_id: String,
    /// Namespaces the object under the document. A fresh id is generated
    /// when absent.
    pub doc_id: Option<String>,
}

/// Result of an upload. Both fields are set on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutFileResult {
    pub storage_type: Option<StorageType>,
    pub data: Option<String>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// A URL from which the object can be fetched for at least `ttl`.
    async fn signed_download_url(
        &self,
        storage_type: StorageType,
        locator: &str,
        ttl: Duration,
    ) -> Result<String, StorageError>;

    /// Store `request.bytes`.
    async fn put_file(&self, request: PutFileRequest) -> PutFileResult;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Filesystem-backed [`ObjectStorage`].
///
/// Objects live at `<root>/<team_id>/<doc_id>/<name>`. Download URLs point
/// at `public_base_url` when one is configured (with an `expires` query
/// parameter), otherwise at the file itself via `file://`.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_base_url: None,
        }
    }

    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    /// Absolute path for a locator, rejecting anything that escapes the root.
    pub fn resolve(&self, locator: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(locator);
        let safe = !locator.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidLocator(locator.to_string()));
        }
        Ok(self.root.join(rel))
    }

    /// Store a source document; used by upstream registration.
    pub async fn put_source(
        &self,
        team_id: &str,
        doc_id: &str,
        name: &str,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let locator = object_locator(team_id, doc_id, name)?;
        self.write(&locator, bytes).await?;
        Ok(locator)
    }

    async fn write(&self, locator: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(locator)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io {
                    path: parent.display().to_string(),
                    source: e,
                })?;
        }

        // Write to a temp name then rename so readers never see a partial file.
        let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StorageError::Io {
                path: tmp.display().to_string(),
                source: e,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
        Ok(())
    }
}

/// Build `<team>/<doc>/<name>`, refusing separators inside any segment.
fn object_locator(team_id: &str, doc_id: &str, name: &str) -> Result<String, StorageError> {
    for segment in [team_id, doc_id, name] {
        if segment.is_empty() || segment.contains(['/', '\\']) || segment == ".." || segment == "." {
            return Err(StorageError::InvalidLocator(format!(
                "{team_id}/{doc_id}/{name}"
            )));
        }
    }
    Ok(format!("{team_id}/{doc_id}/{name}"))
}

/// `<base>/<locator>?expires=<unix>`, percent-encoding each locator segment.
fn public_url(base: &str, locator: &str, expires: u64) -> Result<String, StorageError> {
    let mut url =
        reqwest::Url::parse(base).map_err(|_| StorageError::InvalidBaseUrl(base.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| StorageError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(locator.split('/'));
    url.query_pairs_mut()
        .append_pair("expires", &expires.to_string());
    Ok(url.to_string())
}

/// A new document identifier in the `doc_<token>` shape.
pub fn new_doc_id() -> String {
    format!("doc_{}", Uuid::new_v4().simple())
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn signed_download_url(
        &self,
        storage_type: StorageType,
        locator: &str,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        match storage_type {
            StorageType::Url => Ok(locator.to_string()),
            StorageType::Local => {
                let path = self.resolve(locator)?;
                match &self.public_base_url {
                    Some(base) => {
                        let expires = SystemTime::now()
                            .checked_add(ttl)
                            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                            .map(|d| d.as_secs())
                            .unwrap_or(u64::MAX);
                        public_url(base, locator, expires)
                    }
                    None => {
                        let absolute = if path.is_absolute() {
                            path
                        } else {
                            std::env::current_dir()
                                .map_err(|e| StorageError::Io {
                                    path: path.display().to_string(),
                                    source: e,
                                })?
                                .join(path)
                        };
                        reqwest::Url::from_file_path(&absolute)
                            .map(|u| u.to_string())
                            .map_err(|_| StorageError::InvalidLocator(locator.to_string()))
                    }
                }
            }
        }
    }

    async fn put_file(&self, request: PutFileRequest) -> PutFileResult {
        let doc_id = request.doc_id.unwrap_or_else(new_doc_id);
        let locator = match object_locator(&request.team_id, &doc_id, &request.name) {
            Ok(l) => l,
            Err(e) => {
                warn!("Upload of '{}' rejected: {}", request.name, e);
                return PutFileResult::default();
            }
        };

        match self.write(&locator, &request.bytes).await {
            Ok(()) => {
                debug!(
                    "Stored {} ({}, {} bytes)",
                    locator,
                    request.mime_type,
                    request.bytes.len()
                );
                PutFileResult {
                    storage_type: Some(StorageType::Local),
                    data: Some(locator),
                }
            }
            Err(e) => {
                warn!("Upload of '{}' failed: {}", locator, e);
                PutFileResult::default()
            }
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}
