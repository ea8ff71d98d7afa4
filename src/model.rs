//! Records and per-run outcome types.
//!
//! [`DocumentVersion`] and [`DocumentPage`] are persisted by a
//! [`crate::store::RecordStore`]; [`ConversionResult`], [`BatchOutcome`] and
//! [`ConversionSummary`] only live for one
//! [`crate::coordinator::BatchCoordinator`] invocation.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a stored blob lives and how its locator must be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageType {
    /// The locator is already a fetchable URL.
    Url,
    /// The locator is a path relative to a [`crate::storage::LocalObjectStorage`] root.
    Local,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Url => "URL",
            StorageType::Local => "LOCAL",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "URL" => Ok(StorageType::Url),
            "LOCAL" => Ok(StorageType::Local),
            other => Err(format!("unknown storage type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub name: String,
    /// None when the owning team was deleted.
    pub team_id: Option<String>,
}

/// One revision of a document.
///
/// Created upstream with `has_pages = false`; only
/// [`crate::finalize::DocumentFinalizer`] flips its flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVersion {
    pub id: String,
    pub document_id: String,
    pub version_number: u32,
    /// Recorded at upload time. Conversion refuses to run without it.
    pub num_pages: Option<u32>,
    /// Locator of the source PDF bytes.
    pub file: String,
    pub storage_type: StorageType,
    pub has_pages: bool,
    pub is_primary: bool,
}

/// A version joined with its document and the document's team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionWithTeam {
    pub version: DocumentVersion,
    pub document: Document,
    pub team: Option<Team>,
}

/// One converted page. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub id: String,
    pub version_id: String,
    /// 1-based.
    pub page_number: u32,
    /// Locator of the rendered PNG.
    pub file: String,
    pub storage_type: StorageType,
    /// Hyperlink targets found on the page, in discovery order.
    pub embedded_links: Vec<String>,
}

/// Insert payload for [`crate::store::RecordStore::create_page`]; the store
/// assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocumentPage {
    pub version_id: String,
    pub page_number: u32,
    pub file: String,
    pub storage_type: StorageType,
    pub embedded_links: Vec<String>,
}

/// One write inside a version-flag transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionFlagUpdate {
    /// Set both flags on a single version.
    Single {
        version_id: String,
        has_pages: bool,
        is_primary: bool,
    },
    /// Set `is_primary` on every version of `document_id` whose version
    /// number differs from `except_version_number`.
    AllOtherVersions {
        document_id: String,
        except_version_number: u32,
        is_primary: bool,
    },
}

/// Outcome of one page task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    pub page_number: u32,
    /// Set on success, including when the page already existed.
    pub page_id: Option<String>,
    pub error: Option<PageError>,
}

impl ConversionResult {
    pub fn ok(page_number: u32, page_id: String) -> Self {
        Self {
            page_number,
            page_id: Some(page_id),
            error: None,
        }
    }

    pub fn failed(page_number: u32, error: PageError) -> Self {
        Self {
            page_number,
            page_id: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate over every [`ConversionResult`] of one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub results: Vec<ConversionResult>,
}

impl BatchOutcome {
    /// Collect results, ordered by page number.
    pub fn new(mut results: Vec<ConversionResult>) -> Self {
        results.sort_by_key(|r| r.page_number);
        Self { results }
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_pages(&self) -> Vec<u32> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.page_number)
            .collect()
    }

    /// True only when every dispatched page succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(ConversionResult::is_success)
    }

    pub fn page_ids(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|r| r.page_id.clone())
            .collect()
    }
}

/// Returned by a successful document conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSummary {
    pub version_id: String,
    pub document_id: String,
    pub total_pages: u32,
    /// Page ids ordered by page number.
    pub page_ids: Vec<String>,
    /// Whether the revalidation call went through. Informational only.
    pub revalidated: bool,
    pub duration_ms: u64,
}
