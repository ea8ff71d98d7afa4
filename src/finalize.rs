//! Promote a fully converted version to the primary version of its document.

use crate::error::PipelineError;
use crate::model::{DocumentVersion, VersionFlagUpdate};
use crate::store::RecordStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Flips version flags once every page of a version exists.
///
/// Both writes go to the store as one [`RecordStore::update_version_flags`]
/// call, so readers never observe zero or two primary versions, nor a
/// primary version without pages.
#[derive(Clone)]
pub struct DocumentFinalizer {
    store: Arc<dyn RecordStore>,
}

impl DocumentFinalizer {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// The writes that make `version` the only primary version.
    pub fn updates_for(version: &DocumentVersion) -> [VersionFlagUpdate; 2] {
        [
            VersionFlagUpdate::Single {
                version_id: version.id.clone(),
                has_pages: true,
                is_primary: true,
            },
            VersionFlagUpdate::AllOtherVersions {
                document_id: version.document_id.clone(),
                except_version_number: version.version_number,
                is_primary: false,
            },
        ]
    }

    /// Mark `version_id` as having pages and as primary; demote the others.
    pub async fn finalize(&self, version_id: &str) -> Result<(), PipelineError> {
        let start = Instant::now();
        let found = self
            .store
            .find_version(version_id)
            .await?
            .ok_or_else(|| PipelineError::VersionNotFound {
                version_id: version_id.to_string(),
            })?;

        self.finalize_version(&found.version).await?;
        info!(
            "Finalised version {} (document {}, v{}) in {}ms",
            version_id,
            found.version.document_id,
            found.version.version_number,
            start.elapsed().as_millis()
        );
        Ok(())
    }

    /// Same as [`Self::finalize`] for a version already loaded by the caller.
    pub async fn finalize_version(&self, version: &DocumentVersion) -> Result<(), PipelineError> {
        self.store
            .update_version_flags(&Self::updates_for(version))
            .await
            .map_err(|source| PipelineError::Finalization {
                version_id: version.id.clone(),
                source,
            })
    }
}
