//! Persistent record store for teams, documents, versions and pages.
//!
//! The only cross-task shared state in a conversion batch lives here. Two
//! guarantees are required of every implementation:
//!
//! 1. [`RecordStore::create_page`] is a compare-and-insert on
//!    `(version_id, page_number)`: a second insert for the same key fails
//!    with [`StoreError::UniqueViolation`] and never overwrites.
//! 2. [`RecordStore::update_version_flags`] applies all of its updates in
//!    one commit or none of them.

mod memory;
mod sqlite;

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use crate::error::StoreError;
use crate::model::{
    Document, DocumentPage, DocumentVersion, NewDocumentPage, Team, VersionFlagUpdate,
    VersionWithTeam,
};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up a version together with its document and team.
    async fn find_version(&self, version_id: &str) -> Result<Option<VersionWithTeam>, StoreError>;

    async fn find_document(&self, document_id: &str) -> Result<Option<Document>, StoreError>;

    /// Look up the page record for `(version_id, page_number)`.
    async fn find_page(
        &self,
        version_id: &str,
        page_number: u32,
    ) -> Result<Option<DocumentPage>, StoreError>;

    /// Insert a page record, failing with [`StoreError::UniqueViolation`]
    /// when one already exists for the key.
    async fn create_page(&self, page: NewDocumentPage) -> Result<DocumentPage, StoreError>;

    /// Apply every update atomically.
    async fn update_version_flags(&self, updates: &[VersionFlagUpdate]) -> Result<(), StoreError>;

    /// All pages of a version, ordered by page number.
    async fn list_pages(&self, version_id: &str) -> Result<Vec<DocumentPage>, StoreError>;

    /// All versions of a document, ordered by version number.
    async fn list_versions(&self, document_id: &str) -> Result<Vec<DocumentVersion>, StoreError>;

    async fn insert_team(&self, team: Team) -> Result<(), StoreError>;

    async fn insert_document(&self, document: Document) -> Result<(), StoreError>;

    async fn insert_version(&self, version: DocumentVersion) -> Result<(), StoreError>;
}

pub(crate) fn new_page_id() -> String {
    format!("pg_{}", Uuid::new_v4().simple())
}

/// Shared behavioural checks run against every [`RecordStore`] implementation.
#[cfg(test)]
pub(crate) mod conformance {
    use super::*;
    use crate::model::StorageType;

    pub fn version(id: &str, document_id: &str, number: u32, primary: bool) -> DocumentVersion {
        DocumentVersion {
            id: id.into(),
            document_id: document_id.into(),
            version_number: number,
            num_pages: Some(2),
            file: format!("team_1/{document_id}/v{number}.pdf"),
            storage_type: StorageType::Local,
            has_pages: primary,
            is_primary: primary,
        }
    }

    pub fn new_page(version_id: &str, page_number: u32) -> NewDocumentPage {
        NewDocumentPage {
            version_id: version_id.into(),
            page_number,
            file: format!("team_1/doc_1/page-{page_number}.png"),
            storage_type: StorageType::Local,
            embedded_links: vec!["https://a.test".into(), "https://b.test".into()],
        }
    }

    pub async fn seed(store: &dyn RecordStore) {
        store
            .insert_team(Team {
                id: "team_1".into(),
                name: "Acme".into(),
            })
            .await
            .unwrap();
        store
            .insert_document(Document {
                id: "doc_1".into(),
                name: "Deck".into(),
                team_id: Some("team_1".into()),
            })
            .await
            .unwrap();
        store
            .insert_version(version("ver_1", "doc_1", 1, true))
            .await
            .unwrap();
        store
            .insert_version(version("ver_2", "doc_1", 2, false))
            .await
            .unwrap();
    }

    pub async fn find_version_joins_team(store: &dyn RecordStore) {
        seed(store).await;
        let found = store.find_version("ver_2").await.unwrap().unwrap();
        assert_eq!(found.version.version_number, 2);
        assert_eq!(found.document.id, "doc_1");
        assert_eq!(found.team.unwrap().id, "team_1");
        assert!(store.find_version("missing").await.unwrap().is_none());
    }

    pub async fn find_document_returns_owner(store: &dyn RecordStore) {
        seed(store).await;
        let document = store.find_document("doc_1").await.unwrap().unwrap();
        assert_eq!(document.name, "Deck");
        assert_eq!(document.team_id.as_deref(), Some("team_1"));
        assert!(store.find_document("doc_missing").await.unwrap().is_none());
    }

    pub async fn create_page_is_compare_and_insert(store: &dyn RecordStore) {
        seed(store).await;
        let first = store.create_page(new_page("ver_2", 1)).await.unwrap();
        assert_eq!(
            first.embedded_links,
            vec!["https://a.test".to_string(), "https://b.test".to_string()]
        );

        let err = store.create_page(new_page("ver_2", 1)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::UniqueViolation { page_number: 1, .. }
        ));

        let found = store.find_page("ver_2", 1).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
        assert_eq!(store.list_pages("ver_2").await.unwrap().len(), 1);
    }

    pub async fn flag_updates_commit_together(store: &dyn RecordStore) {
        seed(store).await;
        store
            .update_version_flags(&[
                VersionFlagUpdate::Single {
                    version_id: "ver_2".into(),
                    has_pages: true,
                    is_primary: true,
                },
                VersionFlagUpdate::AllOtherVersions {
                    document_id: "doc_1".into(),
                    except_version_number: 2,
                    is_primary: false,
                },
            ])
            .await
            .unwrap();

        let versions = store.list_versions("doc_1").await.unwrap();
        let primaries: Vec<_> = versions.iter().filter(|v| v.is_primary).collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].id, "ver_2");
        assert!(primaries[0].has_pages);
    }

    pub async fn failed_flag_update_changes_nothing(store: &dyn RecordStore) {
        seed(store).await;
        let before = store.list_versions("doc_1").await.unwrap();

        let err = store
            .update_version_flags(&[
                VersionFlagUpdate::AllOtherVersions {
                    document_id: "doc_1".into(),
                    except_version_number: 2,
                    is_primary: false,
                },
                VersionFlagUpdate::Single {
                    version_id: "ver_missing".into(),
                    has_pages: true,
                    is_primary: true,
                },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let after = store.list_versions("doc_1").await.unwrap();
        assert_eq!(before, after);
    }
}
