use super::{new_page_id, RecordStore};
use crate::error::StoreError;
use crate::model::{
    Document, DocumentPage, DocumentVersion, NewDocumentPage, Team, VersionFlagUpdate,
    VersionWithTeam,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Clone)]
struct Tables {
    teams: HashMap<String, Team>,
    documents: HashMap<String, Document>,
    versions: BTreeMap<String, DocumentVersion>,
    /// Keyed by `(version_id, page_number)`; the key is the uniqueness constraint.
    pages: BTreeMap<(String, u32), DocumentPage>,
}

/// [`RecordStore`] held in process memory.
///
/// A single mutex guards every table, so a check-then-insert is one
/// critical section and flag updates are staged on a copy of the version
/// table and swapped in only when all of them apply.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: Mutex<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Task("in-memory store lock poisoned".into()))
    }
}

fn apply(
    versions: &mut BTreeMap<String, DocumentVersion>,
    update: &VersionFlagUpdate,
) -> Result<(), StoreError> {
    match update {
        VersionFlagUpdate::Single {
            version_id,
            has_pages,
            is_primary,
        } => {
            let v = versions
                .get_mut(version_id)
                .ok_or_else(|| StoreError::NotFound {
                    entity: "DocumentVersion",
                    id: version_id.clone(),
                })?;
            v.has_pages = *has_pages;
            v.is_primary = *is_primary;
        }
        VersionFlagUpdate::AllOtherVersions {
            document_id,
            except_version_number,
            is_primary,
        } => {
            for v in versions
                .values_mut()
                .filter(|v| &v.document_id == document_id)
                .filter(|v| v.version_number != *except_version_number)
            {
                v.is_primary = *is_primary;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_version(&self, version_id: &str) -> Result<Option<VersionWithTeam>, StoreError> {
        let tables = self.lock()?;
        let Some(version) = tables.versions.get(version_id).cloned() else {
            return Ok(None);
        };
        let document = tables
            .documents
            .get(&version.document_id)
            .cloned()
            .ok_or_else(|| StoreError::Corrupt(format!(
                "version '{}' references missing document '{}'",
                version.id, version.document_id
            )))?;
        let team = document
            .team_id
            .as_ref()
            .and_then(|id| tables.teams.get(id))
            .cloned();
        Ok(Some(VersionWithTeam {
            version,
            document,
            team,
        }))
    }

    async fn find_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.lock()?.documents.get(document_id).cloned())
    }

    async fn find_page(
        &self,
        version_id: &str,
        page_number: u32,
    ) -> Result<Option<DocumentPage>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .pages
            .get(&(version_id.to_string(), page_number))
            .cloned())
    }

    async fn create_page(&self, page: NewDocumentPage) -> Result<DocumentPage, StoreError> {
        let mut tables = self.lock()?;
        if !tables.versions.contains_key(&page.version_id) {
            return Err(StoreError::NotFound {
                entity: "DocumentVersion",
                id: page.version_id,
            });
        }
        let key = (page.version_id.clone(), page.page_number);
        if tables.pages.contains_key(&key) {
            return Err(StoreError::UniqueViolation {
                version_id: page.version_id,
                page_number: page.page_number,
            });
        }
        let record = DocumentPage {
            id: new_page_id(),
            version_id: page.version_id,
            page_number: page.page_number,
            file: page.file,
            storage_type: page.storage_type,
            embedded_links: page.embedded_links,
        };
        tables.pages.insert(key, record.clone());
        Ok(record)
    }

    async fn update_version_flags(&self, updates: &[VersionFlagUpdate]) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let mut staged = tables.versions.clone();
        for update in updates {
            apply(&mut staged, update)?;
        }
        tables.versions = staged;
        Ok(())
    }

    async fn list_pages(&self, version_id: &str) -> Result<Vec<DocumentPage>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .pages
            .values()
            .filter(|p| p.version_id == version_id)
            .cloned()
            .collect())
    }

    async fn list_versions(&self, document_id: &str) -> Result<Vec<DocumentVersion>, StoreError> {
        let tables = self.lock()?;
        let mut versions: Vec<DocumentVersion> = tables
            .versions
            .values()
            .filter(|v| v.document_id == document_id)
            .cloned()
            .collect();
        versions.sort_by_key(|v| v.version_number);
        Ok(versions)
    }

    async fn insert_team(&self, team: Team) -> Result<(), StoreError> {
        self.lock()?.teams.insert(team.id.clone(), team);
        Ok(())
    }

    async fn insert_document(&self, document: Document) -> Result<(), StoreError> {
        self.lock()?.documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn insert_version(&self, version: DocumentVersion) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if !tables.documents.contains_key(&version.document_id) {
            return Err(StoreError::NotFound {
                entity: "Document",
                id: version.document_id,
            });
        }
        tables.versions.insert(version.id.clone(), version);
        Ok(())
    }
}
