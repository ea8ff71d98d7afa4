use super::{new_page_id, RecordStore};
use crate::error::StoreError;
use crate::model::{
    Document, DocumentPage, DocumentVersion, NewDocumentPage, StorageType, Team,
    VersionFlagUpdate, VersionWithTeam,
};
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS teams (
    id   TEXT PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id      TEXT PRIMARY KEY,
    name    TEXT NOT NULL,
    team_id TEXT REFERENCES teams(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS document_versions (
    id             TEXT PRIMARY KEY,
    document_id    TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    version_number INTEGER NOT NULL,
    num_pages      INTEGER,
    file           TEXT NOT NULL,
    storage_type   TEXT NOT NULL,
    has_pages      INTEGER NOT NULL DEFAULT 0,
    is_primary     INTEGER NOT NULL DEFAULT 0,
    UNIQUE (document_id, version_number)
);

CREATE TABLE IF NOT EXISTS document_pages (
    id             TEXT PRIMARY KEY,
    version_id     TEXT NOT NULL REFERENCES document_versions(id) ON DELETE CASCADE,
    page_number    INTEGER NOT NULL,
    file           TEXT NOT NULL,
    storage_type   TEXT NOT NULL,
    embedded_links TEXT NOT NULL DEFAULT '[]',
    UNIQUE (version_id, page_number)
);
"#;

const VERSION_COLUMNS: &str = "v.id, v.document_id, v.version_number, v.num_pages, v.file, \
     v.storage_type, v.has_pages, v.is_primary";

const PAGE_COLUMNS: &str = "id, version_id, page_number, file, storage_type, embedded_links";

/// [`RecordStore`] backed by SQLite.
///
/// The `(version_id, page_number)` uniqueness rule is a table constraint,
/// and flag updates share one SQL transaction. rusqlite is synchronous, so
/// every call runs on Tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        info!("Opened record store at {}", path.display());
        Self::init(conn)
    }

    /// A private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("sqlite connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn storage_type_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<StorageType> {
    let raw: String = row.get(idx)?;
    raw.parse::<StorageType>()
        .map_err(|e| conversion_error(idx, e))
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentVersion> {
    Ok(DocumentVersion {
        id: row.get(0)?,
        document_id: row.get(1)?,
        version_number: row.get(2)?,
        num_pages: row.get(3)?,
        file: row.get(4)?,
        storage_type: storage_type_at(row, 5)?,
        has_pages: row.get(6)?,
        is_primary: row.get(7)?,
    })
}

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentPage> {
    let links: String = row.get(5)?;
    let embedded_links: Vec<String> =
        serde_json::from_str(&links).map_err(|e| conversion_error(5, e))?;
    Ok(DocumentPage {
        id: row.get(0)?,
        version_id: row.get(1)?,
        page_number: row.get(2)?,
        file: row.get(3)?,
        storage_type: storage_type_at(row, 4)?,
        embedded_links,
    })
}

fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            Some(e.extended_code)
        }
        _ => None,
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find_version(&self, version_id: &str) -> Result<Option<VersionWithTeam>, StoreError> {
        let version_id = version_id.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {VERSION_COLUMNS}, d.name, d.team_id, t.id, t.name \
                 FROM document_versions v \
                 JOIN documents d ON d.id = v.document_id \
                 LEFT JOIN teams t ON t.id = d.team_id \
                 WHERE v.id = ?1"
            );
            let found = conn
                .query_row(&sql, params![version_id], |row| {
                    let version = version_from_row(row)?;
                    let document = Document {
                        id: version.document_id.clone(),
                        name: row.get(8)?,
                        team_id: row.get(9)?,
                    };
                    let team = match (row.get::<_, Option<String>>(10)?, row.get::<_, Option<String>>(11)?) {
                        (Some(id), Some(name)) => Some(Team { id, name }),
                        _ => None,
                    };
                    Ok(VersionWithTeam {
                        version,
                        document,
                        team,
                    })
                })
                .optional()?;
            Ok(found)
        })
        .await
    }

    async fn find_document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        let document_id = document_id.to_string();
        self.run(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, team_id FROM documents WHERE id = ?1",
                    params![document_id],
                    |row| {
                        Ok(Document {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            team_id: row.get(2)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }

    async fn find_page(
        &self,
        version_id: &str,
        page_number: u32,
    ) -> Result<Option<DocumentPage>, StoreError> {
        let version_id = version_id.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {PAGE_COLUMNS} FROM document_pages WHERE version_id = ?1 AND page_number = ?2"
            );
            Ok(conn
                .query_row(&sql, params![version_id, page_number], page_from_row)
                .optional()?)
        })
        .await
    }

    async fn create_page(&self, page: NewDocumentPage) -> Result<DocumentPage, StoreError> {
        self.run(move |conn| {
            let links = serde_json::to_string(&page.embedded_links)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let record = DocumentPage {
                id: new_page_id(),
                version_id: page.version_id,
                page_number: page.page_number,
                file: page.file,
                storage_type: page.storage_type,
                embedded_links: page.embedded_links,
            };
            let inserted = conn.execute(
                "INSERT INTO document_pages (id, version_id, page_number, file, storage_type, embedded_links) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.version_id,
                    record.page_number,
                    record.file,
                    record.storage_type.as_str(),
                    links
                ],
            );
            match inserted {
                Ok(_) => {
                    debug!(
                        "Created page record {} (version {}, page {})",
                        record.id, record.version_id, record.page_number
                    );
                    Ok(record)
                }
                Err(e) => match constraint_code(&e) {
                    Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => Err(StoreError::UniqueViolation {
                        version_id: record.version_id,
                        page_number: record.page_number,
                    }),
                    Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => Err(StoreError::NotFound {
                        entity: "DocumentVersion",
                        id: record.version_id,
                    }),
                    _ => Err(e.into()),
                },
            }
        })
        .await
    }

    async fn update_version_flags(&self, updates: &[VersionFlagUpdate]) -> Result<(), StoreError> {
        let updates = updates.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            for update in &updates {
                match update {
                    VersionFlagUpdate::Single {
                        version_id,
                        has_pages,
                        is_primary,
                    } => {
                        let changed = tx.execute(
                            "UPDATE document_versions SET has_pages = ?1, is_primary = ?2 WHERE id = ?3",
                            params![has_pages, is_primary, version_id],
                        )?;
                        if changed == 0 {
                            // Dropping `tx` rolls back everything applied so far.
                            return Err(StoreError::NotFound {
                                entity: "DocumentVersion",
                                id: version_id.clone(),
                            });
                        }
                    }
                    VersionFlagUpdate::AllOtherVersions {
                        document_id,
                        except_version_number,
                        is_primary,
                    } => {
                        tx.execute(
                            "UPDATE document_versions SET is_primary = ?1 \
                             WHERE document_id = ?2 AND version_number <> ?3",
                            params![is_primary, document_id, except_version_number],
                        )?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_pages(&self, version_id: &str) -> Result<Vec<DocumentPage>, StoreError> {
        let version_id = version_id.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {PAGE_COLUMNS} FROM document_pages WHERE version_id = ?1 ORDER BY page_number"
            );
            let mut stmt = conn.prepare(&sql)?;
            let pages = stmt
                .query_map(params![version_id], page_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(pages)
        })
        .await
    }

    async fn list_versions(&self, document_id: &str) -> Result<Vec<DocumentVersion>, StoreError> {
        let document_id = document_id.to_string();
        self.run(move |conn| {
            let sql = format!(
                "SELECT {VERSION_COLUMNS} FROM document_versions v \
                 WHERE v.document_id = ?1 ORDER BY v.version_number"
            );
            let mut stmt = conn.prepare(&sql)?;
            let versions = stmt
                .query_map(params![document_id], version_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(versions)
        })
        .await
    }

    async fn insert_team(&self, team: Team) -> Result<(), StoreError> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO teams (id, name) VALUES (?1, ?2) \
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![team.id, team.name],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_document(&self, document: Document) -> Result<(), StoreError> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO documents (id, name, team_id) VALUES (?1, ?2, ?3)",
                params![document.id, document.name, document.team_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn insert_version(&self, version: DocumentVersion) -> Result<(), StoreError> {
        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO document_versions \
                 (id, document_id, version_number, num_pages, file, storage_type, has_pages, is_primary) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    version.id,
                    version.document_id,
                    version.version_number,
                    version.num_pages,
                    version.file,
                    version.storage_type.as_str(),
                    version.has_pages,
                    version.is_primary
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(e) if constraint_code(&e) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                    Err(StoreError::NotFound {
                        entity: "Document",
                        id: version.document_id,
                    })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}
