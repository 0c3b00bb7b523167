//! Document repository and folder-reference normalization
//!
//! Document metadata is stored as a JSON object. Older records reference their
//! folder in one of three shapes, all of which stay queryable:
//!
//! - nested: `{"folder": {"id": "...", "name": "..."}}`
//! - flat camelCase: `{"folderId": "...", "folderName": "..."}`
//! - flat snake_case: `{"folder_id": "...", "folder_name": "..."}`

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde_json::Value;
use uuid::Uuid;

use super::DbPool;
use super::user::{now_string, parse_datetime};
use crate::{Error, Result};

/// Semi-structured document metadata
pub type Metadata = serde_json::Map<String, Value>;

/// Matches a document whose metadata references folder `?2`, in any shape
const FOLDER_MATCH: &str = "(json_extract(metadata, '$.folder.id') = ?2 \
     OR json_extract(metadata, '$.folderId') = ?2 \
     OR json_extract(metadata, '$.folder_id') = ?2)";

/// Matches a document whose metadata references any folder
const HAS_FOLDER: &str = "(json_extract(metadata, '$.folder.id') IS NOT NULL \
     OR json_extract(metadata, '$.folderId') IS NOT NULL \
     OR json_extract(metadata, '$.folder_id') IS NOT NULL)";

const DOCUMENT_COLUMNS: &str = "id, phone_number, user_id, file_name, mime_type, metadata, \
     google_drive_link, google_drive_id, created_at";

/// Folder reference extracted from document metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRef {
    pub id: String,
    pub name: String,
    /// `savedAt`/`createdAt` stamp carried by a nested reference
    pub saved_at: Option<String>,
    pub is_default: bool,
}

/// Extract the folder a document is filed under, whatever shape it was stored in
///
/// The nested shape wins when present. Returns `None` unless both id and name are known.
#[must_use]
pub fn folder_reference(metadata: &Metadata) -> Option<FolderRef> {
    if let Some(Value::Object(folder)) = metadata.get("folder") {
        let id = str_field(folder, "id");
        let name = str_field(folder, "name");
        return match (id, name) {
            (Some(id), Some(name)) => Some(FolderRef {
                id,
                name,
                saved_at: str_field(folder, "savedAt").or_else(|| str_field(folder, "createdAt")),
                is_default: folder
                    .get("isDefault")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            }),
            _ => None,
        };
    }

    let id = str_field(metadata, "folderId").or_else(|| str_field(metadata, "folder_id"))?;
    let name = str_field(metadata, "folderName").or_else(|| str_field(metadata, "folder_name"))?;
    Some(FolderRef {
        id,
        name,
        saved_at: None,
        is_default: false,
    })
}

/// Backfill the nested `folder` object from a flat legacy reference
///
/// Leaves metadata untouched if it already has a `folder` key or the flat
/// reference is incomplete.
pub fn backfill_folder(metadata: &mut Metadata) {
    if metadata.contains_key("folder") {
        return;
    }
    if let Some(folder) = folder_reference(metadata) {
        metadata.insert(
            "folder".to_string(),
            serde_json::json!({ "id": folder.id, "name": folder.name }),
        );
    }
}

fn str_field(map: &Metadata, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// A document filed into Drive
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub phone_number: String,
    pub user_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub metadata: Metadata,
    pub google_drive_link: Option<String>,
    pub google_drive_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Folder this document is filed under
    #[must_use]
    pub fn folder(&self) -> Option<FolderRef> {
        folder_reference(&self.metadata)
    }

    /// Raw text the user described the document with
    #[must_use]
    pub fn raw_text(&self) -> Option<&str> {
        self.metadata.get("rawText").and_then(Value::as_str)
    }

    /// Drive view link, derived from the file id if no link was stored
    #[must_use]
    pub fn drive_link(&self) -> Option<String> {
        self.google_drive_link
            .clone()
            .filter(|l| !l.is_empty())
            .or_else(|| {
                self.google_drive_id
                    .as_deref()
                    .map(crate::drive::file_view_link)
            })
    }
}

/// Fields for a new document record
#[derive(Debug, Clone)]
pub struct NewDocument<'a> {
    pub phone_number: &'a str,
    pub user_id: &'a str,
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub metadata: &'a Metadata,
    pub google_drive_link: Option<&'a str>,
    pub google_drive_id: Option<&'a str>,
}

/// Document repository
#[derive(Clone)]
pub struct DocumentRepo {
    pool: DbPool,
}

impl DocumentRepo {
    /// Create a new document repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Persist a new document
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn create(&self, doc: &NewDocument<'_>) -> Result<DocumentRecord> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = now_string();
        let metadata = serde_json::to_string(doc.metadata)?;

        conn.execute(
            "INSERT INTO documents (id, phone_number, user_id, file_name, mime_type, metadata,
                 google_drive_link, google_drive_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                id,
                doc.phone_number,
                doc.user_id,
                doc.file_name,
                doc.mime_type,
                metadata,
                doc.google_drive_link,
                doc.google_drive_id,
                now
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(DocumentRecord {
            id,
            phone_number: doc.phone_number.to_string(),
            user_id: doc.user_id.to_string(),
            file_name: doc.file_name.to_string(),
            mime_type: doc.mime_type.to_string(),
            metadata: doc.metadata.clone(),
            google_drive_link: doc.google_drive_link.map(ToString::to_string),
            google_drive_id: doc.google_drive_id.map(ToString::to_string),
            created_at: parse_datetime(&now),
        })
    }

    /// First document (oldest first) whose raw text contains `query`, case-insensitively
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_by_raw_text(&self, phone_number: &str, query: &str) -> Result<Option<DocumentRecord>> {
        // SQLite lower() folds ASCII only, so matching happens here
        let needle = query.to_lowercase();
        let docs = self.query_many(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents
                 WHERE phone_number = ?1
                   AND json_extract(metadata, '$.rawText') IS NOT NULL
                 ORDER BY created_at ASC, rowid ASC"
            ),
            [phone_number],
        )?;

        Ok(docs.into_iter().find(|doc| {
            doc.raw_text()
                .is_some_and(|text| text.to_lowercase().contains(&needle))
        }))
    }

    /// Documents filed under a folder (any metadata shape), newest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_by_folder(&self, phone_number: &str, folder_id: &str) -> Result<Vec<DocumentRecord>> {
        self.query_many(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents
                 WHERE phone_number = ?1 AND {FOLDER_MATCH}
                 ORDER BY created_at DESC, rowid DESC"
            ),
            rusqlite::params![phone_number, folder_id],
        )
    }

    /// Count documents filed under a folder, using the same filter as `list_by_folder`
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count_by_folder(&self, phone_number: &str, folder_id: &str) -> Result<usize> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM documents WHERE phone_number = ?1 AND {FOLDER_MATCH}"),
            [phone_number, folder_id],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Documents that reference any folder, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_with_folder(&self, phone_number: &str) -> Result<Vec<DocumentRecord>> {
        self.query_many(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents
                 WHERE phone_number = ?1 AND {HAS_FOLDER}
                 ORDER BY created_at ASC, rowid ASC"
            ),
            rusqlite::params![phone_number],
        )
    }

    /// Count all documents for a phone number
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self, phone_number: &str) -> Result<usize> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE phone_number = ?1",
            [phone_number],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn query_many(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<DocumentRecord>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::Database(e.to_string()))?;

        let docs = stmt
            .query_map(params, document_from_row)
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(docs)
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentRecord> {
    let metadata: String = row.get(5)?;
    let metadata = match serde_json::from_str::<Value>(&metadata) {
        Ok(Value::Object(map)) => map,
        _ => Metadata::new(),
    };

    Ok(DocumentRecord {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        user_id: row.get(2)?,
        file_name: row.get(3)?,
        mime_type: row.get(4)?,
        metadata,
        google_drive_link: row.get(6)?,
        google_drive_id: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}
