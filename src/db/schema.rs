//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Users table (one row per WhatsApp number)
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            phone_number TEXT NOT NULL UNIQUE,
            user_name TEXT,
            status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'inactive')),
            access_token TEXT,
            refresh_token TEXT,
            token_expiry TEXT,
            default_folder_id TEXT,
            folders TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Documents filed into Drive
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            phone_number TEXT NOT NULL,
            user_id TEXT NOT NULL REFERENCES users(id),
            file_name TEXT NOT NULL,
            mime_type TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            google_drive_link TEXT,
            google_drive_id TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_documents_phone ON documents(phone_number);
        CREATE INDEX IF NOT EXISTS idx_documents_user ON documents(user_id);

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1");
    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Folder lookups filter on the nested folder id
        CREATE INDEX IF NOT EXISTS idx_documents_folder
            ON documents(phone_number, json_extract(metadata, '$.folder.id'));

        CREATE INDEX IF NOT EXISTS idx_documents_created ON documents(phone_number, created_at);

        PRAGMA user_version = 2;
        ",
    )?;

    tracing::info!("migrated to schema v2");
    Ok(())
}
