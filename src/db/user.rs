//! User repository for CRUD operations

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DbPool;
use crate::{Error, Result};

/// Account status that gates conversational access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Active,
    Inactive,
}

impl UserStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

/// A Drive folder known for a user
///
/// Stored in the user's explicit folder list and reconstructed from
/// document metadata. Identity is the Drive folder id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl Folder {
    /// Create a folder entry stamped with the current time
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            saved_at: Some(now_string()),
            is_default: false,
        }
    }
}

/// A user
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub phone_number: String,
    pub user_name: Option<String>,
    pub status: UserStatus,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub default_folder_id: Option<String>,
    pub folders: Vec<Folder>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Whether Google Drive credentials are linked
    #[must_use]
    pub fn is_drive_linked(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

const USER_COLUMNS: &str = "id, phone_number, user_name, status, access_token, refresh_token, \
     token_expiry, default_folder_id, folders, created_at, updated_at";

/// User repository
#[derive(Clone)]
pub struct UserRepo {
    pool: DbPool,
}

impl UserRepo {
    /// Create a new user repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a user for a phone number
    ///
    /// # Errors
    ///
    /// Returns error if the phone number is already registered or the database fails
    pub fn create(&self, phone_number: &str, user_name: Option<&str>) -> Result<User> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = now_string();

        conn.execute(
            "INSERT INTO users (id, phone_number, user_name, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![id, phone_number, user_name, now],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(User {
            id,
            phone_number: phone_number.to_string(),
            user_name: user_name.map(ToString::to_string),
            status: UserStatus::Active,
            access_token: None,
            refresh_token: None,
            token_expiry: None,
            default_folder_id: None,
            folders: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
    }

    /// Find a user by phone number (returns None if not found)
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find_by_phone(&self, phone_number: &str) -> Result<Option<User>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE phone_number = ?1"),
                [phone_number],
                user_from_row,
            )
            .optional()?;

        Ok(user)
    }

    /// Find a user by internal ID (returns None if not found)
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find(&self, id: &str) -> Result<Option<User>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                user_from_row,
            )
            .optional()?;

        Ok(user)
    }

    /// Set a user's account status
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no user has this phone number
    pub fn set_status(&self, phone_number: &str, status: UserStatus) -> Result<()> {
        self.update(
            phone_number,
            "UPDATE users SET status = ?1, updated_at = ?2 WHERE phone_number = ?3",
            rusqlite::params![status.as_str(), now_string(), phone_number],
        )
    }

    /// Store Google Drive credentials for a user
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no user has this phone number
    pub fn set_drive_tokens(
        &self,
        phone_number: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.update(
            phone_number,
            "UPDATE users SET access_token = ?1, refresh_token = COALESCE(?2, refresh_token),
                 token_expiry = ?3, updated_at = ?4 WHERE phone_number = ?5",
            rusqlite::params![
                access_token,
                refresh_token,
                expiry.map(|e| e.to_rfc3339_opts(SecondsFormat::Secs, true)),
                now_string(),
                phone_number
            ],
        )
    }

    /// Record the user's default folder
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no user has this phone number
    pub fn set_default_folder(&self, phone_number: &str, folder_id: &str) -> Result<()> {
        self.update(
            phone_number,
            "UPDATE users SET default_folder_id = ?1, updated_at = ?2 WHERE phone_number = ?3",
            rusqlite::params![folder_id, now_string(), phone_number],
        )
    }

    /// Insert or replace a folder (by id) in the user's explicit folder list
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no user has this phone number
    pub fn upsert_folder(&self, phone_number: &str, folder: &Folder) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;
        let tx = conn.transaction()?;

        let raw: Option<String> = tx
            .query_row(
                "SELECT folders FROM users WHERE phone_number = ?1",
                [phone_number],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Err(Error::NotFound(format!("user {phone_number}")));
        };

        let mut folders = parse_folders(&raw);
        if let Some(existing) = folders.iter_mut().find(|f| f.id == folder.id) {
            *existing = folder.clone();
        } else {
            folders.push(folder.clone());
        }

        tx.execute(
            "UPDATE users SET folders = ?1, updated_at = ?2 WHERE phone_number = ?3",
            rusqlite::params![serde_json::to_string(&folders)?, now_string(), phone_number],
        )?;
        tx.commit()?;

        Ok(())
    }

    /// List all users
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_all(&self) -> Result<Vec<User>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"))
            .map_err(|e| Error::Database(e.to_string()))?;

        let users = stmt
            .query_map([], user_from_row)
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(users)
    }

    fn update(&self, phone_number: &str, sql: &str, params: impl rusqlite::Params) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let changed = conn
            .execute(sql, params)
            .map_err(|e| Error::Database(e.to_string()))?;

        if changed == 0 {
            return Err(Error::NotFound(format!("user {phone_number}")));
        }
        Ok(())
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let status: String = row.get(3)?;
    let expiry: Option<String> = row.get(6)?;
    let folders: String = row.get(8)?;

    Ok(User {
        id: row.get(0)?,
        phone_number: row.get(1)?,
        user_name: row.get(2)?,
        status: UserStatus::parse(&status).unwrap_or(UserStatus::Inactive),
        access_token: row.get(4)?,
        refresh_token: row.get(5)?,
        token_expiry: expiry.as_deref().map(parse_datetime),
        default_folder_id: row.get(7)?,
        folders: parse_folders(&folders),
        created_at: parse_datetime(&row.get::<_, String>(9)?),
        updated_at: parse_datetime(&row.get::<_, String>(10)?),
    })
}

/// Parse a stored folder list, dropping entries without both id and name
fn parse_folders(raw: &str) -> Vec<Folder> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw).unwrap_or_default();
    values
        .into_iter()
        .filter_map(|v| serde_json::from_value::<Folder>(v).ok())
        .filter(|f| !f.id.is_empty() && !f.name.is_empty())
        .collect()
}

pub(crate) fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
