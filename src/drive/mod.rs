//! Remote file storage
//!
//! The engine files documents through the [`DriveClient`] capability. Every
//! call is scoped to the phone number whose linked account is used.

mod google;

use async_trait::async_trait;

pub use google::GoogleDrive;

use crate::Result;
use crate::channels::MediaStream;

/// A folder in the user's Drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveFolder {
    pub id: String,
    pub name: String,
}

/// A file stored in Drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub id: String,
    pub view_link: String,
}

/// How a folder name query matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    /// Name equals the query
    Exact,
    /// Name contains the query
    Contains,
}

/// Authenticated storage operations
#[async_trait]
pub trait DriveClient: Send + Sync {
    /// List non-trashed folders whose name matches `name`
    async fn list_folders_by_name(
        &self,
        phone: &str,
        name: &str,
        matching: NameMatch,
    ) -> Result<Vec<DriveFolder>>;

    /// Create a folder at the Drive root
    async fn create_folder(&self, phone: &str, name: &str) -> Result<DriveFolder>;

    /// Upload a file into `folder_id`
    async fn upload_file(
        &self,
        phone: &str,
        folder_id: &str,
        body: MediaStream,
        file_name: &str,
        mime_type: &str,
    ) -> Result<UploadedFile>;
}

/// View link for a Drive file id
#[must_use]
pub fn file_view_link(file_id: &str) -> String {
    format!("https://drive.google.com/file/d/{file_id}/view")
}
