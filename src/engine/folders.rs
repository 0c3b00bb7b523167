//! Folder directory: the folders a user knows about, and the default folder

use std::collections::HashSet;
use std::sync::Arc;

use chrono::SecondsFormat;

use crate::db::{DocumentRepo, Folder, UserRepo};
use crate::drive::{DriveClient, DriveFolder, NameMatch};
use crate::{Error, Result};

/// Name of the folder uploads go to by default
pub const DEFAULT_FOLDER_NAME: &str = "WhatsAppBotUpload";

/// Older deployments created the default folder under this name
const LEGACY_DEFAULT_FOLDER_NAME: &str = "WhatsAppBotUploads";

/// Known folders for a user, backed by document metadata, the user's explicit
/// folder list, and Drive
#[derive(Clone)]
pub struct FolderDirectory {
    users: UserRepo,
    documents: DocumentRepo,
    drive: Arc<dyn DriveClient>,
}

impl FolderDirectory {
    #[must_use]
    pub fn new(users: UserRepo, documents: DocumentRepo, drive: Arc<dyn DriveClient>) -> Self {
        Self {
            users,
            documents,
            drive,
        }
    }

    /// Folders a user has filed documents into, then explicitly saved ones
    ///
    /// Deduplicated by id; the first occurrence wins. Folders referenced by
    /// documents come first, oldest document first.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    pub fn list_folders(&self, phone: &str) -> Result<Vec<Folder>> {
        let mut seen = HashSet::new();
        let mut folders = Vec::new();

        for doc in self.documents.list_with_folder(phone)? {
            let Some(folder) = doc.folder() else {
                continue;
            };
            if !seen.insert(folder.id.clone()) {
                continue;
            }
            folders.push(Folder {
                id: folder.id,
                name: folder.name,
                saved_at: folder.saved_at.or_else(|| {
                    Some(doc.created_at.to_rfc3339_opts(SecondsFormat::Millis, true))
                }),
                is_default: folder.is_default,
            });
        }

        if let Some(user) = self.users.find_by_phone(phone)? {
            for folder in user.folders {
                if seen.insert(folder.id.clone()) {
                    folders.push(folder);
                }
            }
        }

        Ok(folders)
    }

    /// Record a folder in the user's explicit list (upsert by id)
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not exist
    pub fn persist_folder(&self, phone: &str, folder: &Folder) -> Result<()> {
        if folder.id.is_empty() || folder.name.is_empty() {
            return Ok(());
        }
        self.users.upsert_folder(phone, folder)?;
        tracing::debug!(phone, folder_id = %folder.id, "folder persisted");
        Ok(())
    }

    /// Resolve the user's default folder, finding or creating it in Drive
    ///
    /// # Errors
    ///
    /// Returns error if the user is unknown or Drive and the store fail
    pub async fn ensure_default_folder(&self, phone: &str) -> Result<Folder> {
        let user = self
            .users
            .find_by_phone(phone)?
            .ok_or_else(|| Error::NotFound(format!("user {phone}")))?;

        let resolved = if let Some(id) = user.default_folder_id {
            let name = user
                .folders
                .iter()
                .find(|f| f.id == id)
                .map_or_else(|| DEFAULT_FOLDER_NAME.to_string(), |f| f.name.clone());
            DriveFolder { id, name }
        } else if let Some(existing) = self.find_default_remote(phone).await? {
            existing
        } else {
            let created = self.drive.create_folder(phone, DEFAULT_FOLDER_NAME).await?;
            tracing::info!(phone, folder_id = %created.id, "default folder created");
            created
        };

        self.users.set_default_folder(phone, &resolved.id)?;

        let mut folder = Folder::new(resolved.id, resolved.name);
        folder.is_default = true;
        if let Err(e) = self.persist_folder(phone, &folder) {
            tracing::warn!(phone, error = %e, "unable to persist default folder");
        }

        Ok(folder)
    }

    /// Look up a Drive folder by name
    ///
    /// An exact name match wins. Otherwise, among folders whose name contains
    /// `name`, a case-insensitive match is preferred over the first result.
    ///
    /// # Errors
    ///
    /// Returns error if Drive fails
    pub async fn find_remote_folder(&self, phone: &str, name: &str) -> Result<Option<DriveFolder>> {
        let exact = self
            .drive
            .list_folders_by_name(phone, name, NameMatch::Exact)
            .await?;
        if let Some(folder) = exact.into_iter().next() {
            return Ok(Some(folder));
        }

        let mut candidates = self
            .drive
            .list_folders_by_name(phone, name, NameMatch::Contains)
            .await?;
        let lowered = name.to_lowercase();
        let position = candidates
            .iter()
            .position(|f| f.name.to_lowercase() == lowered)
            .unwrap_or(0);

        if candidates.is_empty() {
            Ok(None)
        } else {
            Ok(Some(candidates.swap_remove(position)))
        }
    }

    /// Folder to file into for a user-typed new folder name
    ///
    /// Reuses an existing Drive folder with the same name (ignoring case),
    /// otherwise creates one. The result is persisted to the explicit list.
    ///
    /// # Errors
    ///
    /// Returns error if Drive or the store fail
    pub async fn resolve_new_folder(&self, phone: &str, name: &str) -> Result<DriveFolder> {
        let folder = match self.find_remote_folder(phone, name).await? {
            Some(found) if found.name.to_lowercase() == name.to_lowercase() => found,
            _ => {
                let created = self.drive.create_folder(phone, name).await?;
                tracing::info!(phone, folder_id = %created.id, "folder created");
                created
            }
        };

        self.persist_folder(phone, &Folder::new(folder.id.clone(), folder.name.clone()))?;
        Ok(folder)
    }

    async fn find_default_remote(&self, phone: &str) -> Result<Option<DriveFolder>> {
        for candidate in [DEFAULT_FOLDER_NAME, LEGACY_DEFAULT_FOLDER_NAME] {
            if let Some(folder) = self.find_remote_folder(phone, candidate).await?
                && is_default_folder_name(&folder.name)
            {
                return Ok(Some(folder));
            }
        }
        Ok(None)
    }
}

fn is_default_folder_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    lowered == DEFAULT_FOLDER_NAME.to_lowercase()
        || lowered == LEGACY_DEFAULT_FOLDER_NAME.to_lowercase()
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::channels::MediaStream;
    use crate::db::{Metadata, NewDocument, init_memory};
    use crate::drive::UploadedFile;

    /// Drive with a fixed folder list and no writes
    struct FixedDrive(Vec<DriveFolder>);

    #[async_trait]
    impl DriveClient for FixedDrive {
        async fn list_folders_by_name(
            &self,
            _phone: &str,
            name: &str,
            matching: NameMatch,
        ) -> Result<Vec<DriveFolder>> {
            Ok(self
                .0
                .iter()
                .filter(|f| match matching {
                    NameMatch::Exact => f.name == name,
                    NameMatch::Contains => f.name.contains(name),
                })
                .cloned()
                .collect())
        }

        async fn create_folder(&self, _phone: &str, _name: &str) -> Result<DriveFolder> {
            Err(Error::Drive("read-only".to_string()))
        }

        async fn upload_file(
            &self,
            _phone: &str,
            _folder_id: &str,
            _body: MediaStream,
            _file_name: &str,
            _mime_type: &str,
        ) -> Result<UploadedFile> {
            Err(Error::Drive("read-only".to_string()))
        }
    }

    fn folder(id: &str, name: &str) -> DriveFolder {
        DriveFolder {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn setup(drive: Vec<DriveFolder>) -> (FolderDirectory, DocumentRepo, UserRepo, String) {
        let pool = init_memory().unwrap();
        let users = UserRepo::new(pool.clone());
        let documents = DocumentRepo::new(pool);
        let user = users.create("1555", None).unwrap();
        let dir = FolderDirectory::new(users.clone(), documents.clone(), Arc::new(FixedDrive(drive)));
        (dir, documents, users, user.id)
    }

    fn insert(documents: &DocumentRepo, user_id: &str, metadata: serde_json::Value) {
        let serde_json::Value::Object(metadata) = metadata else {
            panic!("object expected");
        };
        let metadata: Metadata = metadata;
        documents
            .create(&NewDocument {
                phone_number: "1555",
                user_id,
                file_name: "a.jpg",
                mime_type: "image/jpeg",
                metadata: &metadata,
                google_drive_link: None,
                google_drive_id: None,
            })
            .unwrap();
    }

    #[test]
    fn test_list_folders_dedups_across_shapes() {
        let (dir, documents, users, user_id) = setup(vec![]);
        insert(&documents, &user_id, json!({"folder": {"id": "f1", "name": "Taxes"}}));
        insert(&documents, &user_id, json!({"folderId": "f1", "folderName": "Taxes old"}));
        insert(&documents, &user_id, json!({"folder_id": "f2", "folder_name": "Receipts"}));
        insert(&documents, &user_id, json!({"folder": {"id": "f3"}}));
        users.upsert_folder("1555", &Folder::new("f2", "Receipts")).unwrap();
        users.upsert_folder("1555", &Folder::new("f4", "Empty")).unwrap();

        let folders = dir.list_folders("1555").unwrap();
        let ids: Vec<_> = folders.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["f1", "f2", "f4"]);
        assert_eq!(folders[0].name, "Taxes");
        assert!(folders[0].saved_at.is_some());
    }

    #[test]
    fn test_list_folders_unknown_user_is_empty() {
        let (dir, ..) = setup(vec![]);
        assert!(dir.list_folders("nobody").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_remote_folder_strategy() {
        let (dir, ..) = setup(vec![
            folder("a", "Tax Archive"),
            folder("b", "tax"),
            folder("c", "Invoices"),
        ]);

        // Exact match first
        let found = dir.find_remote_folder("1555", "Invoices").await.unwrap().unwrap();
        assert_eq!(found.id, "c");

        // "Tax" has no exact match: "contains" is case-sensitive here, so only
        // "Tax Archive" is a candidate and it is returned as first result
        let found = dir.find_remote_folder("1555", "Tax").await.unwrap().unwrap();
        assert_eq!(found.id, "a");

        assert!(dir.find_remote_folder("1555", "Missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_folder_accepts_legacy_name() {
        let (dir, _, users, _) = setup(vec![folder("legacy", "WhatsAppBotUploads")]);
        let default = dir.ensure_default_folder("1555").await.unwrap();
        assert_eq!(default.id, "legacy");
        assert!(default.is_default);

        let user = users.find_by_phone("1555").unwrap().unwrap();
        assert_eq!(user.default_folder_id.as_deref(), Some("legacy"));
        assert_eq!(user.folders.len(), 1);
        assert!(user.folders[0].is_default);
    }

    #[tokio::test]
    async fn test_recorded_default_uses_saved_name() {
        let (dir, _, users, _) = setup(vec![]);
        users.set_default_folder("1555", "f9").unwrap();
        // Not in the explicit list yet: constant name
        let default = dir.ensure_default_folder("1555").await.unwrap();
        assert_eq!(default.name, DEFAULT_FOLDER_NAME);

        users.upsert_folder("1555", &Folder::new("f9", "My Uploads")).unwrap();
        let default = dir.ensure_default_folder("1555").await.unwrap();
        assert_eq!(default.id, "f9");
        assert_eq!(default.name, "My Uploads");
    }

    #[tokio::test]
    async fn test_default_folder_create_failure_surfaces() {
        let (dir, ..) = setup(vec![folder("x", "WhatsAppBotUpload backup")]);
        assert!(dir.ensure_default_folder("1555").await.is_err());
    }
}
