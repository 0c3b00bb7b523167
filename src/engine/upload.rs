//! Upload finalizer: media to Drive, then a document record

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::Result;
use crate::channels::MediaSource;
use crate::db::{DocumentRecord, DocumentRepo, NewDocument, UserRepo};
use crate::drive::DriveClient;
use crate::session::PendingUpload;

/// Result of trying to finalize a pending upload
#[derive(Debug)]
pub enum FinalizeOutcome {
    Saved {
        document: DocumentRecord,
        view_link: String,
    },
    /// The upload has no metadata yet
    MissingMetadata,
    /// The upload has no target folder yet
    MissingFolder,
    /// The phone number has no user record
    UserNotFound,
}

/// Moves a complete pending upload into Drive and the document store
#[derive(Clone)]
pub struct UploadFinalizer {
    users: UserRepo,
    documents: DocumentRepo,
    media: Arc<dyn MediaSource>,
    drive: Arc<dyn DriveClient>,
}

impl UploadFinalizer {
    #[must_use]
    pub fn new(
        users: UserRepo,
        documents: DocumentRepo,
        media: Arc<dyn MediaSource>,
        drive: Arc<dyn DriveClient>,
    ) -> Self {
        Self {
            users,
            documents,
            media,
            drive,
        }
    }

    /// Finalize `pending` for `phone`
    ///
    /// Precondition failures are reported as outcomes; only fetch, upload and
    /// persistence failures are errors.
    ///
    /// # Errors
    ///
    /// Returns error if the media cannot be fetched, Drive rejects the upload,
    /// or the document record cannot be written
    pub async fn finalize(&self, phone: &str, pending: &PendingUpload) -> Result<FinalizeOutcome> {
        let Some(metadata) = &pending.metadata else {
            return Ok(FinalizeOutcome::MissingMetadata);
        };
        let Some(target) = pending.target_folder.as_ref().filter(|t| !t.id.is_empty()) else {
            tracing::warn!(phone, "pending upload has no target folder");
            return Ok(FinalizeOutcome::MissingFolder);
        };
        let Some(user) = self.users.find_by_phone(phone)? else {
            return Ok(FinalizeOutcome::UserNotFound);
        };

        let body = self.media.fetch_media(&pending.media_id).await?;
        let uploaded = self
            .drive
            .upload_file(phone, &target.id, body, &pending.file_name, &pending.mime_type)
            .await?;

        let mut metadata = metadata.clone();
        metadata.insert(
            "folder".to_string(),
            json!({
                "id": target.id,
                "name": target.name,
                "selectedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
        );

        let document = self.documents.create(&NewDocument {
            phone_number: phone,
            user_id: &user.id,
            file_name: &pending.file_name,
            mime_type: &pending.mime_type,
            metadata: &metadata,
            google_drive_link: Some(&uploaded.view_link),
            google_drive_id: Some(&uploaded.id),
        })?;

        tracing::info!(
            phone,
            document_id = %document.id,
            folder_id = %target.id,
            kind = pending.kind.as_str(),
            "document saved"
        );

        Ok(FinalizeOutcome::Saved {
            document,
            view_link: uploaded.view_link,
        })
    }
}
