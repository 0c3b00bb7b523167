//! Per-phone conversational state
//!
//! Every inbound event for a phone number runs with exclusive access to that
//! number's [`Session`], obtained through [`SessionStore::lock`].

mod dedup;
mod store;

use std::time::{Duration, Instant};

pub use dedup::Deduplicator;
pub use store::{SessionGuard, SessionStore};

use crate::db::{DocumentRecord, Folder, Metadata};

/// Kind of media the user sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Document,
}

impl MediaKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
        }
    }
}

/// Folder an upload will be filed into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFolder {
    pub id: String,
    pub name: String,
}

/// Media received and waiting for metadata and a folder
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub media_id: String,
    pub kind: MediaKind,
    pub file_name: String,
    pub mime_type: String,
    /// Parsed description, `None` until the user sends it
    pub metadata: Option<Metadata>,
    pub target_folder: Option<TargetFolder>,
}

impl PendingUpload {
    #[must_use]
    pub fn new(
        media_id: impl Into<String>,
        kind: MediaKind,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            media_id: media_id.into(),
            kind,
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            metadata: None,
            target_folder: None,
        }
    }
}

/// Where the user is in choosing a folder for a pending upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderStage {
    /// Three folder buttons are shown
    AwaitingSelection,
    /// Saved-folder list is shown; expecting a pick, index or name
    AwaitingExistingSelection,
    /// Expecting the name of a folder to create
    AwaitingNewName,
}

impl FolderStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingSelection => "awaiting_selection",
            Self::AwaitingExistingSelection => "awaiting_existing_selection",
            Self::AwaitingNewName => "awaiting_new_name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderSelectionState {
    pub stage: FolderStage,
    /// Folder snapshot shown to the user, if any
    pub folders: Option<Vec<Folder>>,
}

impl FolderSelectionState {
    #[must_use]
    pub const fn new(stage: FolderStage) -> Self {
        Self {
            stage,
            folders: None,
        }
    }

    #[must_use]
    pub const fn with_folders(stage: FolderStage, folders: Vec<Folder>) -> Self {
        Self {
            stage,
            folders: Some(folders),
        }
    }
}

/// Folder chooser shown after "Explore"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderExplorationState {
    pub folders: Vec<Folder>,
}

/// Documents of an explored folder, browsed page by page
#[derive(Debug, Clone)]
pub struct DocumentSelectionState {
    pub folder: Folder,
    pub documents: Vec<DocumentRecord>,
    pub current_page: usize,
    pub total_count: usize,
}

/// All conversational state for one phone number
#[derive(Debug, Clone)]
pub struct Session {
    pub pending_upload: Option<PendingUpload>,
    pub folder_selection: Option<FolderSelectionState>,
    pub exploration: Option<FolderExplorationState>,
    pub document_selection: Option<DocumentSelectionState>,
    /// Set by "Get document" until the next search
    pub searching: bool,
    last_activity: Instant,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            pending_upload: None,
            folder_selection: None,
            exploration: None,
            document_selection: None,
            searching: false,
            last_activity: Instant::now(),
        }
    }
}

impl Session {
    /// Whether no flow is in progress
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.pending_upload.is_none()
            && self.folder_selection.is_none()
            && self.exploration.is_none()
            && self.document_selection.is_none()
            && !self.searching
    }

    /// Drop the pending upload together with its folder selection
    pub fn clear_upload(&mut self) {
        self.pending_upload = None;
        self.folder_selection = None;
    }

    /// Drop every flow
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn is_expired(&self, ttl: Duration) -> bool {
        self.last_activity.elapsed() > ttl
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}
