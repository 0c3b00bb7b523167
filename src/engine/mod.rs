//! Conversation engine
//!
//! Interprets each inbound event against the sender's session and drives the
//! upload, search and folder-browsing flows. Handlers never fail: downstream
//! errors are logged and turned into a reply for the user.
//!
//! ```text
//! Idle ──media──▶ AwaitingMetadata ──text──▶ AwaitingFolderChoice
//!                                               │ folder_default ──▶ finalize
//!                                               │ folder_existing ─▶ AwaitingExistingFolderPick ──▶ finalize
//!                                               │ folder_new ──────▶ AwaitingNewFolderName ───────▶ finalize
//! Idle ──explore_folders──▶ Exploring ──folder──▶ BrowsingDocuments ──document──▶ Idle
//! Idle ──get_documents──▶ Searching ──text──▶ Idle
//! ```

pub mod event;
pub mod folders;
pub mod gate;
pub mod metadata;
pub mod prompts;
pub mod retriever;
pub mod upload;

use std::sync::Arc;

pub use event::{InboundEvent, InboundMessage, IncomingMedia, ReplyId};
pub use folders::{DEFAULT_FOLDER_NAME, FolderDirectory};
pub use gate::{AccountStatus, check_status};
pub use metadata::parse_metadata;
pub use retriever::{DocumentPage, DocumentRetriever, FolderListing, PAGE_SIZE, paginate};
pub use upload::{FinalizeOutcome, UploadFinalizer};

use crate::channels::{Button, ListPrompt, MediaSource, Messenger};
use crate::db::{DbPool, DocumentRepo, Folder, UserRepo};
use crate::drive::DriveClient;
use crate::session::{
    DocumentSelectionState, FolderExplorationState, FolderSelectionState, FolderStage,
    PendingUpload, Session, SessionStore, TargetFolder,
};

/// Reply when a flow fails for reasons the user cannot act on
const GENERIC_FAILURE: &str = "Something went wrong. Please try again later.";

/// The per-user conversational state machine
pub struct ConversationEngine {
    users: UserRepo,
    sessions: SessionStore,
    messenger: Arc<dyn Messenger>,
    folders: FolderDirectory,
    finalizer: UploadFinalizer,
    retriever: DocumentRetriever,
}

impl ConversationEngine {
    /// Create an engine over the given store and capabilities
    #[must_use]
    pub fn new(
        pool: DbPool,
        messenger: Arc<dyn Messenger>,
        media: Arc<dyn MediaSource>,
        drive: Arc<dyn DriveClient>,
        sessions: SessionStore,
    ) -> Self {
        let users = UserRepo::new(pool.clone());
        let documents = DocumentRepo::new(pool);

        Self {
            folders: FolderDirectory::new(users.clone(), documents.clone(), Arc::clone(&drive)),
            finalizer: UploadFinalizer::new(users.clone(), documents.clone(), media, drive),
            retriever: DocumentRetriever::new(documents),
            users,
            sessions,
            messenger,
        }
    }

    /// Session store, for inspection
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one inbound message
    ///
    /// Holds the sender's session for the whole event.
    pub async fn handle(&self, message: InboundMessage) {
        let InboundMessage { from, id, event } = message;
        let phone = from.as_str();
        let mut session = self.sessions.lock(phone).await;

        tracing::debug!(phone, message_id = ?id, ?event, "handling event");

        match event {
            InboundEvent::Media(media) => self.on_media(&mut session, phone, media).await,
            InboundEvent::ButtonReply(reply) => self.on_reply(&mut session, phone, reply, false).await,
            InboundEvent::ListReply(reply) => self.on_reply(&mut session, phone, reply, true).await,
            InboundEvent::Text(text) => self.on_text(&mut session, phone, &text).await,
            InboundEvent::Unsupported(kind) => {
                tracing::debug!(phone, kind = %kind, "ignoring unsupported message");
            }
        }
    }

    async fn on_media(&self, session: &mut Session, phone: &str, media: IncomingMedia) {
        if session.pending_upload.is_some() {
            self.send_text(phone, prompts::UPLOAD_IN_PROGRESS).await;
            return;
        }

        tracing::info!(phone, kind = media.kind.as_str(), file = %media.file_name, "media received");
        session.folder_selection = None;
        session.pending_upload = Some(PendingUpload::new(
            media.media_id,
            media.kind,
            media.file_name,
            media.mime_type,
        ));
        self.send_text(phone, prompts::media_received(media.kind)).await;
    }

    async fn on_reply(&self, session: &mut Session, phone: &str, reply: ReplyId, from_list: bool) {
        match reply {
            reply @ (ReplyId::FolderDefault | ReplyId::FolderExisting | ReplyId::FolderNew) => {
                self.on_folder_choice(session, phone, &reply).await;
            }
            ReplyId::SavedFolder(folder_id) => {
                let awaiting_pick = session
                    .folder_selection
                    .as_ref()
                    .is_some_and(|s| s.stage == FolderStage::AwaitingExistingSelection);
                if from_list && (awaiting_pick || session.exploration.is_none()) {
                    self.on_existing_pick(session, phone, &folder_id).await;
                } else {
                    self.on_explore_pick(session, phone, &folder_id).await;
                }
            }
            ReplyId::DocumentMeta(document_id) => {
                self.on_document_pick(session, phone, &document_id).await;
            }
            ReplyId::NextPage(page) | ReplyId::PreviousPage(page) => {
                self.on_navigate(session, phone, page).await;
            }
            ReplyId::ExploreFolders => self.on_explore(session, phone).await,
            ReplyId::UploadDocument => {
                if self.gate(phone).await {
                    self.send_text(phone, prompts::UPLOAD_PROMPT).await;
                }
            }
            ReplyId::GetDocuments => {
                if self.gate(phone).await {
                    session.searching = true;
                    self.send_text(phone, prompts::SEARCH_PROMPT).await;
                }
            }
            ReplyId::Unknown(raw) => {
                tracing::debug!(phone, id = %raw, "ignoring unknown reply id");
            }
        }
    }

    async fn on_text(&self, session: &mut Session, phone: &str, text: &str) {
        if !self.gate(phone).await {
            return;
        }

        if let Some(stage) = session.folder_selection.as_ref().map(|s| s.stage) {
            match stage {
                FolderStage::AwaitingExistingSelection => {
                    self.on_existing_name(session, phone, text).await;
                }
                FolderStage::AwaitingNewName => self.on_new_name(session, phone, text).await,
                FolderStage::AwaitingSelection => {
                    self.send_text(phone, prompts::CHOOSE_FOLDER_OPTION).await;
                }
            }
            return;
        }

        if let Some(pending) = session.pending_upload.as_mut() {
            if pending.metadata.is_none() {
                pending.metadata = Some(parse_metadata(text));
                tracing::debug!(phone, text, "metadata captured");
            }
            let has_target = pending.target_folder.as_ref().is_some_and(|t| !t.id.is_empty());

            match self.users.find_by_phone(phone) {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => {
                    tracing::warn!(phone, "user missing while capturing metadata");
                    session.pending_upload = None;
                    self.send_text(phone, prompts::USER_NOT_FOUND).await;
                    self.send_main_menu(phone).await;
                    return;
                }
            }

            if has_target {
                self.complete_upload(session, phone).await;
            } else {
                session.folder_selection =
                    Some(FolderSelectionState::new(FolderStage::AwaitingSelection));
                self.send_folder_choice(phone).await;
            }
            return;
        }

        session.searching = false;
        match self.retriever.search(phone, text) {
            Ok(Some(document)) => {
                self.send_text(phone, &prompts::search_result(&document)).await;
            }
            Ok(None) => self.send_text(phone, prompts::DOCUMENT_NOT_FOUND).await,
            Err(e) => {
                tracing::error!(phone, error = %e, "document search failed");
                self.send_text(phone, prompts::SEARCH_FAILED).await;
            }
        }
        self.send_main_menu(phone).await;
    }

    async fn on_folder_choice(&self, session: &mut Session, phone: &str, choice: &ReplyId) {
        if session.pending_upload.is_none() {
            session.folder_selection = None;
            self.send_text(phone, prompts::NOTHING_PENDING).await;
            return;
        }

        match choice {
            ReplyId::FolderDefault => self.on_default_folder(session, phone).await,
            ReplyId::FolderExisting => match self.folders.list_folders(phone) {
                Ok(folders) if folders.is_empty() => {
                    session.folder_selection =
                        Some(FolderSelectionState::new(FolderStage::AwaitingSelection));
                    self.send_text(phone, prompts::NO_SAVED_FOLDERS_UPLOAD).await;
                    self.send_folder_choice(phone).await;
                }
                Ok(folders) => {
                    let list = prompts::saved_folder_list(&folders);
                    session.exploration = None;
                    session.document_selection = None;
                    session.folder_selection = Some(FolderSelectionState::with_folders(
                        FolderStage::AwaitingExistingSelection,
                        folders,
                    ));
                    self.send_list(phone, &list).await;
                }
                Err(e) => {
                    tracing::error!(phone, error = %e, "listing folders failed");
                    self.revert_to_folder_choice(session, phone, prompts::FOLDER_PICK_FAILED)
                        .await;
                }
            },
            ReplyId::FolderNew => {
                session.folder_selection =
                    Some(FolderSelectionState::new(FolderStage::AwaitingNewName));
                self.send_text(phone, prompts::NEW_FOLDER_NAME_PROMPT).await;
            }
            _ => {}
        }
    }

    async fn on_default_folder(&self, session: &mut Session, phone: &str) {
        match self.folders.ensure_default_folder(phone).await {
            Ok(folder) => {
                let target = TargetFolder {
                    id: folder.id,
                    name: folder.name,
                };
                self.commit_folder(session, phone, target, Some("default folder"))
                    .await;
            }
            Err(e) => {
                tracing::error!(phone, error = %e, "default folder unavailable");
                self.revert_to_folder_choice(session, phone, prompts::DEFAULT_FOLDER_FAILED)
                    .await;
            }
        }
    }

    /// Saved-folder pick from the list shown for a pending upload
    async fn on_existing_pick(&self, session: &mut Session, phone: &str, folder_id: &str) {
        if session.pending_upload.is_none() {
            session.folder_selection = None;
            self.send_text(phone, prompts::NOTHING_PENDING).await;
            return;
        }

        let Some(folders) = self.folder_snapshot(session, phone) else {
            self.revert_to_folder_choice(session, phone, prompts::FOLDER_PICK_FAILED)
                .await;
            return;
        };

        let Some(folder) = folders.iter().find(|f| f.id == folder_id).cloned() else {
            self.send_text(phone, prompts::FOLDER_PICK_NOT_FOUND).await;
            self.keep_existing_selection(session, phone, folders, true).await;
            return;
        };

        let target = TargetFolder {
            id: folder.id,
            name: folder.name,
        };
        self.commit_folder(session, phone, target, None).await;
    }

    /// Typed index or name while the saved-folder list is shown
    async fn on_existing_name(&self, session: &mut Session, phone: &str, text: &str) {
        if session.pending_upload.is_none() {
            session.folder_selection = None;
            self.send_text(phone, prompts::NOTHING_PENDING).await;
            return;
        }

        let name = text.trim();
        if name.is_empty() {
            self.send_text(phone, prompts::FOLDER_INDEX_PROMPT).await;
            return;
        }

        let Some(folders) = self.folder_snapshot(session, phone) else {
            self.revert_to_folder_choice(session, phone, prompts::FOLDER_NAME_FAILED)
                .await;
            return;
        };

        let local = match name.parse::<usize>() {
            Ok(n) if (1..=folders.len()).contains(&n) => Some(folders[n - 1].clone()),
            _ => {
                let lowered = name.to_lowercase();
                folders.iter().find(|f| f.name.to_lowercase() == lowered).cloned()
            }
        };

        let selected = if let Some(folder) = local {
            folder
        } else {
            match self.folders.find_remote_folder(phone, name).await {
                Ok(Some(found)) => {
                    let folder = Folder::new(found.id, found.name);
                    if let Err(e) = self.folders.persist_folder(phone, &folder) {
                        tracing::error!(phone, error = %e, "persisting folder failed");
                        self.revert_to_folder_choice(session, phone, prompts::FOLDER_NAME_FAILED)
                            .await;
                        return;
                    }
                    folder
                }
                Ok(None) => {
                    self.send_text(phone, prompts::FOLDER_NAME_NOT_FOUND).await;
                    self.keep_existing_selection(session, phone, folders, false).await;
                    return;
                }
                Err(e) => {
                    tracing::error!(phone, error = %e, "Drive folder lookup failed");
                    self.revert_to_folder_choice(session, phone, prompts::FOLDER_NAME_FAILED)
                        .await;
                    return;
                }
            }
        };

        let target = TargetFolder {
            id: selected.id,
            name: selected.name,
        };
        self.commit_folder(session, phone, target, None).await;
    }

    async fn on_new_name(&self, session: &mut Session, phone: &str, text: &str) {
        if session.pending_upload.is_none() {
            session.folder_selection = None;
            self.send_text(phone, prompts::NOTHING_PENDING).await;
            return;
        }

        let name = text.trim();
        if name.is_empty() {
            self.send_text(phone, prompts::FOLDER_NAME_REQUIRED).await;
            return;
        }

        match self.folders.resolve_new_folder(phone, name).await {
            Ok(folder) => {
                let target = TargetFolder {
                    id: folder.id,
                    name: folder.name,
                };
                self.commit_folder(session, phone, target, Some("new")).await;
            }
            Err(e) => {
                tracing::error!(phone, error = %e, "creating folder failed");
                self.revert_to_folder_choice(session, phone, prompts::FOLDER_CREATE_FAILED)
                    .await;
            }
        }
    }

    /// Attach `target` to the pending upload and finalize it
    async fn commit_folder(
        &self,
        session: &mut Session,
        phone: &str,
        target: TargetFolder,
        suffix: Option<&str>,
    ) {
        let Some(pending) = session.pending_upload.as_mut() else {
            session.folder_selection = None;
            self.send_text(phone, prompts::NOTHING_PENDING).await;
            return;
        };

        let confirmation = prompts::folder_selected(&target.name, suffix);
        tracing::info!(phone, folder_id = %target.id, "folder selected");
        pending.target_folder = Some(target);
        session.folder_selection = None;

        self.send_text(phone, &confirmation).await;
        self.complete_upload(session, phone).await;
    }

    async fn complete_upload(&self, session: &mut Session, phone: &str) {
        let Some(pending) = session.pending_upload.clone() else {
            session.clear_upload();
            self.send_text(phone, prompts::NOTHING_TO_SAVE).await;
            return;
        };

        match self.finalizer.finalize(phone, &pending).await {
            Ok(FinalizeOutcome::Saved { view_link, .. }) => {
                session.clear_upload();
                self.send_text(phone, &prompts::document_saved(&view_link)).await;
                self.send_main_menu(phone).await;
            }
            Ok(FinalizeOutcome::MissingMetadata) => {
                session.clear_upload();
                self.send_text(phone, prompts::NOTHING_TO_SAVE).await;
            }
            Ok(FinalizeOutcome::MissingFolder) => {
                session.folder_selection =
                    Some(FolderSelectionState::new(FolderStage::AwaitingSelection));
                self.send_text(phone, prompts::FOLDER_REQUIRED).await;
                self.send_folder_choice(phone).await;
            }
            Ok(FinalizeOutcome::UserNotFound) => {
                session.clear_upload();
                self.send_text(phone, prompts::USER_NOT_FOUND).await;
            }
            Err(e) => {
                tracing::error!(phone, error = %e, "saving document failed");
                session.clear_upload();
                self.send_text(phone, prompts::SAVE_FAILED).await;
                self.send_main_menu(phone).await;
            }
        }
    }

    async fn on_explore(&self, session: &mut Session, phone: &str) {
        session.exploration = None;
        session.document_selection = None;

        if !self.gate(phone).await {
            return;
        }

        match self.folders.list_folders(phone) {
            Ok(folders) if folders.is_empty() => {
                self.send_text(phone, prompts::NO_SAVED_FOLDERS_EXPLORE).await;
            }
            Ok(folders) => {
                let list = prompts::saved_folder_list(&folders);
                session.exploration = Some(FolderExplorationState { folders });
                self.send_list(phone, &list).await;
            }
            Err(e) => {
                tracing::error!(phone, error = %e, "listing folders failed");
                self.send_text(phone, GENERIC_FAILURE).await;
            }
        }
    }

    async fn on_explore_pick(&self, session: &mut Session, phone: &str, folder_id: &str) {
        let folders = match session.exploration.take() {
            Some(state) => state.folders,
            None => self.folders.list_folders(phone).unwrap_or_else(|e| {
                tracing::error!(phone, error = %e, "listing folders failed");
                Vec::new()
            }),
        };

        let Some(folder) = folders.into_iter().find(|f| f.id == folder_id) else {
            self.send_text(phone, prompts::EXPLORE_FOLDER_NOT_FOUND).await;
            return;
        };

        let listing = match self.retriever.list_by_folder(phone, &folder.id) {
            Ok(listing) => listing,
            Err(e) => {
                tracing::error!(phone, error = %e, "listing documents failed");
                self.send_text(phone, GENERIC_FAILURE).await;
                return;
            }
        };

        let Some(page) = paginate(&listing.documents, 0) else {
            self.send_text(phone, &prompts::empty_folder(&folder.name)).await;
            return;
        };
        let list = prompts::document_list(&folder.name, &page);

        session.document_selection = Some(DocumentSelectionState {
            folder,
            documents: listing.documents,
            current_page: 0,
            total_count: listing.total_count,
        });
        self.send_list(phone, &list).await;
    }

    async fn on_document_pick(&self, session: &mut Session, phone: &str, document_id: &str) {
        let Some(state) = session.document_selection.take() else {
            self.send_text(phone, prompts::EXPLORE_DOCUMENT_NOT_FOUND).await;
            return;
        };

        let Some(document) = state.documents.iter().find(|d| d.id == document_id) else {
            self.send_text(phone, prompts::EXPLORE_DOCUMENT_NOT_FOUND).await;
            return;
        };

        self.send_text(phone, &prompts::document_detail(&state.folder.name, document))
            .await;
        self.send_main_menu(phone).await;
    }

    async fn on_navigate(&self, session: &mut Session, phone: &str, page: Option<usize>) {
        let Some(state) = session.document_selection.as_mut() else {
            self.send_text(phone, prompts::SESSION_EXPIRED).await;
            return;
        };
        let Some(page) = page else {
            self.send_text(phone, prompts::INVALID_NAVIGATION).await;
            return;
        };

        let Some(view) = paginate(&state.documents, page) else {
            let reply = prompts::empty_folder(&state.folder.name);
            self.send_text(phone, &reply).await;
            return;
        };
        state.current_page = view.page;
        let list = prompts::document_list(&state.folder.name, &view);
        self.send_list(phone, &list).await;
    }

    /// Snapshot shown with the saved-folder list, or a fresh listing
    fn folder_snapshot(&self, session: &Session, phone: &str) -> Option<Vec<Folder>> {
        if let Some(folders) = session
            .folder_selection
            .as_ref()
            .and_then(|s| s.folders.clone())
        {
            return Some(folders);
        }
        self.folders
            .list_folders(phone)
            .map_err(|e| tracing::error!(phone, error = %e, "listing folders failed"))
            .ok()
    }

    /// Stay on the saved-folder list if there is one, else fall back to the
    /// three folder buttons
    async fn keep_existing_selection(
        &self,
        session: &mut Session,
        phone: &str,
        folders: Vec<Folder>,
        resend_list: bool,
    ) {
        if folders.is_empty() {
            session.folder_selection =
                Some(FolderSelectionState::new(FolderStage::AwaitingSelection));
            self.send_folder_choice(phone).await;
            return;
        }

        let list = resend_list.then(|| prompts::saved_folder_list(&folders));
        session.folder_selection = Some(FolderSelectionState::with_folders(
            FolderStage::AwaitingExistingSelection,
            folders,
        ));
        if let Some(list) = list {
            self.send_list(phone, &list).await;
        }
    }

    async fn revert_to_folder_choice(&self, session: &mut Session, phone: &str, reply: &str) {
        session.folder_selection = Some(FolderSelectionState::new(FolderStage::AwaitingSelection));
        self.send_text(phone, reply).await;
        self.send_folder_choice(phone).await;
    }

    /// Run the account gate, replying with the refusal if there is one
    async fn gate(&self, phone: &str) -> bool {
        let status = check_status(&self.users, phone);
        match status.refusal() {
            None => true,
            Some(reply) => {
                tracing::info!(phone, ?status, "account gate refused");
                self.send_text(phone, reply).await;
                false
            }
        }
    }

    async fn send_text(&self, phone: &str, body: &str) {
        if let Err(e) = self.messenger.send_text(phone, body).await {
            tracing::error!(phone, error = %e, "failed to send text");
        }
    }

    async fn send_buttons(&self, phone: &str, body: &str, buttons: &[Button]) {
        if let Err(e) = self.messenger.send_buttons(phone, body, buttons).await {
            tracing::error!(phone, error = %e, "failed to send buttons");
        }
    }

    async fn send_list(&self, phone: &str, list: &ListPrompt) {
        if let Err(e) = self.messenger.send_list(phone, list).await {
            tracing::error!(phone, error = %e, "failed to send list");
        }
    }

    async fn send_main_menu(&self, phone: &str) {
        self.send_buttons(phone, prompts::MAIN_MENU, &prompts::main_menu_buttons())
            .await;
    }

    async fn send_folder_choice(&self, phone: &str) {
        self.send_buttons(phone, prompts::FOLDER_CHOICE, &prompts::folder_choice_buttons())
            .await;
    }
}
