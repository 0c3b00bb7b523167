//! Shared test utilities
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};

use intake_gateway::channels::{Button, ListPrompt, MediaSource, MediaStream, Messenger};
use intake_gateway::db::{self, DocumentRepo, User, UserRepo};
use intake_gateway::drive::{DriveClient, DriveFolder, NameMatch, UploadedFile};
use intake_gateway::engine::{ConversationEngine, InboundEvent, InboundMessage, IncomingMedia, ReplyId};
use intake_gateway::session::{MediaKind, SessionStore};
use intake_gateway::{DbPool, Error, Result};

pub const PHONE: &str = "15550001111";

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Create an active user with Drive credentials
pub fn create_linked_user(db: &DbPool, phone: &str) -> User {
    let repo = UserRepo::new(db.clone());
    repo.create(phone, Some("Test User"))
        .expect("failed to create test user");
    repo.set_drive_tokens(phone, "test-access-token", Some("test-refresh"), None)
        .expect("failed to link drive");
    repo.find_by_phone(phone)
        .expect("failed to read test user")
        .expect("test user exists")
}

/// Something the engine sent
#[derive(Debug, Clone)]
pub enum Sent {
    Text(String),
    Buttons(String, Vec<Button>),
    List(ListPrompt),
}

/// Messenger that records every outbound message
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(String, Sent)>>,
}

impl RecordingMessenger {
    /// Drain everything sent so far
    pub fn take(&self) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .drain(..)
            .map(|(_, sent)| sent)
            .collect()
    }

    /// Drain and keep only text bodies
    pub fn take_texts(&self) -> Vec<String> {
        self.take()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    /// Recipients of everything sent so far, without draining
    pub fn recipients(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(to, _)| to.clone()).collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), Sent::Text(body.to_string())));
        Ok(())
    }

    async fn send_buttons(&self, to: &str, body: &str, buttons: &[Button]) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), Sent::Buttons(body.to_string(), buttons.to_vec())));
        Ok(())
    }

    async fn send_list(&self, to: &str, list: &ListPrompt) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), Sent::List(list.clone())));
        Ok(())
    }
}

/// A file received by [`MemoryDrive`]
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub folder_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Drive backed by in-memory folder and file lists
#[derive(Default)]
pub struct MemoryDrive {
    pub folders: Mutex<Vec<DriveFolder>>,
    pub files: Mutex<Vec<StoredFile>>,
    pub fail_uploads: AtomicBool,
    pub fail_all: AtomicBool,
    next_id: AtomicUsize,
}

impl MemoryDrive {
    pub fn with_folders(folders: &[(&str, &str)]) -> Self {
        let drive = Self::default();
        *drive.folders.lock().unwrap() = folders
            .iter()
            .map(|(id, name)| DriveFolder {
                id: (*id).to_string(),
                name: (*name).to_string(),
            })
            .collect();
        drive
    }

    pub fn files(&self) -> Vec<StoredFile> {
        self.files.lock().unwrap().clone()
    }

    pub fn folder_names(&self) -> Vec<String> {
        self.folders.lock().unwrap().iter().map(|f| f.name.clone()).collect()
    }

    fn check(&self) -> Result<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(Error::Drive("drive unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DriveClient for MemoryDrive {
    async fn list_folders_by_name(
        &self,
        _phone: &str,
        name: &str,
        matching: NameMatch,
    ) -> Result<Vec<DriveFolder>> {
        self.check()?;
        let lowered = name.to_lowercase();
        Ok(self
            .folders
            .lock()
            .unwrap()
            .iter()
            .filter(|f| match matching {
                NameMatch::Exact => f.name == name,
                NameMatch::Contains => f.name.to_lowercase().contains(&lowered),
            })
            .cloned()
            .collect())
    }

    async fn create_folder(&self, _phone: &str, name: &str) -> Result<DriveFolder> {
        self.check()?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let folder = DriveFolder {
            id: format!("folder-{n}"),
            name: name.to_string(),
        };
        self.folders.lock().unwrap().push(folder.clone());
        Ok(folder)
    }

    async fn upload_file(
        &self,
        _phone: &str,
        folder_id: &str,
        body: MediaStream,
        file_name: &str,
        mime_type: &str,
    ) -> Result<UploadedFile> {
        self.check()?;
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(Error::Drive("upload rejected".to_string()));
        }
        let bytes: Vec<u8> = body.try_concat().await?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = format!("file-{n}");
        self.files.lock().unwrap().push(StoredFile {
            id: id.clone(),
            folder_id: folder_id.to_string(),
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            bytes,
        });
        Ok(UploadedFile {
            view_link: format!("https://drive.google.com/file/d/{id}/view"),
            id,
        })
    }
}

/// Media source that serves the same bytes for every id
pub struct StaticMedia {
    pub bytes: Vec<u8>,
    pub fail: AtomicBool,
}

impl Default for StaticMedia {
    fn default() -> Self {
        Self {
            bytes: b"%PDF-1.4 test".to_vec(),
            fail: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MediaSource for StaticMedia {
    async fn fetch_media(&self, media_id: &str) -> Result<MediaStream> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Media(format!("media {media_id} expired")));
        }
        let (head, tail) = self.bytes.split_at(self.bytes.len() / 2);
        Ok(stream::iter(vec![Ok(head.to_vec()), Ok(tail.to_vec())]).boxed())
    }
}

/// An engine wired to in-memory collaborators
pub struct Harness {
    pub db: DbPool,
    pub engine: Arc<ConversationEngine>,
    pub messenger: Arc<RecordingMessenger>,
    pub drive: Arc<MemoryDrive>,
    pub media: Arc<StaticMedia>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_drive(MemoryDrive::default())
    }

    pub fn with_drive(drive: MemoryDrive) -> Self {
        let db = setup_test_db();
        let messenger = Arc::new(RecordingMessenger::default());
        let drive = Arc::new(drive);
        let media = Arc::new(StaticMedia::default());
        let engine = Arc::new(ConversationEngine::new(
            db.clone(),
            messenger.clone(),
            media.clone(),
            drive.clone(),
            SessionStore::default(),
        ));
        Self {
            db,
            engine,
            messenger,
            drive,
            media,
        }
    }

    pub fn users(&self) -> UserRepo {
        UserRepo::new(self.db.clone())
    }

    pub fn documents(&self) -> DocumentRepo {
        DocumentRepo::new(self.db.clone())
    }

    pub async fn send(&self, event: InboundEvent) {
        self.engine
            .handle(InboundMessage {
                from: PHONE.to_string(),
                id: None,
                event,
            })
            .await;
    }

    pub async fn text(&self, body: &str) {
        self.send(InboundEvent::Text(body.to_string())).await;
    }

    pub async fn document(&self, media_id: &str, file_name: &str) {
        self.send(InboundEvent::Media(IncomingMedia {
            media_id: media_id.to_string(),
            kind: MediaKind::Document,
            file_name: file_name.to_string(),
            mime_type: "application/pdf".to_string(),
        }))
        .await;
    }

    pub async fn image(&self, media_id: &str) {
        self.send(InboundEvent::Media(IncomingMedia {
            media_id: media_id.to_string(),
            kind: MediaKind::Image,
            file_name: format!("{media_id}.jpg"),
            mime_type: "image/jpeg".to_string(),
        }))
        .await;
    }

    pub async fn button(&self, id: &str) {
        self.send(InboundEvent::ButtonReply(ReplyId::parse(id))).await;
    }

    pub async fn list_pick(&self, id: &str) {
        self.send(InboundEvent::ListReply(ReplyId::parse(id))).await;
    }
}
