//! Inbound events and interactive reply identifiers

use std::fmt;

use chrono::Utc;

use crate::channels::{WhatsAppInteractive, WhatsAppMessage};
use crate::session::MediaKind;

const FOLDER_SAVED_PREFIX: &str = "folder_saved_";
const DOCUMENT_META_PREFIX: &str = "document_meta_";
const NAV_NEXT_PREFIX: &str = "doc_nav_next_";
const NAV_BACK_PREFIX: &str = "doc_nav_back_";

/// Identifier of a tapped button or list row, decoded from its wire form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyId {
    FolderDefault,
    FolderExisting,
    FolderNew,
    /// `folder_saved_<id>`
    SavedFolder(String),
    /// `document_meta_<id>`
    DocumentMeta(String),
    /// `doc_nav_next_<page>`; `None` when the page index is not a number
    NextPage(Option<usize>),
    /// `doc_nav_back_<page>`
    PreviousPage(Option<usize>),
    UploadDocument,
    GetDocuments,
    ExploreFolders,
    Unknown(String),
}

impl ReplyId {
    /// Decode a wire identifier
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "folder_default" => return Self::FolderDefault,
            "folder_existing" => return Self::FolderExisting,
            "folder_new" => return Self::FolderNew,
            "upload_document" => return Self::UploadDocument,
            "get_documents" => return Self::GetDocuments,
            "explore_folders" => return Self::ExploreFolders,
            _ => {}
        }

        if let Some(id) = raw.strip_prefix(FOLDER_SAVED_PREFIX) {
            Self::SavedFolder(decode_component(id))
        } else if let Some(id) = raw.strip_prefix(DOCUMENT_META_PREFIX) {
            Self::DocumentMeta(decode_component(id))
        } else if let Some(page) = raw.strip_prefix(NAV_NEXT_PREFIX) {
            Self::NextPage(page.parse().ok())
        } else if let Some(page) = raw.strip_prefix(NAV_BACK_PREFIX) {
            Self::PreviousPage(page.parse().ok())
        } else {
            Self::Unknown(raw.to_string())
        }
    }

    /// Whether this is one of the three folder-choice buttons
    #[must_use]
    pub const fn is_folder_choice(&self) -> bool {
        matches!(self, Self::FolderDefault | Self::FolderExisting | Self::FolderNew)
    }
}

impl fmt::Display for ReplyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FolderDefault => f.write_str("folder_default"),
            Self::FolderExisting => f.write_str("folder_existing"),
            Self::FolderNew => f.write_str("folder_new"),
            Self::SavedFolder(id) => write!(f, "{FOLDER_SAVED_PREFIX}{}", urlencoding::encode(id)),
            Self::DocumentMeta(id) => {
                write!(f, "{DOCUMENT_META_PREFIX}{}", urlencoding::encode(id))
            }
            Self::NextPage(page) => write!(f, "{NAV_NEXT_PREFIX}{}", page_part(*page)),
            Self::PreviousPage(page) => write!(f, "{NAV_BACK_PREFIX}{}", page_part(*page)),
            Self::UploadDocument => f.write_str("upload_document"),
            Self::GetDocuments => f.write_str("get_documents"),
            Self::ExploreFolders => f.write_str("explore_folders"),
            Self::Unknown(raw) => f.write_str(raw),
        }
    }
}

fn page_part(page: Option<usize>) -> String {
    page.map(|p| p.to_string()).unwrap_or_default()
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |s| s.into_owned())
}

/// Media attached to an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMedia {
    pub media_id: String,
    pub kind: MediaKind,
    pub file_name: String,
    pub mime_type: String,
}

/// What the user did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// Free text, trimmed
    Text(String),
    Media(IncomingMedia),
    ButtonReply(ReplyId),
    ListReply(ReplyId),
    /// Any other message type; acknowledged without effect
    Unsupported(String),
}

/// One inbound webhook message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender phone number
    pub from: String,
    /// Provider message id, used for deduplication
    pub id: Option<String>,
    pub event: InboundEvent,
}

impl InboundMessage {
    /// Classify a `WhatsApp` webhook message
    #[must_use]
    pub fn from_whatsapp(msg: &WhatsAppMessage) -> Self {
        let event = match msg.message_type.as_str() {
            "text" => InboundEvent::Text(
                msg.text
                    .as_ref()
                    .map(|t| t.body.trim().to_string())
                    .unwrap_or_default(),
            ),
            "image" => msg.image.as_ref().map_or_else(
                || InboundEvent::Unsupported("image".to_string()),
                |media| {
                    InboundEvent::Media(IncomingMedia {
                        media_id: media.id.clone(),
                        kind: MediaKind::Image,
                        file_name: media
                            .filename
                            .clone()
                            .unwrap_or_else(|| format!("image_{}.jpg", Utc::now().timestamp_millis())),
                        mime_type: media
                            .mime_type
                            .clone()
                            .unwrap_or_else(|| "image/jpeg".to_string()),
                    })
                },
            ),
            "document" => msg.document.as_ref().map_or_else(
                || InboundEvent::Unsupported("document".to_string()),
                |media| {
                    InboundEvent::Media(IncomingMedia {
                        media_id: media.id.clone(),
                        kind: MediaKind::Document,
                        file_name: media
                            .filename
                            .clone()
                            .unwrap_or_else(|| format!("document_{}", Utc::now().timestamp_millis())),
                        mime_type: media
                            .mime_type
                            .clone()
                            .unwrap_or_else(|| "application/octet-stream".to_string()),
                    })
                },
            ),
            "interactive" => msg
                .interactive
                .as_ref()
                .map_or_else(|| InboundEvent::Unsupported("interactive".to_string()), interactive_event),
            other => InboundEvent::Unsupported(other.to_string()),
        };

        Self {
            from: msg.from.clone(),
            id: msg.id.clone(),
            event,
        }
    }
}

fn interactive_event(interactive: &WhatsAppInteractive) -> InboundEvent {
    match interactive.kind.as_str() {
        "button_reply" => interactive.button_reply.as_ref().map_or_else(
            || InboundEvent::Unsupported("button_reply".to_string()),
            |reply| InboundEvent::ButtonReply(ReplyId::parse(&reply.id)),
        ),
        "list_reply" => interactive.list_reply.as_ref().map_or_else(
            || InboundEvent::Unsupported("list_reply".to_string()),
            |reply| InboundEvent::ListReply(ReplyId::parse(&reply.id)),
        ),
        other => InboundEvent::Unsupported(format!("interactive:{other}")),
    }
}
