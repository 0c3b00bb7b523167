//! Messaging channel adapters
//!
//! The conversation engine talks to the messaging provider through two
//! capabilities: `Messenger` for outbound replies and `MediaSource` for
//! downloading media the user sent.

mod whatsapp;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use whatsapp::{
    WhatsAppChannel, WhatsAppInteractive, WhatsAppMessage, WhatsAppWebhook, WhatsAppWebhookValue,
};

use crate::Result;

/// Streamed media body, chunk by chunk
pub type MediaStream = BoxStream<'static, Result<Vec<u8>>>;

/// A quick-reply button (WhatsApp allows at most three per message)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub id: String,
    pub title: String,
}

impl Button {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// A selectable row in a list message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRow {
    pub id: String,
    pub title: String,
}

impl ListRow {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// A titled group of list rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// An interactive list message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPrompt {
    /// Optional text header
    pub header: Option<String>,
    pub body: String,
    /// Label of the button that opens the list
    pub button: String,
    pub sections: Vec<ListSection>,
}

/// Outbound messaging capability
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a plain text message
    async fn send_text(&self, to: &str, body: &str) -> Result<()>;

    /// Send a message with up to three reply buttons
    async fn send_buttons(&self, to: &str, body: &str, buttons: &[Button]) -> Result<()>;

    /// Send an interactive list message
    async fn send_list(&self, to: &str, list: &ListPrompt) -> Result<()>;
}

/// Media download capability of the messaging provider
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Open a byte stream for a media id received in a webhook
    async fn fetch_media(&self, media_id: &str) -> Result<MediaStream>;
}
