//! `WhatsApp` channel adapter
//!
//! Uses the `WhatsApp` Cloud API (Graph API) for sending messages and
//! downloading media. Inbound messages arrive through the webhook endpoint.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{Button, ListPrompt, MediaSource, MediaStream, Messenger};
use crate::{Error, Result};

const GRAPH_BASE: &str = "https://graph.facebook.com";

/// Interactive button titles are limited to 20 characters
const MAX_BUTTON_TITLE: usize = 20;

/// List row titles are limited to 24 characters
const MAX_ROW_TITLE: usize = 24;

/// List header text is limited to 60 characters
const MAX_HEADER: usize = 60;

/// `WhatsApp` channel adapter
pub struct WhatsAppChannel {
    /// `WhatsApp` Business API access token
    access_token: SecretString,
    /// Phone number ID for sending messages
    phone_number_id: String,
    /// Graph API version, e.g. "v22.0"
    api_version: String,
    client: Client,
}

impl WhatsAppChannel {
    /// Create a new `WhatsApp` channel adapter
    ///
    /// # Arguments
    ///
    /// * `access_token` - `WhatsApp` Business API access token
    /// * `phone_number_id` - Phone number ID registered with `WhatsApp` Business
    /// * `api_version` - Graph API version
    #[must_use]
    pub fn new(access_token: SecretString, phone_number_id: String, api_version: String) -> Self {
        Self {
            access_token,
            phone_number_id,
            api_version,
            client: Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{GRAPH_BASE}/{}/{}/messages",
            self.api_version, self.phone_number_id
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token.expose_secret())
    }

    async fn post_message(&self, payload: Value) -> Result<()> {
        let response = self
            .client
            .post(self.messages_url())
            .header("Authorization", self.bearer())
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("WhatsApp API error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "WhatsApp API error: {status} - {body}"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Messenger for WhatsAppChannel {
    async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        self.post_message(text_payload(to, body)).await?;
        tracing::debug!(to, "WhatsApp text sent");
        Ok(())
    }

    async fn send_buttons(&self, to: &str, body: &str, buttons: &[Button]) -> Result<()> {
        if buttons.is_empty() || buttons.len() > 3 {
            return Err(Error::Channel(format!(
                "WhatsApp button messages need 1-3 buttons, got {}",
                buttons.len()
            )));
        }
        self.post_message(buttons_payload(to, body, buttons)).await?;
        tracing::debug!(to, count = buttons.len(), "WhatsApp buttons sent");
        Ok(())
    }

    async fn send_list(&self, to: &str, list: &ListPrompt) -> Result<()> {
        if list.sections.iter().all(|s| s.rows.is_empty()) {
            return Err(Error::Channel("WhatsApp list message has no rows".to_string()));
        }
        self.post_message(list_payload(to, list)).await?;
        tracing::debug!(to, sections = list.sections.len(), "WhatsApp list sent");
        Ok(())
    }
}

#[async_trait]
impl MediaSource for WhatsAppChannel {
    async fn fetch_media(&self, media_id: &str) -> Result<MediaStream> {
        // Media ids resolve to a short-lived download URL first
        let meta_url = format!("{GRAPH_BASE}/{}/{media_id}?fields=url", self.api_version);
        let meta: MediaUrlResponse = self
            .client
            .get(&meta_url)
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(|e| Error::Media(format!("media lookup failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Media(format!("media lookup failed: {e}")))?
            .json()
            .await?;

        let Some(url) = meta.url else {
            return Err(Error::Media(format!("no media URL returned for {media_id}")));
        };

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(|e| Error::Media(format!("media download failed: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Media(format!("media download failed: {e}")))?;

        tracing::debug!(media_id, "streaming WhatsApp media");

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(Error::from));
        Ok(stream.boxed())
    }
}

#[derive(Debug, Deserialize)]
struct MediaUrlResponse {
    url: Option<String>,
}

/// Truncate to at most `max` characters
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn text_payload(to: &str, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "text",
        "text": { "body": body }
    })
}

fn buttons_payload(to: &str, body: &str, buttons: &[Button]) -> Value {
    let buttons: Vec<Value> = buttons
        .iter()
        .map(|b| {
            json!({
                "type": "reply",
                "reply": { "id": b.id, "title": truncate_chars(&b.title, MAX_BUTTON_TITLE) }
            })
        })
        .collect();

    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "interactive",
        "interactive": {
            "type": "button",
            "body": { "text": body },
            "action": { "buttons": buttons }
        }
    })
}

fn list_payload(to: &str, list: &ListPrompt) -> Value {
    let sections: Vec<Value> = list
        .sections
        .iter()
        .map(|s| {
            let rows: Vec<Value> = s
                .rows
                .iter()
                .map(|r| json!({ "id": r.id, "title": truncate_chars(&r.title, MAX_ROW_TITLE) }))
                .collect();
            json!({ "title": truncate_chars(&s.title, MAX_ROW_TITLE), "rows": rows })
        })
        .collect();

    let mut interactive = json!({
        "type": "list",
        "body": { "text": list.body },
        "action": { "button": truncate_chars(&list.button, MAX_BUTTON_TITLE), "sections": sections }
    });

    if let Some(header) = &list.header {
        interactive["header"] = json!({ "type": "text", "text": truncate_chars(header, MAX_HEADER) });
    }

    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "interactive",
        "interactive": interactive
    })
}

/// `WhatsApp` webhook payload from Cloud API
///
/// Only `entry[0].changes[0].value` is read, so the rest of the body is kept
/// as raw JSON and never has to match a typed shape.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct WhatsAppWebhook(Value);

impl WhatsAppWebhook {
    /// The `entry[0].changes[0].value` object, if present
    #[must_use]
    pub fn first_value(&self) -> Option<WhatsAppWebhookValue<'_>> {
        self.0
            .pointer("/entry/0/changes/0/value")
            .map(WhatsAppWebhookValue)
    }
}

/// `WhatsApp` webhook value containing messages or delivery statuses
#[derive(Debug, Clone, Copy)]
pub struct WhatsAppWebhookValue<'a>(&'a Value);

impl WhatsAppWebhookValue<'_> {
    /// Whether this value carries delivery receipts
    #[must_use]
    pub fn is_status_update(&self) -> bool {
        self.0.get("statuses").is_some_and(|s| !s.is_null())
    }

    /// Decode `messages[0]`, if there is one
    #[must_use]
    pub fn first_message(&self) -> Option<serde_json::Result<WhatsAppMessage>> {
        self.0.pointer("/messages/0").map(WhatsAppMessage::deserialize)
    }
}

/// `WhatsApp` message
#[derive(Debug, Deserialize)]
pub struct WhatsAppMessage {
    /// Sender phone number
    pub from: String,
    /// Message ID
    pub id: Option<String>,
    /// Message timestamp
    pub timestamp: Option<String>,
    /// Message type
    #[serde(rename = "type")]
    pub message_type: String,
    /// Text content (for text messages)
    pub text: Option<WhatsAppTextContent>,
    /// Image content
    pub image: Option<WhatsAppMedia>,
    /// Document content
    pub document: Option<WhatsAppMedia>,
    /// Button or list reply
    pub interactive: Option<WhatsAppInteractive>,
}

/// `WhatsApp` media object (image, document)
#[derive(Debug, Deserialize)]
pub struct WhatsAppMedia {
    /// Media ID (use to fetch URL)
    pub id: String,
    /// MIME type
    pub mime_type: Option<String>,
    /// Filename (documents)
    pub filename: Option<String>,
    /// Caption
    pub caption: Option<String>,
}

/// `WhatsApp` text message content
#[derive(Debug, Deserialize)]
pub struct WhatsAppTextContent {
    /// Message body
    pub body: String,
}

/// Interactive reply (`button_reply` or `list_reply`)
#[derive(Debug, Deserialize)]
pub struct WhatsAppInteractive {
    #[serde(rename = "type")]
    pub kind: String,
    pub button_reply: Option<WhatsAppReply>,
    pub list_reply: Option<WhatsAppReply>,
}

/// The option the user tapped
#[derive(Debug, Deserialize)]
pub struct WhatsAppReply {
    pub id: String,
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ListRow, ListSection};

    #[test]
    fn parses_text_message() {
        let payload: WhatsAppWebhook = serde_json::from_value(json!({
            "entry": [{ "changes": [{ "value": { "messages": [{
                "from": "15550001111",
                "id": "wamid.1",
                "timestamp": "1700000000",
                "type": "text",
                "text": { "body": "hello" }
            }]}}]}]
        }))
        .unwrap();

        let msg = payload.first_value().unwrap().first_message().unwrap().unwrap();
        assert_eq!(msg.from, "15550001111");
        assert_eq!(msg.id.as_deref(), Some("wamid.1"));
        assert_eq!(msg.message_type, "text");
        assert_eq!(msg.text.as_ref().unwrap().body, "hello");
    }

    #[test]
    fn parses_list_reply_and_statuses() {
        let payload: WhatsAppWebhook = serde_json::from_value(json!({
            "entry": [{ "changes": [{ "value": { "messages": [{
                "from": "1",
                "id": "wamid.2",
                "type": "interactive",
                "interactive": { "type": "list_reply", "list_reply": { "id": "doc_nav_next_1", "title": "Next" } }
            }]}}]}]
        }))
        .unwrap();
        let msg = payload.first_value().unwrap().first_message().unwrap().unwrap();
        let interactive = msg.interactive.as_ref().unwrap();
        assert_eq!(interactive.kind, "list_reply");
        assert_eq!(interactive.list_reply.as_ref().unwrap().id, "doc_nav_next_1");

        let receipts: WhatsAppWebhook = serde_json::from_value(json!({
            "entry": [{ "changes": [{ "value": { "statuses": [{ "status": "delivered" }] } }] }]
        }))
        .unwrap();
        let value = receipts.first_value().unwrap();
        assert!(value.is_status_update());
        assert!(value.first_message().is_none());
    }

    #[test]
    fn missing_entry_has_no_value() {
        let payload: WhatsAppWebhook = serde_json::from_value(json!({ "object": "x" })).unwrap();
        assert!(payload.first_value().is_none());

        let empty: WhatsAppWebhook = serde_json::from_value(json!({
            "entry": [{ "changes": [{ "value": { "messages": [] } }] }]
        }))
        .unwrap();
        assert!(empty.first_value().unwrap().first_message().is_none());
    }

    #[test]
    fn malformed_message_is_reported_without_failing_the_envelope() {
        let payload: WhatsAppWebhook = serde_json::from_value(json!({
            "entry": [
                { "changes": [{ "value": { "messages": [{ "from": "1", "id": "wamid.3" }] } }] },
                { "changes": "not a list" }
            ]
        }))
        .unwrap();
        assert!(payload.first_value().unwrap().first_message().unwrap().is_err());
    }

    #[test]
    fn button_payload_truncates_titles() {
        let payload = buttons_payload(
            "1",
            "pick",
            &[Button::new("folder_existing", "My Existing Folder With A Long Name")],
        );
        let title = payload["interactive"]["action"]["buttons"][0]["reply"]["title"]
            .as_str()
            .unwrap();
        assert_eq!(title.chars().count(), MAX_BUTTON_TITLE);
        assert_eq!(payload["interactive"]["type"], "button");
    }

    #[test]
    fn list_payload_has_optional_header() {
        let list = ListPrompt {
            header: Some("Taxes".to_string()),
            body: "Select".to_string(),
            button: "View documents".to_string(),
            sections: vec![ListSection {
                title: "Page 1/1".to_string(),
                rows: vec![ListRow::new("document_meta_1", "Invoice")],
            }],
        };
        let payload = list_payload("1", &list);
        assert_eq!(payload["interactive"]["header"]["text"], "Taxes");
        assert_eq!(
            payload["interactive"]["action"]["sections"][0]["rows"][0]["id"],
            "document_meta_1"
        );

        let no_header = ListPrompt { header: None, ..list };
        assert!(list_payload("1", &no_header)["interactive"].get("header").is_none());
    }
}
