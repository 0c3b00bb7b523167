//! Free-text document description parsing

use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde_json::Value;

use crate::db::Metadata;

/// `key: value` on its own line; keys start with a letter
static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^([a-zA-Z][A-Za-z0-9_-]*)\s*:\s*(.+)$").expect("valid regex")
});

/// Parse a user's description of a document into tags
///
/// Every `key: value` line becomes a lower-cased key. Text without any such
/// line is kept whole as `description`. `rawText` and `timestamp` are always
/// set first, so a parsed `timestamp` key replaces the capture time.
#[must_use]
pub fn parse_metadata(text: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("rawText".to_string(), Value::String(text.to_string()));
    metadata.insert(
        "timestamp".to_string(),
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
    );

    let mut structured = false;
    for caps in KEY_VALUE.captures_iter(text) {
        let key = caps[1].trim().to_lowercase();
        let value = caps[2].trim().to_string();
        metadata.insert(key, Value::String(value));
        structured = true;
    }

    if !structured {
        metadata.insert(
            "description".to_string(),
            Value::String(text.trim().to_string()),
        );
    }

    metadata
}
