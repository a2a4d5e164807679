//! Records exchanged with the remote store and the shapes callers hand to a backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

pub const STATUS_ACTIVE: &str = "active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn from_is_from_me(is_from_me: bool) -> Self {
        if is_from_me {
            Direction::Outbound
        } else {
            Direction::Inbound
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Row of the `conversations` resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub channel: String,
    pub contact_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<i64>,
}

impl ConversationRecord {
    /// New active conversation, ready to be inserted
    pub fn new(channel: &str, contact_identifier: &str, contact_name: Option<&str>) -> Self {
        Self {
            id: None,
            channel: channel.to_string(),
            contact_identifier: contact_identifier.to_string(),
            contact_name: contact_name
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            last_message_at: None,
            status: STATUS_ACTIVE.to_string(),
            unread_count: None,
        }
    }
}

/// Row of the `messages` resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub conversation_id: String,
    pub channel: String,
    pub direction: Direction,
    pub sender: String,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl MessageRecord {
    /// Normalize an incoming message into its relational shape.
    ///
    /// Empty strings never reach the store: body, external_id and the
    /// media_type metadata are only set when the source value is non-empty.
    pub fn from_incoming(conversation_id: &str, channel: &str, message: &IncomingMessage) -> Self {
        Self {
            id: None,
            conversation_id: conversation_id.to_string(),
            channel: channel.to_string(),
            direction: Direction::from_is_from_me(message.is_from_me),
            sender: message.sender.clone(),
            recipient: message.recipient().to_string(),
            body: non_empty(&message.content),
            external_id: non_empty(&message.id),
            metadata: message
                .media_type()
                .map(|media_type| json!({ "media_type": media_type })),
            is_read: false,
            status: None,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Minimal projection used when only the generated id matters
#[derive(Debug, Clone, Deserialize)]
pub struct IdRow {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
}

/// Generated ids may be uuids or bigints depending on the table definition
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Media attributes carried by the messaging client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaInfo {
    pub media_type: String,
    pub filename: String,
    pub url: String,
    pub media_key: Vec<u8>,
    pub file_sha256: Vec<u8>,
    pub file_enc_sha256: Vec<u8>,
    pub file_length: u64,
}

/// A message event as emitted by the messaging client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Native message id of the messaging client
    #[serde(default)]
    pub id: String,
    pub chat_jid: String,
    pub sender: String,
    /// Other party; defaults to the chat identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInfo>,
}

impl IncomingMessage {
    pub fn text(
        id: impl Into<String>,
        chat_jid: impl Into<String>,
        sender: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        is_from_me: bool,
    ) -> Self {
        Self {
            id: id.into(),
            chat_jid: chat_jid.into(),
            sender: sender.into(),
            recipient: None,
            content: content.into(),
            timestamp,
            is_from_me,
            media: None,
        }
    }

    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    pub fn with_media(mut self, media: MediaInfo) -> Self {
        self.media = Some(media);
        self
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media
            .as_ref()
            .map(|m| m.media_type.as_str())
            .filter(|t| !t.is_empty())
    }

    pub fn recipient(&self) -> &str {
        self.recipient.as_deref().unwrap_or(&self.chat_jid)
    }

    /// Nothing to persist: no text and no media
    pub fn is_empty(&self) -> bool {
        self.content.is_empty() && self.media_type().is_none()
    }
}

/// Message as read back from a backend that supports reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub chat_jid: String,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_from_me: bool,
    pub media_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub jid: String,
    pub name: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
}
