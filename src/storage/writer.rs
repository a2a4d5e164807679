//! Message Writer
//!
//! Persisting the message row is the primary effect and its failure is returned.
//! Refreshing the conversation's `last_message_at` afterwards is best-effort:
//! a failure there is logged at warn and otherwise dropped.

use crate::actors::resolver_actor::CONVERSATIONS;
use crate::core::error::StoreResult;
use crate::core::models::{IdRow, IncomingMessage, MessageRecord};
use crate::core::rest::{Endpoint, RestClient};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

pub const MESSAGES: &str = "messages";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// No text and no media; nothing was sent
    Skipped,
    /// Row created; `id` is the generated id when the store echoed it back
    Stored { id: Option<String> },
}

#[derive(Clone)]
pub struct MessageWriter {
    client: RestClient,
    channel: String,
}

impl MessageWriter {
    pub fn new(client: RestClient, channel: String) -> Self {
        Self { client, channel }
    }

    pub async fn write(
        &self,
        conversation_id: &str,
        message: &IncomingMessage,
    ) -> StoreResult<WriteOutcome> {
        if message.is_empty() {
            tracing::debug!("Skipping empty message {} in {}", message.id, message.chat_jid);
            return Ok(WriteOutcome::Skipped);
        }

        let record = MessageRecord::from_incoming(conversation_id, &self.channel, message);
        let rows: Vec<IdRow> = self.client.insert(MESSAGES, &record).await?;
        let id = rows.into_iter().next().map(|row| row.id);

        tracing::debug!(
            "Stored {} message {:?} in conversation {}",
            record.direction.as_str(),
            id,
            conversation_id
        );

        if let Err(e) = self.touch_conversation(conversation_id, message.timestamp).await {
            tracing::warn!(
                "Failed to refresh last_message_at for conversation {}: {}",
                conversation_id,
                e
            );
        }

        Ok(WriteOutcome::Stored { id })
    }

    /// Set `last_message_at` on one conversation
    pub async fn touch_conversation(
        &self,
        conversation_id: &str,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<()> {
        let endpoint = Endpoint::new(CONVERSATIONS).eq("id", conversation_id);
        let patch = json!({
            "last_message_at": timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        });
        self.client.update(&endpoint, &patch).await
    }
}
