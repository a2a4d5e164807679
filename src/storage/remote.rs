//! Remote (PostgREST) Message Storage
//!
//! Write path is full-fidelity. Reads are not served by this backend and are
//! reported as unsupported; another collaborator queries the store directly.

use super::writer::{MessageWriter, WriteOutcome};
use super::MessageStore;
use crate::actors::messages::Freshness;
use crate::actors::resolver_actor::{ResolverHandle, CONVERSATIONS};
use crate::config::{RemoteConfig, RemoteCredentials};
use crate::core::error::{StoreError, StoreResult};
use crate::core::models::{ChatSummary, IncomingMessage, MediaInfo, StoredMessage};
use crate::core::rest::{Endpoint, RestClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

const BACKEND: &str = "remote";

pub struct RemoteStore {
    client: RestClient,
    channel: String,
    resolver: ResolverHandle,
    writer: MessageWriter,
}

impl RemoteStore {
    /// Must be called from within a tokio runtime; spawns the resolver actor
    pub fn new(credentials: &RemoteCredentials, config: &RemoteConfig) -> StoreResult<Self> {
        let client = RestClient::new(credentials, config.timeout())?;
        let resolver = ResolverHandle::new(
            client.clone(),
            config.channel.clone(),
            config.channel_buffer_size,
        );
        let writer = MessageWriter::new(client.clone(), config.channel.clone());

        Ok(Self {
            client,
            channel: config.channel.clone(),
            resolver,
            writer,
        })
    }

    pub fn from_env(config: &RemoteConfig) -> StoreResult<Self> {
        Self::new(&RemoteCredentials::from_env()?, config)
    }

    pub fn resolver(&self) -> &ResolverHandle {
        &self.resolver
    }

    async fn update_name(&self, jid: &str, name: &str) -> StoreResult<()> {
        let endpoint = Endpoint::new(CONVERSATIONS)
            .eq("channel", &self.channel)
            .eq("contact_identifier", jid);
        self.client
            .update(&endpoint, &json!({ "contact_name": name }))
            .await
    }

    fn unsupported(operation: &'static str) -> StoreError {
        StoreError::Unsupported {
            backend: BACKEND,
            operation,
        }
    }
}

#[async_trait]
impl MessageStore for RemoteStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn supports_reads(&self) -> bool {
        false
    }

    async fn store_chat(
        &self,
        jid: &str,
        name: &str,
        last_message_time: DateTime<Utc>,
    ) -> StoreResult<()> {
        let display_name = Some(name).filter(|n| !n.is_empty());
        let conversation_id = self
            .resolver
            .resolve(jid, display_name, Freshness::Fresh)
            .await?;

        if let Some(name) = display_name {
            if let Err(e) = self.update_name(jid, name).await {
                tracing::warn!("Failed to update contact name for {}: {}", jid, e);
            }
        }

        self.writer
            .touch_conversation(&conversation_id, last_message_time)
            .await
    }

    async fn store_message(&self, message: &IncomingMessage) -> StoreResult<WriteOutcome> {
        if message.is_empty() {
            tracing::debug!("Skipping empty message {} in {}", message.id, message.chat_jid);
            return Ok(WriteOutcome::Skipped);
        }

        let conversation_id = self
            .resolver
            .resolve(&message.chat_jid, None, Freshness::Cached)
            .await?;

        self.writer.write(&conversation_id, message).await
    }

    async fn get_messages(&self, _chat_jid: &str, _limit: usize) -> StoreResult<Vec<StoredMessage>> {
        Err(Self::unsupported("get_messages"))
    }

    async fn get_chats(&self) -> StoreResult<Vec<ChatSummary>> {
        Err(Self::unsupported("get_chats"))
    }

    async fn get_media_info(&self, _id: &str, _chat_jid: &str) -> StoreResult<MediaInfo> {
        Err(StoreError::MediaUnavailable(BACKEND))
    }

    async fn close(&self) -> StoreResult<()> {
        tracing::debug!("[RemoteStore] close: nothing to release");
        Ok(())
    }
}
