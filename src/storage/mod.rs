//! Message Storage Abstraction
//!
//! Information Hiding:
//! - Backend details hidden behind the `MessageStore` trait
//! - The ingestion pipeline is written once and the backend is picked at startup
//! - A backend that cannot answer an operation says so with `StoreError::Unsupported`
//!   instead of returning an empty success

use crate::config::{BackendKind, RemoteCredentials, Settings};
use crate::core::error::StoreResult;
use crate::core::models::{ChatSummary, IncomingMessage, MediaInfo, StoredMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod local;
pub mod remote;
pub mod writer;

pub use local::SqliteStore;
pub use remote::RemoteStore;
pub use writer::{MessageWriter, WriteOutcome};

/// Capability set every storage backend exposes
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Short backend name used in logs and errors
    fn backend(&self) -> &'static str;

    /// Whether `get_messages`, `get_chats` and `get_media_info` can be answered
    fn supports_reads(&self) -> bool;

    /// Create or refresh a chat with its display name and last activity time
    async fn store_chat(
        &self,
        jid: &str,
        name: &str,
        last_message_time: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Persist one message; empty messages are skipped
    async fn store_message(&self, message: &IncomingMessage) -> StoreResult<WriteOutcome>;

    /// Most recent messages of a chat, newest first
    async fn get_messages(&self, chat_jid: &str, limit: usize) -> StoreResult<Vec<StoredMessage>>;

    async fn get_chats(&self) -> StoreResult<Vec<ChatSummary>>;

    async fn get_media_info(&self, id: &str, chat_jid: &str) -> StoreResult<MediaInfo>;

    async fn close(&self) -> StoreResult<()>;
}

/// Build the backend named in the settings
pub async fn open_store(settings: &Settings) -> StoreResult<Arc<dyn MessageStore>> {
    match settings.store.backend {
        BackendKind::Remote => {
            let credentials = RemoteCredentials::from_env()?;
            let store = RemoteStore::new(&credentials, &settings.remote)?;
            tracing::info!("Using remote store at {}", credentials.url);
            Ok(Arc::new(store))
        }
        BackendKind::Local => {
            let store = SqliteStore::open(&settings.local.path)?;
            tracing::info!("Using local store at {:?}", settings.local.path);
            Ok(Arc::new(store))
        }
    }
}
