//! Simple async API facade
//!
//! Free functions over the process-wide store, for callers that do not want
//! to carry a `MessageStore` handle around.

use crate::core::models::IncomingMessage;
use crate::storage::WriteOutcome;
use crate::System;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

/// Create or refresh a chat
///
/// # Example
/// ```no_run
/// use chatrelay::{init, store_chat};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     init().await?;
///     store_chat("123@s.whatsapp.net", "Alice", chrono::Utc::now()).await?;
///     Ok(())
/// }
/// ```
pub async fn store_chat(
    jid: &str,
    name: &str,
    last_message_time: DateTime<Utc>,
) -> Result<()> {
    let system = System::global()?;
    system
        .store
        .store_chat(jid, name, last_message_time)
        .await
        .with_context(|| format!("Failed to store chat {}", jid))
}

/// Persist a message; an empty one comes back as `WriteOutcome::Skipped`
pub async fn store_message(message: &IncomingMessage) -> Result<WriteOutcome> {
    let system = System::global()?;
    system
        .store
        .store_message(message)
        .await
        .with_context(|| format!("Failed to store message {} in {}", message.id, message.chat_jid))
}
