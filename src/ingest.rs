//! Event ingestion pipeline
//!
//! Decodes chat events and hands them to whichever `MessageStore` was selected
//! at startup. A failing event is logged and counted; the stream keeps going.

use crate::core::error::StoreResult;
use crate::core::models::IncomingMessage;
use crate::storage::{MessageStore, WriteOutcome};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// One structured event emitted by the messaging client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Chat {
        jid: String,
        #[serde(default)]
        name: String,
        last_message_time: DateTime<Utc>,
    },
    Message(IncomingMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Chat,
    Message(WriteOutcome),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub chats: usize,
    pub messages: usize,
    pub skipped: usize,
    pub failed: usize,
    pub malformed: usize,
}

impl IngestReport {
    pub fn total(&self) -> usize {
        self.chats + self.messages + self.skipped + self.failed + self.malformed
    }

    fn record(&mut self, applied: &Applied) {
        match applied {
            Applied::Chat => self.chats += 1,
            Applied::Message(WriteOutcome::Stored { .. }) => self.messages += 1,
            Applied::Message(WriteOutcome::Skipped) => self.skipped += 1,
        }
    }
}

pub struct Ingestor {
    store: Arc<dyn MessageStore>,
}

impl Ingestor {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, event: &ChatEvent) -> StoreResult<Applied> {
        match event {
            ChatEvent::Chat {
                jid,
                name,
                last_message_time,
            } => {
                self.store.store_chat(jid, name, *last_message_time).await?;
                Ok(Applied::Chat)
            }
            ChatEvent::Message(message) => {
                let outcome = self.store.store_message(message).await?;
                Ok(Applied::Message(outcome))
            }
        }
    }

    /// Consume JSON-lines events until EOF
    pub async fn ingest_lines<R>(&self, reader: R) -> Result<IngestReport>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut report = IngestReport::default();
        let mut lines = reader.lines();
        let mut line_no = 0usize;

        while let Some(line) = lines.next_line().await.context("Failed to read event line")? {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let event: ChatEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!("Line {}: malformed event: {}", line_no, e);
                    report.malformed += 1;
                    continue;
                }
            };

            match self.handle(&event).await {
                Ok(applied) => report.record(&applied),
                Err(e) => {
                    tracing::error!("Line {}: failed to store event: {}", line_no, e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "[{}] ingested {} events ({} chats, {} messages, {} skipped, {} failed, {} malformed)",
            self.store.backend(),
            report.total(),
            report.chats,
            report.messages,
            report.skipped,
            report.failed,
            report.malformed
        );
        Ok(report)
    }
}
