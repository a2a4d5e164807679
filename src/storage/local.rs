//! SQLite-backed message storage
//!
//! Local embedded variant of the capability set. Unlike the remote backend it
//! keeps every media attribute and answers reads.

use super::writer::WriteOutcome;
use super::MessageStore;
use crate::core::error::{StoreError, StoreResult};
use crate::core::models::{ChatSummary, IncomingMessage, MediaInfo, StoredMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const BACKEND: &str = "local";

/// Uses a single connection behind a mutex; SQLite handles file locking itself
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!("Opening local message store at {:?}", path);
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;

             CREATE TABLE IF NOT EXISTS chats (
                jid TEXT PRIMARY KEY,
                name TEXT,
                last_message_time TIMESTAMP
             );

             CREATE TABLE IF NOT EXISTS messages (
                id TEXT NOT NULL,
                chat_jid TEXT NOT NULL,
                sender TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TIMESTAMP NOT NULL,
                is_from_me BOOLEAN NOT NULL,
                media_type TEXT,
                filename TEXT,
                url TEXT,
                media_key BLOB,
                file_sha256 BLOB,
                file_enc_sha256 BLOB,
                file_length INTEGER,
                PRIMARY KEY (id, chat_jid),
                FOREIGN KEY (chat_jid) REFERENCES chats(jid)
             );

             CREATE INDEX IF NOT EXISTS idx_messages_chat_time
                ON messages(chat_jid, timestamp DESC);",
        )?;

        tracing::debug!("Local message store schema initialized");
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn supports_reads(&self) -> bool {
        true
    }

    async fn store_chat(
        &self,
        jid: &str,
        name: &str,
        last_message_time: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO chats (jid, name, last_message_time) VALUES (?1, NULLIF(?2, ''), ?3)
             ON CONFLICT(jid) DO UPDATE SET
                name = COALESCE(excluded.name, chats.name),
                last_message_time = excluded.last_message_time",
            params![jid, name, last_message_time],
        )?;
        Ok(())
    }

    async fn store_message(&self, message: &IncomingMessage) -> StoreResult<WriteOutcome> {
        if message.is_empty() {
            return Ok(WriteOutcome::Skipped);
        }

        let media = message.media.clone().unwrap_or_default();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        // chats row must exist for the foreign key; keep the newest activity time
        tx.execute(
            "INSERT INTO chats (jid, last_message_time) VALUES (?1, ?2)
             ON CONFLICT(jid) DO UPDATE SET last_message_time = excluded.last_message_time
             WHERE chats.last_message_time IS NULL
                OR chats.last_message_time < excluded.last_message_time",
            params![message.chat_jid, message.timestamp],
        )?;

        // id-less events must not collapse onto one row; give them a key of their own
        let id = if message.id.trim().is_empty() {
            let local_id = next_local_id(&tx, &message.chat_jid)?;
            tracing::warn!(
                "Message in {} has no id; storing it as {}",
                message.chat_jid,
                local_id
            );
            local_id
        } else {
            message.id.clone()
        };

        tx.execute(
            "INSERT OR REPLACE INTO messages
             (id, chat_jid, sender, content, timestamp, is_from_me, media_type, filename, url,
              media_key, file_sha256, file_enc_sha256, file_length)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                id,
                message.chat_jid,
                message.sender,
                message.content,
                message.timestamp,
                message.is_from_me,
                message.media_type(),
                media.filename,
                media.url,
                media.media_key,
                media.file_sha256,
                media.file_enc_sha256,
                media.file_length as i64,
            ],
        )?;

        tx.commit()?;
        tracing::debug!("Saved message {} to local store", id);

        Ok(WriteOutcome::Stored { id: Some(id) })
    }

    async fn get_messages(&self, chat_jid: &str, limit: usize) -> StoreResult<Vec<StoredMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, chat_jid, sender, content, timestamp, is_from_me, media_type
             FROM messages WHERE chat_jid = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![chat_jid, limit as i64], |row| {
            Ok(StoredMessage {
                id: row.get(0)?,
                chat_jid: row.get(1)?,
                sender: row.get(2)?,
                content: row.get(3)?,
                timestamp: row.get(4)?,
                is_from_me: row.get(5)?,
                media_type: row.get(6)?,
            })
        })?;

        let messages = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    async fn get_chats(&self) -> StoreResult<Vec<ChatSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT jid, name, last_message_time FROM chats
             ORDER BY last_message_time DESC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ChatSummary {
                jid: row.get(0)?,
                name: row.get(1)?,
                last_message_time: row.get(2)?,
            })
        })?;

        let chats = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(chats)
    }

    async fn get_media_info(&self, id: &str, chat_jid: &str) -> StoreResult<MediaInfo> {
        let conn = self.conn.lock();
        let media = conn
            .query_row(
                "SELECT media_type, filename, url, media_key, file_sha256, file_enc_sha256, file_length
                 FROM messages WHERE id = ?1 AND chat_jid = ?2",
                params![id, chat_jid],
                |row| {
                    Ok(MediaInfo {
                        media_type: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                        filename: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        url: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        media_key: row.get::<_, Option<Vec<u8>>>(3)?.unwrap_or_default(),
                        file_sha256: row.get::<_, Option<Vec<u8>>>(4)?.unwrap_or_default(),
                        file_enc_sha256: row.get::<_, Option<Vec<u8>>>(5)?.unwrap_or_default(),
                        file_length: row.get::<_, Option<i64>>(6)?.unwrap_or_default().max(0)
                            as u64,
                    })
                },
            )
            .optional()?;

        media.ok_or_else(|| StoreError::NotFound(format!("message {} in {}", id, chat_jid)))
    }

    async fn close(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

fn next_local_id(conn: &Connection, chat_jid: &str) -> StoreResult<String> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE chat_jid = ?1 AND id LIKE 'local-%'",
        params![chat_jid],
        |row| row.get(0),
    )?;
    Ok(format!("local-{}", count + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_store_and_read_messages() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.store_chat("123@x", "Alice", at(0)).await.unwrap();

        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            let msg = IncomingMessage::text(
                format!("m{}", i),
                "123@x",
                "123@x",
                *text,
                at(i as u32 + 1),
                false,
            );
            store.store_message(&msg).await.unwrap();
        }

        let messages = store.get_messages("123@x", 2).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "three");
        assert_eq!(messages[1].content, "two");

        let chats = store.get_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].name.as_deref(), Some("Alice"));
        assert_eq!(chats[0].last_message_time, Some(at(3)));
    }

    #[tokio::test]
    async fn test_message_for_unknown_chat_creates_it() {
        let store = SqliteStore::open_in_memory().unwrap();
        let msg = IncomingMessage::text("m1", "999@x", "999@x", "hi", at(5), false);
        store.store_message(&msg).await.unwrap();

        let chats = store.get_chats().await.unwrap();
        assert_eq!(chats[0].jid, "999@x");
        assert_eq!(chats[0].name, None);
    }

    #[tokio::test]
    async fn test_empty_name_keeps_previous_name() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.store_chat("123@x", "Alice", at(0)).await.unwrap();
        store.store_chat("123@x", "", at(1)).await.unwrap();

        let chats = store.get_chats().await.unwrap();
        assert_eq!(chats[0].name.as_deref(), Some("Alice"));
        assert_eq!(chats[0].last_message_time, Some(at(1)));
    }

    #[tokio::test]
    async fn test_redelivery_replaces_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let msg = IncomingMessage::text("m1", "123@x", "123@x", "hello", at(1), false);
        store.store_message(&msg).await.unwrap();
        store.store_message(&msg).await.unwrap();

        assert_eq!(store.get_messages("123@x", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_is_skipped() {
        let store = SqliteStore::open_in_memory().unwrap();
        let msg = IncomingMessage::text("m1", "123@x", "123@x", "", at(1), false);
        assert_eq!(store.store_message(&msg).await.unwrap(), WriteOutcome::Skipped);
        assert!(store.get_chats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_media_info_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::open(temp_dir.path().join("db/messages.db")).unwrap();

        let media = MediaInfo {
            media_type: "image".to_string(),
            filename: "photo.jpg".to_string(),
            url: "https://mmg.example/abc".to_string(),
            media_key: vec![1, 2, 3],
            file_sha256: vec![4, 5],
            file_enc_sha256: vec![6],
            file_length: 2048,
        };
        let msg = IncomingMessage::text("m1", "123@x", "123@x", "", at(1), false)
            .with_media(media.clone());
        store.store_message(&msg).await.unwrap();

        assert_eq!(store.get_media_info("m1", "123@x").await.unwrap(), media);
        assert!(matches!(
            store.get_media_info("missing", "123@x").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("messages.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.store_chat("123@x", "Alice", at(0)).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let chats = store.get_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].jid, "123@x");
    }

    #[tokio::test]
    async fn test_messages_without_id_are_kept_apart() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = IncomingMessage::text("", "c@x", "c@x", "one", at(1), false);
        let second = IncomingMessage::text("", "c@x", "c@x", "two", at(2), false);

        let first_outcome = store.store_message(&first).await.unwrap();
        let second_outcome = store.store_message(&second).await.unwrap();
        assert_ne!(first_outcome, second_outcome);

        let messages = store.get_messages("c@x", 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.id.starts_with("local-")));
    }
}
