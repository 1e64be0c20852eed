// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `HistoryStore` backed by a single SQLite table.
//!
//! Exchanges for one conversation are stored as a JSON array in one row.
//! All access goes through tokio-rusqlite's background thread.

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use tracing::info;

use kestrel_core::{ChannelKind, ConversationId, Exchange, HistoryStore, KestrelError};

use crate::migrations::run_migrations;

fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> KestrelError {
    KestrelError::StorageUnavailable {
        source: Box::new(e),
    }
}

pub struct SqliteHistoryStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteHistoryStore {
    /// Opens (creating if needed) the database at `path` and migrates it.
    pub async fn open(path: &str) -> Result<Self, KestrelError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| KestrelError::StorageUnavailable {
                source: Box::new(e),
            })?;
        Self::migrate(conn, path).await
    }

    pub async fn open_in_memory() -> Result<Self, KestrelError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| KestrelError::StorageUnavailable {
                source: Box::new(e),
            })?;
        Self::migrate(conn, ":memory:").await
    }

    async fn migrate(conn: tokio_rusqlite::Connection, path: &str) -> Result<Self, KestrelError> {
        conn.call(|conn| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| Ok(run_migrations(conn)))
            .await
            .map_err(map_tr_err)??;

        info!(path, "history store opened");
        Ok(Self { conn })
    }

    /// Number of stored conversations across all channels.
    pub async fn conversation_count(&self) -> Result<usize, KestrelError> {
        self.conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM conversation_history", [], |row| {
                        row.get(0)
                    })?;
                Ok(count as usize)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn get(
        &self,
        channel: ChannelKind,
        conversation: &ConversationId,
    ) -> Result<Option<Vec<Exchange>>, KestrelError> {
        let channel = channel.to_string();
        let conversation = conversation.to_string();
        let raw: Option<String> = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    "SELECT messages FROM conversation_history \
                     WHERE channel = ?1 AND conversation_id = ?2",
                    params![channel, conversation],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        raw.map(|json| serde_json::from_str(&json).map_err(KestrelError::storage))
            .transpose()
    }

    async fn upsert(
        &self,
        channel: ChannelKind,
        conversation: &ConversationId,
        exchanges: &[Exchange],
    ) -> Result<(), KestrelError> {
        let channel = channel.to_string();
        let conversation = conversation.to_string();
        let json = serde_json::to_string(exchanges).map_err(KestrelError::storage)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO conversation_history (channel, conversation_id, messages, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (channel, conversation_id)
                     DO UPDATE SET messages = excluded.messages, updated_at = excluded.updated_at",
                    params![channel, conversation, json, now],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete(
        &self,
        channel: ChannelKind,
        conversation: &ConversationId,
    ) -> Result<(), KestrelError> {
        let channel = channel.to_string();
        let conversation = conversation.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM conversation_history WHERE channel = ?1 AND conversation_id = ?2",
                    params![channel, conversation],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(user: &str) -> Exchange {
        Exchange::truncated(user, "reply", 200)
    }

    #[tokio::test]
    async fn unknown_conversation_is_none() {
        let store = SqliteHistoryStore::open_in_memory().await.unwrap();
        let got = store
            .get(ChannelKind::Chat, &ConversationId::new("nobody"))
            .await
            .unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_and_keys_by_channel() {
        let store = SqliteHistoryStore::open_in_memory().await.unwrap();
        let id = ConversationId::new("t-1");
        store
            .upsert(ChannelKind::Chat, &id, &[exchange("first")])
            .await
            .unwrap();
        store
            .upsert(ChannelKind::Chat, &id, &[exchange("first"), exchange("second")])
            .await
            .unwrap();
        store
            .upsert(ChannelKind::Web, &id, &[exchange("web")])
            .await
            .unwrap();

        let chat = store.get(ChannelKind::Chat, &id).await.unwrap().unwrap();
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[1].user, "second");
        let web = store.get(ChannelKind::Web, &id).await.unwrap().unwrap();
        assert_eq!(web[0].user, "web");
        assert_eq!(store.conversation_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = SqliteHistoryStore::open_in_memory().await.unwrap();
        let id = ConversationId::new("t-1");
        store
            .upsert(ChannelKind::Chat, &id, &[exchange("x")])
            .await
            .unwrap();
        store.delete(ChannelKind::Chat, &id).await.unwrap();
        store.delete(ChannelKind::Chat, &id).await.unwrap();
        assert!(store.get(ChannelKind::Chat, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let path = path.to_str().unwrap();
        let id = ConversationId::new("persist");
        {
            let store = SqliteHistoryStore::open(path).await.unwrap();
            store
                .upsert(ChannelKind::Web, &id, &[exchange("kept")])
                .await
                .unwrap();
        }
        let store = SqliteHistoryStore::open(path).await.unwrap();
        let got = store.get(ChannelKind::Web, &id).await.unwrap().unwrap();
        assert_eq!(got[0].user, "kept");
    }
}
