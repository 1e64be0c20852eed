// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `HistoryStore` with a failure switch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use kestrel_core::{ChannelKind, ConversationId, Exchange, HistoryStore, KestrelError};

/// Durable-store stand-in. Flip [`set_failing`](Self::set_failing) to make
/// every call return `StorageUnavailable`.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: Mutex<HashMap<(ChannelKind, ConversationId), Vec<Exchange>>>,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that fails from the start.
    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful upserts so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn snapshot(
        &self,
        channel: ChannelKind,
        conversation: &ConversationId,
    ) -> Option<Vec<Exchange>> {
        self.records
            .lock()
            .await
            .get(&(channel, conversation.clone()))
            .cloned()
    }

    fn check(&self) -> Result<(), KestrelError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(KestrelError::storage(std::io::Error::other(
                "history store offline",
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get(
        &self,
        channel: ChannelKind,
        conversation: &ConversationId,
    ) -> Result<Option<Vec<Exchange>>, KestrelError> {
        self.check()?;
        Ok(self.snapshot(channel, conversation).await)
    }

    async fn upsert(
        &self,
        channel: ChannelKind,
        conversation: &ConversationId,
        exchanges: &[Exchange],
    ) -> Result<(), KestrelError> {
        self.check()?;
        self.records
            .lock()
            .await
            .insert((channel, conversation.clone()), exchanges.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(
        &self,
        channel: ChannelKind,
        conversation: &ConversationId,
    ) -> Result<(), KestrelError> {
        self.check()?;
        self.records
            .lock()
            .await
            .remove(&(channel, conversation.clone()));
        Ok(())
    }
}
