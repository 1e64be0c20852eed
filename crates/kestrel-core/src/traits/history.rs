// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable conversation history storage.

use async_trait::async_trait;

use crate::error::KestrelError;
use crate::types::{ChannelKind, ConversationId, Exchange};

/// Durable store for per-conversation exchange history.
///
/// Records are keyed by `(channel, conversation)`. Failures are reported as
/// [`KestrelError::StorageUnavailable`]; callers fall back to memory.
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Returns the stored exchanges, or `None` if the conversation is unknown.
    async fn get(
        &self,
        channel: ChannelKind,
        conversation: &ConversationId,
    ) -> Result<Option<Vec<Exchange>>, KestrelError>;

    /// Replaces the stored exchanges for a conversation.
    async fn upsert(
        &self,
        channel: ChannelKind,
        conversation: &ConversationId,
        exchanges: &[Exchange],
    ) -> Result<(), KestrelError>;

    /// Removes a conversation. Deleting an unknown conversation is not an error.
    async fn delete(
        &self,
        channel: ChannelKind,
        conversation: &ConversationId,
    ) -> Result<(), KestrelError>;
}
