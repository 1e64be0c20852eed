// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat platform capabilities: login, listen, send.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::KestrelError;
use crate::types::{ConnectorCredentials, ConversationId, InboundMessage};

/// Entry point to the chat platform. Produces a session per successful login.
#[async_trait]
pub trait ConnectorBackend: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Logs in with the given credentials.
    ///
    /// Session-expiry failures should mention `login` or `cookie` in their
    /// message so the supervisor retries them.
    async fn login(
        &self,
        credentials: &ConnectorCredentials,
    ) -> Result<Arc<dyn ConnectorSession>, KestrelError>;
}

/// A logged-in connection to the chat platform.
#[async_trait]
pub trait ConnectorSession: Send + Sync + 'static {
    /// Account or bot name reported by the platform.
    fn display_name(&self) -> String;

    /// Runs the listen loop until `cancel` fires or the connection fails.
    ///
    /// Every received message is pushed into `inbound`. Returning `Ok(())`
    /// without cancellation means the platform closed the connection.
    async fn listen(
        &self,
        inbound: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Result<(), KestrelError>;

    /// Sends text to a conversation.
    async fn send(&self, conversation: &ConversationId, text: &str) -> Result<(), KestrelError>;

    /// Asks the platform to close the connection. Must be idempotent.
    async fn disconnect(&self) -> Result<(), KestrelError>;
}

/// Consumer of inbound messages, invoked once per message on its own task.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: InboundMessage, session: Arc<dyn ConnectorSession>);
}
