// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal connector for local runs.
//!
//! Each stdin line is one message in the `console` conversation; replies are
//! written to stdout. EOF closes the session like a platform hang-up.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use kestrel_config::model::ConnectorConfig;
use kestrel_core::{
    ChannelKind, ConnectorBackend, ConnectorCredentials, ConnectorSession, ConversationId,
    InboundMessage, KestrelError,
};

pub const CONSOLE_CONVERSATION: &str = "console";

/// Connector credentials for console mode.
///
/// The terminal needs no platform login, so blank fields are filled with
/// placeholders to pass the supervisor's credential check.
pub fn console_credentials(config: &ConnectorConfig) -> ConnectorCredentials {
    let or_placeholder = |value: &Option<String>| {
        value
            .clone()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| CONSOLE_CONVERSATION.to_string())
    };
    ConnectorCredentials {
        api_key: Some(SecretString::from(or_placeholder(&config.api_key))),
        secret_key: Some(SecretString::from(or_placeholder(&config.secret_key))),
        device_id: Some(or_placeholder(&config.device_id)),
        session_cookies: config.session_cookies.clone(),
    }
}

#[derive(Debug, Default)]
pub struct ConsoleBackend;

#[async_trait]
impl ConnectorBackend for ConsoleBackend {
    fn name(&self) -> &str {
        "console"
    }

    async fn login(
        &self,
        _credentials: &ConnectorCredentials,
    ) -> Result<Arc<dyn ConnectorSession>, KestrelError> {
        Ok(Arc::new(ConsoleSession::new(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )))
    }
}

type Reader = Box<dyn AsyncBufRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

pub struct ConsoleSession {
    input: Mutex<Reader>,
    output: Mutex<Writer>,
}

impl ConsoleSession {
    pub fn new<R, W>(input: R, output: W) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            input: Mutex::new(Box::new(input)),
            output: Mutex::new(Box::new(output)),
        }
    }
}

fn io_error(context: &str, e: std::io::Error) -> KestrelError {
    KestrelError::Connector {
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl ConnectorSession for ConsoleSession {
    fn display_name(&self) -> String {
        "console".to_string()
    }

    async fn listen(
        &self,
        inbound: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Result<(), KestrelError> {
        let mut input = self.input.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            let read = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                read = input.read_line(&mut line) => read,
            };
            match read {
                Ok(0) => {
                    debug!("console input closed");
                    return Ok(());
                }
                Ok(_) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    let message =
                        InboundMessage::new(CONSOLE_CONVERSATION, ChannelKind::Chat, "you", text);
                    if inbound.send(message).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => return Err(io_error("failed to read console input", e)),
            }
        }
    }

    async fn send(&self, conversation: &ConversationId, text: &str) -> Result<(), KestrelError> {
        let mut output = self.output.lock().await;
        output
            .write_all(format!("[{conversation}] {text}\n").as_bytes())
            .await
            .map_err(|e| io_error("failed to write console output", e))?;
        output
            .flush()
            .await
            .map_err(|e| io_error("failed to flush console output", e))
    }

    async fn disconnect(&self) -> Result<(), KestrelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[test]
    fn placeholders_fill_blank_credentials() {
        let config = ConnectorConfig {
            device_id: Some("real-device".to_string()),
            secret_key: Some("   ".to_string()),
            ..ConnectorConfig::default()
        };
        let creds = console_credentials(&config);
        assert!(creds.missing_fields().is_empty());
        assert_eq!(creds.device_id.as_deref(), Some("real-device"));
    }

    #[tokio::test]
    async fn lines_become_messages_until_eof() {
        let session = ConsoleSession::new(
            std::io::Cursor::new(b"hello\n\n  second line  \n".to_vec()),
            tokio::io::sink(),
        );
        let (tx, mut rx) = mpsc::channel(8);

        session.listen(tx, CancellationToken::new()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.conversation.as_str(), CONSOLE_CONVERSATION);
        assert_eq!(first.channel, ChannelKind::Chat);
        assert_eq!(first.text, "hello");
        assert_eq!(rx.recv().await.unwrap().text, "second line");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_stops_listening() {
        let (_keep_open, reader) = tokio::io::duplex(64);
        let session = ConsoleSession::new(BufReader::new(reader), tokio::io::sink());
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();
        session.listen(tx, cancel).await.unwrap();
    }

    #[tokio::test]
    async fn replies_are_written_as_lines() {
        let (writer, mut reader) = tokio::io::duplex(256);
        let session = ConsoleSession::new(std::io::Cursor::new(Vec::new()), writer);

        session
            .send(&ConversationId::new(CONSOLE_CONVERSATION), "hi there")
            .await
            .unwrap();
        drop(session);

        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "[console] hi there\n");
    }
}
