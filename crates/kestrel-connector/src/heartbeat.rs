// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock-mode session: no platform, just a periodic heartbeat.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kestrel_core::{ConnectorSession, ConversationId, InboundMessage, KestrelError};

/// Session used when no platform library is wired in.
///
/// Its listen loop receives nothing and logs `heartbeat #n` every interval.
pub struct HeartbeatSession {
    interval: Duration,
    beats: AtomicU64,
}

impl HeartbeatSession {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            beats: AtomicU64::new(0),
        }
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConnectorSession for HeartbeatSession {
    fn display_name(&self) -> String {
        "mock".to_string()
    }

    async fn listen(
        &self,
        _inbound: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Result<(), KestrelError> {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    let n = self.beats.fetch_add(1, Ordering::Relaxed) + 1;
                    info!(beat = n, "mock connector heartbeat #{n}");
                }
            }
        }
    }

    async fn send(&self, conversation: &ConversationId, text: &str) -> Result<(), KestrelError> {
        debug!(conversation = %conversation, len = text.len(), "mock connector dropped outbound message");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), KestrelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn beats_until_cancelled() {
        let session = std::sync::Arc::new(HeartbeatSession::new(Duration::from_secs(10)));
        let cancel = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        let task = {
            let session = session.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { session.listen(tx, cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(35)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(session.beats(), 3);
    }
}
