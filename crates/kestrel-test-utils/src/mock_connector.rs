// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted chat platform backend.
//!
//! `ScriptedConnector` fails logins from a queue of error messages, then
//! succeeds with a [`MockSession`]. The session's listen loop delivers
//! injected messages and can be told to crash, panic, or close.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use kestrel_core::{
    ConnectorBackend, ConnectorCredentials, ConnectorSession, ConversationId, InboundMessage,
    KestrelError,
};

use crate::lock;

/// Backend whose logins follow a script.
#[derive(Default)]
pub struct ScriptedConnector {
    login_failures: Mutex<VecDeque<String>>,
    attempts: AtomicUsize,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    last_credentials: Mutex<Option<ConnectorCredentials>>,
    ignore_cancel: AtomicBool,
    error_on_cancel: AtomicBool,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next login fails with `message`. Call repeatedly to queue more.
    pub fn fail_next_login(&self, message: &str) {
        lock(&self.login_failures).push_back(message.to_string());
    }

    /// Sessions created from now on keep listening after cancellation.
    pub fn ignore_cancellation(&self) {
        self.ignore_cancel.store(true, Ordering::SeqCst);
    }

    /// Sessions created from now on return an error once cancelled, like a
    /// socket torn down under a pending read.
    pub fn error_on_cancellation(&self) {
        self.error_on_cancel.store(true, Ordering::SeqCst);
    }

    pub fn login_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The most recently created session.
    pub fn session(&self) -> Option<Arc<MockSession>> {
        lock(&self.sessions).last().cloned()
    }

    pub fn sessions_created(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Credentials seen by the last login attempt.
    pub fn last_credentials(&self) -> Option<ConnectorCredentials> {
        lock(&self.last_credentials).clone()
    }
}

#[async_trait]
impl ConnectorBackend for ScriptedConnector {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn login(
        &self,
        credentials: &ConnectorCredentials,
    ) -> Result<Arc<dyn ConnectorSession>, KestrelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_credentials) = Some(credentials.clone());
        let failure = lock(&self.login_failures).pop_front();
        if let Some(message) = failure {
            return Err(KestrelError::login(message));
        }
        let session = Arc::new(MockSession::new(
            self.ignore_cancel.load(Ordering::SeqCst),
            self.error_on_cancel.load(Ordering::SeqCst),
        ));
        lock(&self.sessions).push(Arc::clone(&session));
        Ok(session)
    }
}

enum SessionEvent {
    Message(InboundMessage),
    Crash(String),
    Panic,
    Close,
}

/// Session with an injectable listen loop and captured sends.
pub struct MockSession {
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<SessionEvent>>,
    sent: Mutex<Vec<(ConversationId, String)>>,
    listens: AtomicUsize,
    disconnects: AtomicUsize,
    ignore_cancel: bool,
    error_on_cancel: bool,
}

impl MockSession {
    fn new(ignore_cancel: bool, error_on_cancel: bool) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
            sent: Mutex::new(Vec::new()),
            listens: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            ignore_cancel,
            error_on_cancel,
        }
    }

    pub fn inject(&self, message: InboundMessage) {
        let _ = self.events_tx.send(SessionEvent::Message(message));
    }

    /// Makes the listen loop return an error.
    pub fn crash(&self, reason: &str) {
        let _ = self.events_tx.send(SessionEvent::Crash(reason.to_string()));
    }

    /// Makes the listen loop panic.
    pub fn panic(&self) {
        let _ = self.events_tx.send(SessionEvent::Panic);
    }

    /// Makes the listen loop return cleanly, as if the platform hung up.
    pub fn close(&self) {
        let _ = self.events_tx.send(SessionEvent::Close);
    }

    pub fn sent(&self) -> Vec<(ConversationId, String)> {
        lock(&self.sent).clone()
    }

    /// How many times `listen` has been entered.
    pub fn listen_calls(&self) -> usize {
        self.listens.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectorSession for MockSession {
    fn display_name(&self) -> String {
        "mock-session".to_string()
    }

    async fn listen(
        &self,
        inbound: mpsc::Sender<InboundMessage>,
        cancel: CancellationToken,
    ) -> Result<(), KestrelError> {
        self.listens.fetch_add(1, Ordering::SeqCst);
        let mut events = self.events_rx.lock().await;
        loop {
            let event = if self.ignore_cancel {
                events.recv().await
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if self.error_on_cancel {
                            return Err(KestrelError::Connector {
                                message: "socket closed".to_string(),
                                source: None,
                            });
                        }
                        return Ok(());
                    }
                    event = events.recv() => event,
                }
            };
            match event {
                Some(SessionEvent::Message(message)) => {
                    if inbound.send(message).await.is_err() {
                        return Ok(());
                    }
                }
                Some(SessionEvent::Crash(reason)) => {
                    return Err(KestrelError::Connector {
                        message: reason,
                        source: None,
                    });
                }
                Some(SessionEvent::Panic) => panic!("mock listen loop panicked"),
                Some(SessionEvent::Close) | None => return Ok(()),
            }
        }
    }

    async fn send(&self, conversation: &ConversationId, text: &str) -> Result<(), KestrelError> {
        lock(&self.sent).push((conversation.clone(), text.to_string()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), KestrelError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
