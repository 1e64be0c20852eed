// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connector lifecycle: `Idle -> Starting -> Running -> Stopping -> Idle`, plus `Failed`.
//!
//! Start and stop run on the caller's task. The platform's listen loop runs
//! on one background worker that forwards each inbound message to the
//! [`MessageHandler`] on its own task. A crashed listen loop is recorded and
//! left stopped.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use strum::Display;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use kestrel_config::model::ConnectorConfig;
use kestrel_core::{
    ActivityLevel, ActivitySink, ConnectorBackend, ConnectorCredentials, ConnectorSession,
    InboundMessage, KestrelError, MessageHandler,
};

use crate::heartbeat::HeartbeatSession;
use crate::normalize::normalize_cookies;

/// Buffered inbound messages between the listen loop and handler dispatch.
const INBOUND_BUFFER: usize = 64;

/// Which backend the supervisor drives. Chosen once, at construction.
#[derive(Clone)]
pub enum ConnectorMode {
    /// Heartbeat-only worker, no login.
    Mock { heartbeat: Duration },
    /// A real platform backend.
    Live(Arc<dyn ConnectorBackend>),
}

impl ConnectorMode {
    fn label(&self) -> &'static str {
        match self {
            ConnectorMode::Mock { .. } => "mock",
            ConnectorMode::Live(_) => "live",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Why a running session ended without `stop` being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionEnd {
    /// The platform closed the connection.
    Disconnected,
    /// The listen loop errored or panicked.
    Crashed,
}

/// Point-in-time view of the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisorStatus {
    pub initialized: bool,
    pub running: bool,
    pub state: SupervisorState,
    pub mode: &'static str,
    pub start_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Retry and shutdown timing.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub max_login_retries: u32,
    pub login_retry_delay: Duration,
    pub stop_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from(&ConnectorConfig::default())
    }
}

impl From<&ConnectorConfig> for SupervisorSettings {
    fn from(config: &ConnectorConfig) -> Self {
        Self {
            max_login_retries: config.max_login_retries,
            login_retry_delay: Duration::from_secs(config.login_retry_delay_secs),
            stop_timeout: Duration::from_secs(config.stop_timeout_secs),
        }
    }
}

/// A login error, tagged by whether another attempt could help.
#[derive(Debug)]
pub enum LoginFailure {
    /// Session expiry: stale cookies or a login challenge.
    Retryable(KestrelError),
    Fatal(KestrelError),
}

impl LoginFailure {
    pub fn classify(err: KestrelError) -> Self {
        if err.is_session_expiry() {
            LoginFailure::Retryable(err)
        } else {
            LoginFailure::Fatal(err)
        }
    }
}

struct Slot {
    state: SupervisorState,
    credentials: Option<ConnectorCredentials>,
    running: bool,
    start_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
    session: Option<Arc<dyn ConnectorSession>>,
    worker: Option<JoinHandle<()>>,
    worker_cancel: Option<CancellationToken>,
    start_cancel: Option<CancellationToken>,
    /// Bumped for every worker so a late exit from an old one is ignored.
    epoch: u64,
}

struct Shared {
    slot: Mutex<Slot>,
    state_tx: watch::Sender<SupervisorState>,
    /// `None` while a session runs or after `stop`.
    ended_tx: watch::Sender<Option<SessionEnd>>,
    sink: Arc<dyn ActivitySink>,
}

impl Shared {
    fn set_state(&self, slot: &mut Slot, state: SupervisorState) {
        slot.state = state;
        self.state_tx.send_replace(state);
    }
}

/// Owns the single connector session and its background listen worker.
pub struct ConnectorSupervisor {
    mode: ConnectorMode,
    settings: SupervisorSettings,
    handler: Arc<dyn MessageHandler>,
    shared: Arc<Shared>,
    /// Serializes start, stop, and initialize.
    lifecycle: Mutex<()>,
}

impl ConnectorSupervisor {
    pub fn new(
        mode: ConnectorMode,
        settings: SupervisorSettings,
        handler: Arc<dyn MessageHandler>,
        sink: Arc<dyn ActivitySink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Idle);
        let (ended_tx, _) = watch::channel(None);
        Self {
            mode,
            settings,
            handler,
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    state: SupervisorState::Idle,
                    credentials: None,
                    running: false,
                    start_time: None,
                    last_error: None,
                    session: None,
                    worker: None,
                    worker_cancel: None,
                    start_cancel: None,
                    epoch: 0,
                }),
                state_tx,
                ended_tx,
                sink,
            }),
            lifecycle: Mutex::new(()),
        }
    }

    /// Installs credentials, stopping any active session first.
    pub async fn initialize(&self, credentials: ConnectorCredentials) -> Result<(), KestrelError> {
        let active = {
            let slot = self.shared.slot.lock().await;
            matches!(
                slot.state,
                SupervisorState::Starting | SupervisorState::Running
            )
        };
        if active {
            info!("re-initializing connector, stopping current session");
            self.stop().await?;
        }

        let _guard = self.lifecycle.lock().await;
        let mut slot = self.shared.slot.lock().await;
        slot.credentials = Some(credentials);
        slot.last_error = None;
        info!(mode = self.mode.label(), "connector initialized");
        Ok(())
    }

    /// Logs in (with retries) and starts the listen worker.
    ///
    /// Returns the current status without doing anything when already
    /// starting or running.
    pub async fn start(&self) -> Result<SupervisorStatus, KestrelError> {
        if self.is_active().await {
            return Ok(self.status().await);
        }
        let _guard = self.lifecycle.lock().await;

        let (credentials, cancel) = {
            let mut slot = self.shared.slot.lock().await;
            if matches!(
                slot.state,
                SupervisorState::Starting | SupervisorState::Running
            ) {
                return Ok(self.status_of(&slot));
            }
            let Some(credentials) = slot.credentials.clone() else {
                return Err(KestrelError::Config(
                    "connector not initialized".to_string(),
                ));
            };
            let cancel = CancellationToken::new();
            slot.start_cancel = Some(cancel.clone());
            slot.last_error = None;
            self.shared.set_state(&mut slot, SupervisorState::Starting);
            (credentials, cancel)
        };

        info!(mode = self.mode.label(), "connector starting");
        self.shared
            .sink
            .report(ActivityLevel::Info, "connector starting", None);

        let outcome = match &self.mode {
            ConnectorMode::Mock { heartbeat } => {
                let session: Arc<dyn ConnectorSession> = Arc::new(HeartbeatSession::new(*heartbeat));
                Ok(Some(session))
            }
            ConnectorMode::Live(backend) => {
                self.login_with_retry(backend.as_ref(), credentials, &cancel)
                    .await
            }
        };

        let mut slot = self.shared.slot.lock().await;
        slot.start_cancel = None;
        match outcome {
            Ok(Some(session)) => {
                self.spawn_worker(&mut slot, session);
                let status = self.status_of(&slot);
                info!(mode = status.mode, "connector running");
                self.shared.sink.report(
                    ActivityLevel::Info,
                    "connector running",
                    Some(json!({ "mode": status.mode })),
                );
                Ok(status)
            }
            Ok(None) => {
                info!("connector start cancelled");
                self.shared.set_state(&mut slot, SupervisorState::Idle);
                Ok(self.status_of(&slot))
            }
            Err(e) => {
                error!(error = %e, "connector failed to start");
                slot.running = false;
                slot.start_time = None;
                slot.last_error = Some(e.to_string());
                self.shared.set_state(&mut slot, SupervisorState::Failed);
                self.shared.sink.report(
                    ActivityLevel::Error,
                    "connector failed to start",
                    Some(json!({ "error": e.to_string() })),
                );
                Err(e)
            }
        }
    }

    /// Stops the worker, waiting up to the stop timeout for it to exit.
    ///
    /// Also cancels an in-flight `start`: its pending retry is abandoned.
    pub async fn stop(&self) -> Result<SupervisorStatus, KestrelError> {
        if let Some(cancel) = self.shared.slot.lock().await.start_cancel.take() {
            cancel.cancel();
        }
        let _guard = self.lifecycle.lock().await;

        let (session, worker, worker_cancel) = {
            let mut slot = self.shared.slot.lock().await;
            self.shared.set_state(&mut slot, SupervisorState::Stopping);
            (
                slot.session.take(),
                slot.worker.take(),
                slot.worker_cancel.take(),
            )
        };

        if worker.is_some() {
            info!("connector stopping");
        }
        if let Some(cancel) = worker_cancel {
            cancel.cancel();
        }
        if let Some(session) = session {
            if let Err(e) = session.disconnect().await {
                warn!(error = %e, "connector disconnect failed");
            }
        }
        if let Some(mut worker) = worker {
            match tokio::time::timeout(self.settings.stop_timeout, &mut worker).await {
                Ok(_) => info!("listen worker exited"),
                Err(_) => {
                    error!(
                        timeout_secs = self.settings.stop_timeout.as_secs(),
                        "listen worker did not exit in time, abandoning it"
                    );
                    worker.abort();
                }
            }
        }

        let mut slot = self.shared.slot.lock().await;
        slot.epoch += 1;
        slot.running = false;
        slot.start_time = None;
        self.shared.set_state(&mut slot, SupervisorState::Idle);
        self.shared
            .sink
            .report(ActivityLevel::Info, "connector stopped", None);
        Ok(self.status_of(&slot))
    }

    pub async fn status(&self) -> SupervisorStatus {
        let slot = self.shared.slot.lock().await;
        self.status_of(&slot)
    }

    /// Live state changes.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.shared.state_tx.subscribe()
    }

    /// Session endings the supervisor did not ask for.
    ///
    /// A restart through `stop` and `start` never publishes here.
    pub fn subscribe_ended(&self) -> watch::Receiver<Option<SessionEnd>> {
        self.shared.ended_tx.subscribe()
    }

    /// The active session, if running.
    pub async fn session(&self) -> Option<Arc<dyn ConnectorSession>> {
        self.shared.slot.lock().await.session.clone()
    }

    async fn is_active(&self) -> bool {
        matches!(
            self.shared.slot.lock().await.state,
            SupervisorState::Starting | SupervisorState::Running
        )
    }

    fn status_of(&self, slot: &Slot) -> SupervisorStatus {
        SupervisorStatus {
            initialized: slot.credentials.is_some(),
            running: slot.running,
            state: slot.state,
            mode: self.mode.label(),
            start_time: slot.start_time,
            last_error: slot.last_error.clone(),
        }
    }

    /// `Ok(None)` means `stop` cancelled the start.
    async fn login_with_retry(
        &self,
        backend: &dyn ConnectorBackend,
        mut credentials: ConnectorCredentials,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<dyn ConnectorSession>>, KestrelError> {
        let missing = credentials.missing_fields();
        if !missing.is_empty() {
            return Err(KestrelError::Config(format!(
                "missing connector credentials: {}",
                missing.join(", ")
            )));
        }
        credentials.session_cookies = normalize_cookies(&credentials.session_cookies);

        let max = self.settings.max_login_retries.max(1);
        for attempt in 1..=max {
            info!(backend = backend.name(), attempt, max, "connector login attempt");
            let result = tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                result = backend.login(&credentials) => result,
            };
            let err = match result {
                Ok(session) => {
                    info!(account = %session.display_name(), "connector logged in");
                    return Ok(Some(session));
                }
                Err(e) => e,
            };

            match LoginFailure::classify(err) {
                LoginFailure::Fatal(e) => return Err(e),
                LoginFailure::Retryable(e) if attempt < max => {
                    warn!(
                        attempt,
                        max,
                        error = %e,
                        delay_secs = self.settings.login_retry_delay.as_secs(),
                        "connector login failed, retrying"
                    );
                    self.shared.sink.report(
                        ActivityLevel::Warning,
                        "connector login failed, retrying",
                        Some(json!({ "attempt": attempt, "error": e.to_string() })),
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(self.settings.login_retry_delay) => {}
                    }
                }
                LoginFailure::Retryable(e) => {
                    error!(attempts = max, error = %e, "connector login max retries exceeded");
                    return Err(KestrelError::Login {
                        message: format!("max retries exceeded after {max} attempts: {e}"),
                        source: Some(Box::new(e)),
                    });
                }
            }
        }
        Err(KestrelError::Internal("login loop ended without result".to_string()))
    }

    fn spawn_worker(&self, slot: &mut Slot, session: Arc<dyn ConnectorSession>) {
        slot.epoch += 1;
        let epoch = slot.epoch;
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run_worker(
            Arc::clone(&self.shared),
            Arc::clone(&session),
            Arc::clone(&self.handler),
            cancel.clone(),
            epoch,
        ));
        slot.session = Some(session);
        slot.worker = Some(worker);
        slot.worker_cancel = Some(cancel);
        slot.running = true;
        slot.start_time = Some(Utc::now());
        self.shared.ended_tx.send_replace(None);
        self.shared.set_state(slot, SupervisorState::Running);
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    session: Arc<dyn ConnectorSession>,
    handler: Arc<dyn MessageHandler>,
    cancel: CancellationToken,
    epoch: u64,
) {
    let (tx, mut rx) = mpsc::channel::<InboundMessage>(INBOUND_BUFFER);
    let tasks = TaskTracker::new();

    let listen = AssertUnwindSafe(session.listen(tx, cancel.clone())).catch_unwind();
    let forward = async {
        while let Some(message) = rx.recv().await {
            let handler = Arc::clone(&handler);
            let session = Arc::clone(&session);
            tasks.spawn(async move { handler.handle(message, session).await });
        }
    };
    let (outcome, ()) = tokio::join!(listen, forward);
    tasks.close();

    let mut slot = shared.slot.lock().await;
    if slot.epoch != epoch {
        return;
    }
    let crash = match outcome {
        Ok(Ok(())) if cancel.is_cancelled() => return,
        Ok(Err(e)) if cancel.is_cancelled() => {
            debug!(error = %e, "listen loop errored after stop was requested");
            return;
        }
        Ok(Ok(())) => {
            warn!("listen loop ended, platform closed the connection");
            slot.running = false;
            slot.start_time = None;
            slot.session = None;
            slot.worker_cancel = None;
            shared.set_state(&mut slot, SupervisorState::Idle);
            shared.ended_tx.send_replace(Some(SessionEnd::Disconnected));
            shared
                .sink
                .report(ActivityLevel::Warning, "connector disconnected", None);
            return;
        }
        Ok(Err(e)) => e,
        Err(panic) => KestrelError::ListenCrash {
            message: panic_message(panic.as_ref()),
        },
    };

    error!(error = %crash, "listen loop crashed, connector stopped");
    slot.running = false;
    slot.start_time = None;
    slot.session = None;
    slot.worker_cancel = None;
    slot.last_error = Some(crash.to_string());
    shared.set_state(&mut slot, SupervisorState::Failed);
    shared.ended_tx.send_replace(Some(SessionEnd::Crashed));
    shared.sink.report(
        ActivityLevel::Error,
        "listen loop crashed",
        Some(json!({ "error": crash.to_string() })),
    );
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listen loop panicked".to_string()
    }
}
