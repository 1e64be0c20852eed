// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle tests for the connector supervisor against a scripted backend.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Mutex;

use kestrel_connector::{
    ConnectorMode, ConnectorSupervisor, SessionEnd, SupervisorSettings, SupervisorState,
};
use kestrel_core::{
    ActivityLevel, ChannelKind, ConnectorCredentials, ConnectorSession, InboundMessage,
    KestrelError, MessageHandler,
};
use kestrel_test_utils::{RecordingSink, ScriptedConnector};

/// Replies "echo: <text>" and remembers what it saw.
#[derive(Default)]
struct EchoHandler {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(&self, message: InboundMessage, session: Arc<dyn ConnectorSession>) {
        self.seen.lock().await.push(message.text.clone());
        let _ = session
            .send(&message.conversation, &format!("echo: {}", message.text))
            .await;
    }
}

fn credentials() -> ConnectorCredentials {
    ConnectorCredentials {
        api_key: Some(SecretString::from("api".to_string())),
        secret_key: Some(SecretString::from("secret".to_string())),
        device_id: Some("imei-123".to_string()),
        session_cookies: BTreeMap::from([("zpw".to_string(), "ａｂｃ１".to_string())]),
    }
}

fn settings() -> SupervisorSettings {
    SupervisorSettings {
        max_login_retries: 3,
        login_retry_delay: Duration::from_secs(5),
        stop_timeout: Duration::from_secs(10),
    }
}

struct Fixture {
    backend: Arc<ScriptedConnector>,
    handler: Arc<EchoHandler>,
    sink: Arc<RecordingSink>,
    supervisor: Arc<ConnectorSupervisor>,
}

async fn live_fixture() -> Fixture {
    let backend = Arc::new(ScriptedConnector::new());
    let handler = Arc::new(EchoHandler::default());
    let sink = Arc::new(RecordingSink::new());
    let supervisor = Arc::new(ConnectorSupervisor::new(
        ConnectorMode::Live(backend.clone()),
        settings(),
        handler.clone(),
        sink.clone(),
    ));
    supervisor.initialize(credentials()).await.unwrap();
    Fixture {
        backend,
        handler,
        sink,
        supervisor,
    }
}

/// Lets spawned tasks run.
async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn start_without_initialize_is_configuration_error() {
    let supervisor = ConnectorSupervisor::new(
        ConnectorMode::Live(Arc::new(ScriptedConnector::new())),
        settings(),
        Arc::new(EchoHandler::default()),
        Arc::new(RecordingSink::new()),
    );
    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, KestrelError::Config(_)));
    assert!(!supervisor.status().await.initialized);
}

#[tokio::test]
async fn missing_credentials_fail_before_login() {
    let f = live_fixture().await;
    let mut creds = credentials();
    creds.device_id = None;
    f.supervisor.initialize(creds).await.unwrap();

    let err = f.supervisor.start().await.unwrap_err();
    assert!(matches!(err, KestrelError::Config(msg) if msg.contains("device_id")));
    assert_eq!(f.backend.login_attempts(), 0);
    assert!(!f.supervisor.status().await.running);
}

#[tokio::test]
async fn start_runs_worker_and_normalizes_cookies() {
    let f = live_fixture().await;
    let status = f.supervisor.start().await.unwrap();
    assert!(status.running);
    assert_eq!(status.state, SupervisorState::Running);
    assert_eq!(status.mode, "live");
    assert!(status.start_time.is_some());

    let seen = f.backend.last_credentials().unwrap();
    assert_eq!(seen.session_cookies["zpw"], "abc1");

    let session = f.backend.session().unwrap();
    session.inject(InboundMessage::new("t1", ChannelKind::Chat, "alice", "hi"));
    settle().await;
    assert_eq!(f.handler.seen.lock().await.as_slice(), ["hi"]);
    assert_eq!(session.sent()[0].1, "echo: hi");
}

#[tokio::test]
async fn second_start_while_running_is_noop() {
    let f = live_fixture().await;
    let first = f.supervisor.start().await.unwrap();
    let second = f.supervisor.start().await.unwrap();
    settle().await;

    assert_eq!(first, second);
    assert_eq!(f.backend.login_attempts(), 1);
    assert_eq!(f.backend.sessions_created(), 1);
    assert_eq!(f.backend.session().unwrap().listen_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn session_expiry_is_retried_with_delay() {
    let f = live_fixture().await;
    f.backend.fail_next_login("cookie expired");
    f.backend.fail_next_login("login required");

    let started = tokio::time::Instant::now();
    let status = f.supervisor.start().await.unwrap();
    assert!(status.running);
    assert_eq!(f.backend.login_attempts(), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
    assert_eq!(f.sink.reports_at(ActivityLevel::Warning).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn retryable_failures_exhaust_into_login_error() {
    let f = live_fixture().await;
    for _ in 0..3 {
        f.backend.fail_next_login("'NoneType' object is not subscriptable");
    }
    let err = f.supervisor.start().await.unwrap_err();
    assert!(matches!(err, KestrelError::Login { .. }));
    assert!(err.to_string().contains("max retries exceeded"));
    assert_eq!(f.backend.login_attempts(), 3);

    let status = f.supervisor.status().await;
    assert_eq!(status.state, SupervisorState::Failed);
    assert!(!status.running);
    assert!(status.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn fatal_login_error_is_not_retried() {
    let f = live_fixture().await;
    f.backend.fail_next_login("account banned");
    let err = f.supervisor.start().await.unwrap_err();
    assert!(err.to_string().contains("account banned"));
    assert_eq!(f.backend.login_attempts(), 1);
    assert_eq!(f.supervisor.status().await.state, SupervisorState::Failed);
}

#[tokio::test(start_paused = true)]
async fn stop_while_starting_prevents_further_attempts() {
    let f = live_fixture().await;
    for _ in 0..3 {
        f.backend.fail_next_login("cookie expired");
    }

    let mut states = f.supervisor.subscribe();
    let starter = {
        let supervisor = Arc::clone(&f.supervisor);
        tokio::spawn(async move { supervisor.start().await })
    };
    states
        .wait_for(|s| *s == SupervisorState::Starting)
        .await
        .unwrap();
    // Let the first attempt fail and enter the retry delay.
    settle().await;
    assert_eq!(f.backend.login_attempts(), 1);

    let status = f.supervisor.stop().await.unwrap();
    assert!(!status.running);
    assert_eq!(status.state, SupervisorState::Idle);
    assert!(starter.await.unwrap().is_ok());

    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(f.backend.login_attempts(), 1);
}

#[tokio::test]
async fn stop_clears_running_and_start_time() {
    let f = live_fixture().await;
    f.supervisor.start().await.unwrap();
    let session = f.backend.session().unwrap();

    let status = f.supervisor.stop().await.unwrap();
    assert!(!status.running);
    assert!(status.start_time.is_none());
    assert!(status.initialized);
    assert_eq!(status.state, SupervisorState::Idle);
    assert_eq!(session.disconnect_calls(), 1);

    // Restart after a clean stop logs in again.
    assert!(f.supervisor.start().await.unwrap().running);
    assert_eq!(f.backend.login_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_gives_up_on_stuck_worker_after_timeout() {
    let f = live_fixture().await;
    f.backend.ignore_cancellation();
    f.supervisor.start().await.unwrap();

    let started = tokio::time::Instant::now();
    let status = f.supervisor.stop().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(!status.running);
    assert_eq!(status.state, SupervisorState::Idle);
}

#[tokio::test]
async fn listen_crash_clears_running_without_restart() {
    let f = live_fixture().await;
    f.supervisor.start().await.unwrap();
    let mut states = f.supervisor.subscribe();

    f.backend.session().unwrap().crash("socket reset");
    states
        .wait_for(|s| *s == SupervisorState::Failed)
        .await
        .unwrap();

    let status = f.supervisor.status().await;
    assert!(!status.running);
    assert!(status.last_error.unwrap().contains("socket reset"));
    assert_eq!(f.backend.login_attempts(), 1);
    assert!(
        f.sink
            .reports_at(ActivityLevel::Error)
            .iter()
            .any(|m| m.contains("crashed"))
    );
}

#[tokio::test]
async fn listen_panic_is_contained() {
    let f = live_fixture().await;
    f.supervisor.start().await.unwrap();
    let mut states = f.supervisor.subscribe();

    f.backend.session().unwrap().panic();
    states
        .wait_for(|s| *s == SupervisorState::Failed)
        .await
        .unwrap();
    let status = f.supervisor.status().await;
    assert!(!status.running);
    assert!(status.last_error.unwrap().contains("panicked"));
}

#[tokio::test]
async fn platform_hangup_returns_to_idle() {
    let f = live_fixture().await;
    f.supervisor.start().await.unwrap();
    let mut states = f.supervisor.subscribe();
    f.backend.session().unwrap().close();
    states
        .wait_for(|s| *s == SupervisorState::Idle)
        .await
        .unwrap();
    assert!(!f.supervisor.status().await.running);
}

#[tokio::test]
async fn listen_error_after_stop_is_not_a_crash() {
    let f = live_fixture().await;
    f.backend.error_on_cancellation();
    f.supervisor.start().await.unwrap();
    let ended = f.supervisor.subscribe_ended();

    let status = f.supervisor.stop().await.unwrap();
    assert_eq!(status.state, SupervisorState::Idle);
    assert!(status.last_error.is_none());
    assert!(f.sink.reports_at(ActivityLevel::Error).is_empty());
    assert!(ended.borrow().is_none());
}

#[tokio::test]
async fn unrequested_endings_are_published() {
    let f = live_fixture().await;
    f.supervisor.start().await.unwrap();
    let mut ended = f.supervisor.subscribe_ended();

    f.backend.session().unwrap().close();
    let end = *ended.wait_for(Option::is_some).await.unwrap();
    assert_eq!(end, Some(SessionEnd::Disconnected));

    f.supervisor.start().await.unwrap();
    assert!(ended.borrow_and_update().is_none());
    f.backend.session().unwrap().crash("socket reset");
    let end = *ended.wait_for(Option::is_some).await.unwrap();
    assert_eq!(end, Some(SessionEnd::Crashed));
}

#[tokio::test]
async fn stop_and_start_publish_no_ending() {
    let f = live_fixture().await;
    f.supervisor.start().await.unwrap();
    let mut ended = f.supervisor.subscribe_ended();

    f.supervisor.stop().await.unwrap();
    f.supervisor.start().await.unwrap();
    settle().await;

    assert!(ended.borrow_and_update().is_none());
    assert_eq!(f.supervisor.status().await.state, SupervisorState::Running);
}

#[tokio::test]
async fn reinitialize_stops_running_session() {
    let f = live_fixture().await;
    f.supervisor.start().await.unwrap();
    let old = f.backend.session().unwrap();

    f.supervisor.initialize(credentials()).await.unwrap();
    let status = f.supervisor.status().await;
    assert!(!status.running);
    assert!(status.initialized);
    assert_eq!(old.disconnect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn mock_mode_skips_login() {
    let supervisor = ConnectorSupervisor::new(
        ConnectorMode::Mock {
            heartbeat: Duration::from_secs(10),
        },
        settings(),
        Arc::new(EchoHandler::default()),
        Arc::new(RecordingSink::new()),
    );
    supervisor
        .initialize(ConnectorCredentials::default())
        .await
        .unwrap();
    let status = supervisor.start().await.unwrap();
    assert!(status.running);
    assert_eq!(status.mode, "mock");

    tokio::time::sleep(Duration::from_secs(25)).await;
    let status = supervisor.stop().await.unwrap();
    assert!(!status.running);
}
