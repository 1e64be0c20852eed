// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `kestrel serve` command implementation.
//!
//! Wires storage, throttle, dispatcher, reply pipeline, and connector
//! supervisor together, then runs until a shutdown signal or until the
//! connector session ends.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::watch;
use tracing::{error, info, warn};

use kestrel_agent::{ReplyPipeline, ReplySettings, SupervisorRelogin, sink_from_config};
use kestrel_config::{ConnectorModeSetting, KestrelConfig};
use kestrel_connector::{ConnectorMode, ConnectorSupervisor, SessionEnd, SupervisorSettings};
use kestrel_core::{ConnectorCredentials, GenerationClientFactory, HistoryStore, KestrelError};
use kestrel_credentials::{DispatchSettings, GenerationDispatcher, ReloginGuard};
use kestrel_gemini::GeminiClientFactory;
use kestrel_storage::SqliteHistoryStore;
use kestrel_throttle::{ConversationThrottle, ThrottleSettings};

use crate::console::{ConsoleBackend, console_credentials};

/// Everything `serve` keeps alive.
pub struct Runtime {
    pub supervisor: Arc<ConnectorSupervisor>,
    pub dispatcher: Arc<GenerationDispatcher>,
    pub throttle: Arc<ConversationThrottle>,
}

pub async fn run_serve(config: KestrelConfig) -> Result<(), KestrelError> {
    init_tracing(&config.agent.log_level);

    info!(agent = %config.agent.name, "starting kestrel serve");

    let factory = Arc::new(GeminiClientFactory::from_config(&config.generation)?);
    let mode = connector_mode(&config);
    let runtime = build_runtime(&config, mode, factory).await?;

    if config.connector.auto_start {
        let status = runtime.supervisor.start().await?;
        info!(state = %status.state, mode = status.mode, "connector auto-started");
    } else {
        info!("connector auto start disabled, waiting for shutdown");
    }

    let cancel = kestrel_agent::install_signal_handler();
    let mut ended = runtime.supervisor.subscribe_ended();
    tokio::select! {
        _ = cancel.cancelled() => {}
        end = wait_for_exit(&mut ended) => {
            info!(reason = %end, "connector session ended, shutting down");
        }
    }
    cancel.cancel();

    shutdown(&runtime).await;
    info!("kestrel serve shutdown complete");
    Ok(())
}

/// Builds the component graph and installs connector credentials.
pub async fn build_runtime(
    config: &KestrelConfig,
    mode: ConnectorMode,
    factory: Arc<dyn GenerationClientFactory>,
) -> Result<Runtime, KestrelError> {
    let store = open_store(config).await;
    let throttle = Arc::new(ConversationThrottle::new(
        ThrottleSettings::from(&config.throttle),
        store,
    ));
    let sink = sink_from_config(&config.activity)?;

    let relogin = Arc::new(SupervisorRelogin::new());
    let dispatcher = Arc::new(
        GenerationDispatcher::new(
            &config.generation.api_keys,
            factory,
            DispatchSettings::from(&config.generation),
        )
        .with_relogin(ReloginGuard::new(
            relogin.clone(),
            Duration::from_secs(config.generation.relogin_cooldown_secs),
        )),
    );

    let pipeline = ReplyPipeline::new(
        Arc::clone(&throttle),
        Arc::clone(&dispatcher),
        ReplySettings::from_config(config),
        Arc::clone(&sink),
    );
    let supervisor = Arc::new(ConnectorSupervisor::new(
        mode,
        SupervisorSettings::from(&config.connector),
        Arc::new(pipeline),
        sink,
    ));
    relogin.bind(&supervisor);

    supervisor.initialize(connector_credentials(config)).await?;

    Ok(Runtime {
        supervisor,
        dispatcher,
        throttle,
    })
}

fn connector_mode(config: &KestrelConfig) -> ConnectorMode {
    match config.connector.mode {
        ConnectorModeSetting::Mock => ConnectorMode::Mock {
            heartbeat: Duration::from_secs(config.connector.heartbeat_interval_secs.max(1)),
        },
        ConnectorModeSetting::Console => ConnectorMode::Live(Arc::new(ConsoleBackend)),
    }
}

fn connector_credentials(config: &KestrelConfig) -> ConnectorCredentials {
    let connector = &config.connector;
    match connector.mode {
        ConnectorModeSetting::Console => console_credentials(connector),
        ConnectorModeSetting::Mock => ConnectorCredentials {
            api_key: connector.api_key.clone().map(SecretString::from),
            secret_key: connector.secret_key.clone().map(SecretString::from),
            device_id: connector.device_id.clone(),
            session_cookies: connector.session_cookies.clone(),
        },
    }
}

/// Opens the durable store, or runs memory-only if it is absent or broken.
async fn open_store(config: &KestrelConfig) -> Option<Arc<dyn HistoryStore>> {
    let path = config.storage.database_path.as_deref()?;
    match SqliteHistoryStore::open(path).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(path, error = %e, "history store unavailable, keeping history in memory");
            None
        }
    }
}

/// Resolves once the platform hangs up or the listen loop crashes.
///
/// Restarts through `stop` and `start`, such as a re-login, do not count.
async fn wait_for_exit(ended: &mut watch::Receiver<Option<SessionEnd>>) -> SessionEnd {
    let end = match ended.wait_for(Option::is_some).await {
        Ok(end) => *end,
        Err(_) => None,
    };
    match end {
        Some(end) => end,
        None => std::future::pending().await,
    }
}

async fn shutdown(runtime: &Runtime) {
    if let Err(e) = runtime.supervisor.stop().await {
        error!(error = %e, "connector stop failed");
    }
    if let Some(guard) = runtime.dispatcher.relogin() {
        guard.shutdown().await;
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kestrel={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
