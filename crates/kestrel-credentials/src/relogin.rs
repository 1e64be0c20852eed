// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate-limited, fire-and-forget connector re-login.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use kestrel_core::ReloginHook;

/// Progress of the most recent re-login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloginStatus {
    Idle,
    InFlight,
    Succeeded,
    Failed(String),
}

/// Allows at most one re-login per cooldown window.
pub struct ReloginGuard {
    hook: Arc<dyn ReloginHook>,
    cooldown: Duration,
    last_attempt: Mutex<Option<Instant>>,
    status: watch::Sender<ReloginStatus>,
    tasks: TaskTracker,
}

impl ReloginGuard {
    pub fn new(hook: Arc<dyn ReloginHook>, cooldown: Duration) -> Self {
        let (status, _) = watch::channel(ReloginStatus::Idle);
        Self {
            hook,
            cooldown,
            last_attempt: Mutex::new(None),
            status,
            tasks: TaskTracker::new(),
        }
    }

    /// Spawns a re-login unless one ran within the cooldown.
    ///
    /// Returns whether a re-login was started. Never waits for it.
    pub async fn trigger(&self) -> bool {
        {
            let mut last = self.last_attempt.lock().await;
            let now = Instant::now();
            if let Some(prev) = *last {
                if now.duration_since(prev) < self.cooldown {
                    info!(
                        since_secs = now.duration_since(prev).as_secs(),
                        "re-login skipped, still in cooldown"
                    );
                    return false;
                }
            }
            *last = Some(now);
        }

        info!("rate limit on connector traffic, triggering re-login");
        self.status.send_replace(ReloginStatus::InFlight);
        let hook = Arc::clone(&self.hook);
        let status = self.status.clone();
        self.tasks.spawn(async move {
            match hook.relogin().await {
                Ok(()) => {
                    info!("re-login completed");
                    status.send_replace(ReloginStatus::Succeeded);
                }
                Err(e) => {
                    error!(error = %e, "re-login failed");
                    status.send_replace(ReloginStatus::Failed(e.to_string()));
                }
            }
        });
        true
    }

    pub fn subscribe(&self) -> watch::Receiver<ReloginStatus> {
        self.status.subscribe()
    }

    /// Waits for any in-flight re-login to finish.
    pub async fn shutdown(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}
