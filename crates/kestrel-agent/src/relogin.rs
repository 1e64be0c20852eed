// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Re-login hook that restarts the connector session.
//!
//! The supervisor owns the reply pipeline, and the pipeline owns the
//! dispatcher that fires this hook, so the hook is built unbound and
//! pointed at the supervisor once it exists.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use tracing::{debug, info};

use kestrel_connector::ConnectorSupervisor;
use kestrel_core::{KestrelError, ReloginHook};

#[derive(Default)]
pub struct SupervisorRelogin {
    supervisor: OnceLock<Weak<ConnectorSupervisor>>,
}

impl SupervisorRelogin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points the hook at `supervisor`. Only the first bind takes effect.
    pub fn bind(&self, supervisor: &Arc<ConnectorSupervisor>) -> bool {
        self.supervisor.set(Arc::downgrade(supervisor)).is_ok()
    }
}

#[async_trait]
impl ReloginHook for SupervisorRelogin {
    async fn relogin(&self) -> Result<(), KestrelError> {
        let Some(supervisor) = self.supervisor.get().and_then(Weak::upgrade) else {
            debug!("re-login requested but no supervisor is bound");
            return Ok(());
        };

        let status = supervisor.status().await;
        if !status.initialized || !status.running {
            debug!(state = %status.state, "re-login skipped, connector not running");
            return Ok(());
        }

        info!("restarting connector session");
        supervisor.stop().await?;
        supervisor.start().await?;
        Ok(())
    }
}
