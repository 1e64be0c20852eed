// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fire-and-forget activity reporting to a dashboard backend.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use kestrel_config::model::ActivityConfig;
use kestrel_core::{ActivityCounts, ActivityLevel, ActivitySink, KestrelError, NoopActivitySink};

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    level: &'a str,
    message: &'a str,
    details: Value,
}

/// Posts log lines to `/api/logs` and counters to `/api/bot/activity`.
///
/// Each report is sent on its own task. Failures are dropped.
#[derive(Debug, Clone)]
pub struct HttpActivitySink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpActivitySink {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, KestrelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KestrelError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn post<T: Serialize>(&self, path: &'static str, body: &T) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let body = match serde_json::to_value(body) {
            Ok(body) => body,
            Err(_) => return,
        };
        let request = self
            .client
            .post(format!("{}{path}", self.endpoint))
            .json(&body);
        handle.spawn(async move {
            if let Err(e) = request.send().await {
                debug!(path, error = %e, "activity report dropped");
            }
        });
    }
}

impl ActivitySink for HttpActivitySink {
    fn report(&self, level: ActivityLevel, message: &str, details: Option<Value>) {
        let level = level.to_string().to_uppercase();
        self.post(
            "/api/logs",
            &LogEntry {
                level: &level,
                message,
                details: details.unwrap_or_else(|| Value::Object(Default::default())),
            },
        );
    }

    fn report_activity(&self, counts: ActivityCounts) {
        self.post("/api/bot/activity", &counts);
    }
}

/// Picks the HTTP sink when an endpoint is configured.
pub fn sink_from_config(config: &ActivityConfig) -> Result<Arc<dyn ActivitySink>, KestrelError> {
    match &config.endpoint {
        Some(endpoint) => Ok(Arc::new(HttpActivitySink::new(
            endpoint,
            Duration::from_millis(config.timeout_ms),
        )?)),
        None => Ok(Arc::new(NoopActivitySink)),
    }
}
