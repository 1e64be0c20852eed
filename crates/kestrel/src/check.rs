// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `kestrel check`: print what the validated configuration will do.

use serde::Serialize;

use kestrel_config::KestrelConfig;
use kestrel_core::{Credential, KestrelError};

/// Structured summary for `--json` mode. Secrets appear only as previews.
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub agent: String,
    pub connector_mode: String,
    pub auto_start: bool,
    pub model: String,
    pub generation_keys: Vec<String>,
    pub storage: String,
    pub activity_endpoint: Option<String>,
}

impl CheckReport {
    pub fn from_config(config: &KestrelConfig) -> Self {
        Self {
            agent: config.agent.name.clone(),
            connector_mode: config.connector.mode.to_string(),
            auto_start: config.connector.auto_start,
            model: config.generation.model.clone(),
            generation_keys: config
                .generation
                .api_keys
                .iter()
                .enumerate()
                .map(|(i, key)| Credential::new(i, key.as_str()).preview())
                .collect(),
            storage: config
                .storage
                .database_path
                .clone()
                .unwrap_or_else(|| "memory only".to_string()),
            activity_endpoint: config.activity.endpoint.clone(),
        }
    }
}

pub fn run_check(config: &KestrelConfig, json: bool) -> Result<(), KestrelError> {
    let report = CheckReport::from_config(config);
    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| KestrelError::Internal(format!("failed to serialize report: {e}")))?;
        println!("{out}");
        return Ok(());
    }

    println!("kestrel: configuration OK");
    println!("  agent:      {}", report.agent);
    println!(
        "  connector:  {} (auto start: {})",
        report.connector_mode, report.auto_start
    );
    println!("  model:      {}", report.model);
    if report.generation_keys.is_empty() {
        println!("  keys:       none (replies will use fallbacks)");
    } else {
        println!("  keys:       {}", report.generation_keys.join(", "));
    }
    println!("  storage:    {}", report.storage);
    if let Some(endpoint) = &report.activity_endpoint {
        println!("  activity:   {endpoint}");
    }
    Ok(())
}
