// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::{ConnectorModeSetting, KestrelConfig};

/// Validate a deserialized configuration.
///
/// Collects every problem instead of stopping at the first one.
pub fn validate_config(config: &KestrelConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let throttle = &config.throttle;
    if !(0.0..=1.0).contains(&throttle.sweep_probability) {
        fail(format!(
            "throttle.sweep_probability must be between 0 and 1, got {}",
            throttle.sweep_probability
        ));
    }
    if throttle.message_threshold == 0 {
        fail("throttle.message_threshold must be at least 1".to_string());
    }
    if throttle.window_secs == 0 {
        fail("throttle.window_secs must be at least 1".to_string());
    }
    if throttle.web_history_max == 0 || throttle.chat_history_max == 0 {
        fail("throttle history caps must be at least 1".to_string());
    }
    if throttle.max_cached_conversations == 0 {
        fail("throttle.max_cached_conversations must be at least 1".to_string());
    }
    if throttle.text_cap == 0 {
        fail("throttle.text_cap must be at least 1".to_string());
    }

    let generation = &config.generation;
    if generation.max_retries == 0 {
        fail("generation.max_retries must be at least 1".to_string());
    }
    if generation.model.trim().is_empty() {
        fail("generation.model must not be empty".to_string());
    }
    if generation.reply_timeout_secs == 0 {
        fail("generation.reply_timeout_secs must be at least 1".to_string());
    }
    let usable_keys = generation
        .api_keys
        .iter()
        .filter(|k| !k.trim().is_empty())
        .count();
    if config.connector.mode == ConnectorModeSetting::Console && usable_keys == 0 {
        fail("generation.api_keys must contain at least one key in console mode".to_string());
    }

    if config.connector.max_login_retries == 0 {
        fail("connector.max_login_retries must be at least 1".to_string());
    }

    if config.replies.fallback_responses.is_empty() {
        fail("replies.fallback_responses must not be empty".to_string());
    }

    if let Some(endpoint) = &config.activity.endpoint {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            fail(format!(
                "activity.endpoint `{endpoint}` must start with http:// or https://"
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
