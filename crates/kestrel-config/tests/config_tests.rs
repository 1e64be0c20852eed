// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Kestrel configuration system.

use kestrel_config::diagnostic::ConfigError;
use kestrel_config::{ConnectorModeSetting, load_and_validate_str, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[agent]
name = "lab-bot"
log_level = "debug"

[connector]
mode = "console"
api_key = "platform-key"
secret_key = "platform-secret"
device_id = "imei-1"
max_login_retries = 4
login_retry_delay_secs = 2

[connector.session_cookies]
zpw_sek = "abc"

[generation]
api_keys = ["k1", "k2"]
model = "gemini-2.0-flash"
max_retries = 5
relogin_keywords = ["zalo", "duybeo"]

[throttle]
message_threshold = 15
window_secs = 30
chat_history_max = 4

[replies]
cooldown_message = "slow down"
fallback_responses = ["oops"]

[replies.web_answers]
"who are you" = "a bot"

[storage]
database_path = "/tmp/kestrel.db"

[activity]
endpoint = "http://localhost:8001"
timeout_ms = 500
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "lab-bot");
    assert_eq!(config.connector.mode, ConnectorModeSetting::Console);
    assert_eq!(config.connector.max_login_retries, 4);
    assert_eq!(config.connector.session_cookies["zpw_sek"], "abc");
    assert_eq!(config.generation.api_keys, vec!["k1", "k2"]);
    assert_eq!(config.generation.max_retries, 5);
    assert_eq!(config.generation.relogin_keywords.len(), 2);
    assert_eq!(config.throttle.message_threshold, 15);
    assert_eq!(config.throttle.web_history_max, 1);
    assert_eq!(config.throttle.chat_history_max, 4);
    assert_eq!(config.replies.fallback_responses, vec!["oops"]);
    assert_eq!(config.replies.web_answers["who are you"], "a bot");
    assert_eq!(config.storage.database_path.as_deref(), Some("/tmp/kestrel.db"));
    assert_eq!(config.activity.timeout_ms, 500);
}

#[test]
fn empty_toml_yields_documented_defaults() {
    let config = load_config_from_str("").expect("defaults");
    assert_eq!(config.agent.name, "kestrel");
    assert_eq!(config.connector.mode, ConnectorModeSetting::Mock);
    assert_eq!(config.connector.max_login_retries, 3);
    assert_eq!(config.connector.login_retry_delay_secs, 5);
    assert_eq!(config.connector.stop_timeout_secs, 10);
    assert_eq!(config.generation.model, "gemini-2.5-flash");
    assert_eq!(config.generation.key_cooldown_secs, 60);
    assert_eq!(config.generation.rate_limit_pause_ms, 1000);
    assert_eq!(config.generation.relogin_cooldown_secs, 300);
    assert_eq!(config.generation.relogin_keywords, vec!["zalo", "duybeo"]);
    assert_eq!(config.generation.reply_timeout_secs, 10);
    assert_eq!(config.throttle.message_threshold, 10);
    assert_eq!(config.throttle.window_secs, 60);
    assert_eq!(config.throttle.idle_evict_secs, 300);
    assert_eq!(config.throttle.max_cached_conversations, 100);
    assert_eq!(config.throttle.text_cap, 200);
    assert_eq!(config.replies.fallback_responses.len(), 4);
    assert!(config.storage.database_path.is_none());
    assert!(config.activity.endpoint.is_none());
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = "[generation]\nmax_retires = 2\n";
    let errors = load_and_validate_str(toml).expect_err("unknown key must be rejected");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } if key == "max_retires" => suggestion.clone(),
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("max_retries"));
}

#[test]
fn wrong_type_is_reported() {
    let toml = "[throttle]\nwindow_secs = \"sixty\"\n";
    let errors = load_and_validate_str(toml).expect_err("wrong type must be rejected");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { .. })),
        "got: {errors:?}"
    );
}

#[test]
fn unknown_connector_mode_is_rejected() {
    let toml = "[connector]\nmode = \"telepathy\"\n";
    assert!(load_and_validate_str(toml).is_err());
}

#[test]
fn validation_runs_after_parse() {
    let toml = "[throttle]\nsweep_probability = 2.0\n";
    let errors = load_and_validate_str(toml).expect_err("probability out of range");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("sweep_probability")))
    );
}
