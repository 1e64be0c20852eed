// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Kestrel chat agent.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::Display;

/// Top-level Kestrel configuration.
///
/// Every section is optional and defaults to the values documented on its fields.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KestrelConfig {
    #[serde(default)]
    pub agent: AgentConfig,

    /// Chat platform connector and supervisor settings.
    #[serde(default)]
    pub connector: ConnectorConfig,

    /// Generation provider and credential pool settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Per-conversation cooldown and history cache settings.
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Stock replies used instead of generated text.
    #[serde(default)]
    pub replies: RepliesConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// External dashboard reporting.
    #[serde(default)]
    pub activity: ActivityConfig,
}

/// Agent identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "kestrel".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which connector backend the supervisor drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Deserialize, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectorModeSetting {
    /// Heartbeat-only worker, no platform login.
    #[default]
    Mock,
    /// Local stdin/stdout connector.
    Console,
}

/// Chat platform connector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectorConfig {
    #[serde(default)]
    pub mode: ConnectorModeSetting,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub secret_key: Option<String>,

    /// Device identifier (IMEI) presented at login.
    #[serde(default)]
    pub device_id: Option<String>,

    /// Saved session cookies. Fullwidth characters are normalised before login.
    #[serde(default)]
    pub session_cookies: BTreeMap<String, String>,

    #[serde(default = "default_max_login_retries")]
    pub max_login_retries: u32,

    #[serde(default = "default_login_retry_delay_secs")]
    pub login_retry_delay_secs: u64,

    /// How long `stop` waits for the listen worker before giving up on it.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    /// Mock mode heartbeat period.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Start the connector as soon as `serve` comes up.
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            mode: ConnectorModeSetting::default(),
            api_key: None,
            secret_key: None,
            device_id: None,
            session_cookies: BTreeMap::new(),
            max_login_retries: default_max_login_retries(),
            login_retry_delay_secs: default_login_retry_delay_secs(),
            stop_timeout_secs: default_stop_timeout_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            auto_start: true,
        }
    }
}

fn default_max_login_retries() -> u32 {
    3
}

fn default_login_retry_delay_secs() -> u64 {
    5
}

fn default_stop_timeout_secs() -> u64 {
    10
}

fn default_heartbeat_interval_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Generation provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Interchangeable API keys, rotated round-robin.
    #[serde(default)]
    pub api_keys: Vec<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Persona instruction sent with every request.
    #[serde(default = "default_system_preamble")]
    pub system_preamble: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// How long a rate-limited key is skipped.
    #[serde(default = "default_key_cooldown_secs")]
    pub key_cooldown_secs: u64,

    /// Pause after a rate-limited attempt when more attempts remain.
    #[serde(default = "default_rate_limit_pause_ms")]
    pub rate_limit_pause_ms: u64,

    /// Minimum spacing between connector re-logins.
    #[serde(default = "default_relogin_cooldown_secs")]
    pub relogin_cooldown_secs: u64,

    /// Prompt substrings that make a rate limit also trigger a re-login.
    #[serde(default = "default_relogin_keywords")]
    pub relogin_keywords: Vec<String>,

    /// Hard cap on one reply generation, including all retries.
    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: default_model(),
            system_preamble: default_system_preamble(),
            max_retries: default_max_retries(),
            key_cooldown_secs: default_key_cooldown_secs(),
            rate_limit_pause_ms: default_rate_limit_pause_ms(),
            relogin_cooldown_secs: default_relogin_cooldown_secs(),
            relogin_keywords: default_relogin_keywords(),
            reply_timeout_secs: default_reply_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            base_url: default_base_url(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_system_preamble() -> String {
    "You are a playful assistant in a group chat. Keep replies short and casual, \
     joke around a little, but still answer the question."
        .to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_key_cooldown_secs() -> u64 {
    60
}

fn default_rate_limit_pause_ms() -> u64 {
    1000
}

fn default_relogin_cooldown_secs() -> u64 {
    300
}

fn default_relogin_keywords() -> Vec<String> {
    vec!["zalo".to_string(), "duybeo".to_string()]
}

fn default_reply_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

/// Cooldown and bounded history configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Messages within `window_secs` that put a conversation in cooldown.
    #[serde(default = "default_message_threshold")]
    pub message_threshold: u32,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Cooldown entries idle this long are dropped by a sweep.
    #[serde(default = "default_idle_evict_secs")]
    pub idle_evict_secs: u64,

    /// Fallback history ceiling per channel kind.
    #[serde(default = "default_max_cached_conversations")]
    pub max_cached_conversations: usize,

    /// Chance that a request triggers a sweep.
    #[serde(default = "default_sweep_probability")]
    pub sweep_probability: f64,

    /// Maximum characters kept per side of an exchange.
    #[serde(default = "default_text_cap")]
    pub text_cap: usize,

    #[serde(default = "default_web_history_max")]
    pub web_history_max: usize,

    #[serde(default = "default_chat_history_max")]
    pub chat_history_max: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            message_threshold: default_message_threshold(),
            window_secs: default_window_secs(),
            idle_evict_secs: default_idle_evict_secs(),
            max_cached_conversations: default_max_cached_conversations(),
            sweep_probability: default_sweep_probability(),
            text_cap: default_text_cap(),
            web_history_max: default_web_history_max(),
            chat_history_max: default_chat_history_max(),
        }
    }
}

fn default_message_threshold() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_idle_evict_secs() -> u64 {
    300
}

fn default_max_cached_conversations() -> usize {
    100
}

fn default_sweep_probability() -> f64 {
    0.1
}

fn default_text_cap() -> usize {
    200
}

fn default_web_history_max() -> usize {
    1
}

fn default_chat_history_max() -> usize {
    2
}

/// Stock replies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RepliesConfig {
    /// Sent while a conversation is in cooldown.
    #[serde(default = "default_cooldown_message")]
    pub cooldown_message: String,

    /// One is picked at random when generation fails or times out.
    #[serde(default = "default_fallback_responses")]
    pub fallback_responses: Vec<String>,

    /// Exact-match answers for the web channel, keyed by lowercased question.
    #[serde(default = "default_web_answers")]
    pub web_answers: BTreeMap<String, String>,
}

impl Default for RepliesConfig {
    fn default() -> Self {
        Self {
            cooldown_message: default_cooldown_message(),
            fallback_responses: default_fallback_responses(),
            web_answers: default_web_answers(),
        }
    }
}

fn default_cooldown_message() -> String {
    "sorry, my brain is rebooting right now, give me a few minutes".to_string()
}

fn default_fallback_responses() -> Vec<String> {
    vec![
        "sorry, I dropped the connection for a moment".to_string(),
        "hang on, I'm being upgraded right now".to_string(),
        "bear with me, I'm getting an oil change".to_string(),
        "sorry, I'm out having fun right now".to_string(),
    ]
}

fn default_web_answers() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "what is this site for".to_string(),
            "this site is for managing and watching the bot".to_string(),
        ),
        (
            "who runs this site".to_string(),
            "the bot's owner runs it".to_string(),
        ),
    ])
}

/// Durable history storage.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database file. Unset keeps history in memory only.
    #[serde(default)]
    pub database_path: Option<String>,
}

/// Activity reporting to an external dashboard.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityConfig {
    /// Dashboard base URL. Unset disables reporting.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_activity_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_activity_timeout_ms(),
        }
    }
}

fn default_activity_timeout_ms() -> u64 {
    2000
}
