// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the connector, dispatcher, and throttle crates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Opaque key that scopes rate-limit and history state to one chat thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Which surface a conversation arrives on.
///
/// Determines the history cap and whether a partial reply is pushed on timeout.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Dashboard chat popup.
    Web,
    /// The chat platform itself.
    Chat,
}

/// One completed user/assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub ai: String,
    pub timestamp: DateTime<Utc>,
}

impl Exchange {
    /// Builds an exchange stamped now, truncating both sides to `cap` characters.
    pub fn truncated(user: &str, ai: &str, cap: usize) -> Self {
        Self {
            user: truncate_chars(user, cap),
            ai: truncate_chars(ai, cap),
            timestamp: Utc::now(),
        }
    }
}

/// Truncates to at most `cap` Unicode scalar values.
pub fn truncate_chars(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

/// A message received by the listen loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub conversation: ConversationId,
    pub channel: ChannelKind,
    pub sender: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(
        conversation: impl Into<String>,
        channel: ChannelKind,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation: ConversationId(conversation.into()),
            channel,
            sender: sender.into(),
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// One API secret in the generation credential pool.
pub struct Credential {
    index: usize,
    secret: SecretString,
}

impl Credential {
    pub fn new(index: usize, secret: impl Into<String>) -> Self {
        Self {
            index,
            secret: SecretString::from(secret.into()),
        }
    }

    /// Position of this credential in its pool.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The raw secret, for building request URLs and headers only.
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    /// At most eight leading characters followed by `...`, safe to log.
    ///
    /// Short keys show less than half their length, so the full value never
    /// appears.
    pub fn preview(&self) -> String {
        let secret = self.secret.expose_secret();
        let shown = (secret.chars().count() / 2).min(8);
        let head: String = secret.chars().take(shown).collect();
        format!("{head}...")
    }
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            secret: copy_secret(&self.secret),
        }
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_string())
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("index", &self.index)
            .field("preview", &self.preview())
            .finish()
    }
}

/// Login material for the chat platform.
#[derive(Default)]
pub struct ConnectorCredentials {
    pub api_key: Option<SecretString>,
    pub secret_key: Option<SecretString>,
    pub device_id: Option<String>,
    pub session_cookies: BTreeMap<String, String>,
}

impl Clone for ConnectorCredentials {
    fn clone(&self) -> Self {
        Self {
            api_key: self.api_key.as_ref().map(copy_secret),
            secret_key: self.secret_key.as_ref().map(copy_secret),
            device_id: self.device_id.clone(),
            session_cookies: self.session_cookies.clone(),
        }
    }
}

impl ConnectorCredentials {
    /// Names of the required fields that are missing or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let blank = |v: Option<&str>| v.is_none_or(|s| s.trim().is_empty());
        let mut missing = Vec::new();
        if blank(self.api_key.as_ref().map(|s| s.expose_secret())) {
            missing.push("api_key");
        }
        if blank(self.secret_key.as_ref().map(|s| s.expose_secret())) {
            missing.push("secret_key");
        }
        if blank(self.device_id.as_deref()) {
            missing.push("device_id");
        }
        missing
    }
}

impl fmt::Debug for ConnectorCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("device_id", &self.device_id)
            .field("session_cookies", &self.session_cookies.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Severity attached to activity reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Info,
    Warning,
    Error,
}

/// Counter deltas pushed to the activity sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCounts {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub commands_used: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let text = "xin chào ".repeat(40);
        let cut = truncate_chars(&text, 200);
        assert_eq!(cut.chars().count(), 200);
        assert_eq!(truncate_chars("short", 200), "short");
    }

    #[test]
    fn credential_preview_masks_secret() {
        let cred = Credential::new(0, "AIzaSyABCDEFGHIJKLMNOP");
        assert_eq!(cred.preview(), "AIzaSyAB...");
        let debug = format!("{cred:?}");
        assert!(!debug.contains("CDEFGHIJ"));
    }

    #[test]
    fn short_credential_preview_never_shows_whole_key() {
        assert_eq!(Credential::new(0, "abcd1234").preview(), "abcd...");
        assert_eq!(Credential::new(0, "k1").preview(), "k...");
        assert_eq!(Credential::new(0, "x").preview(), "...");
    }

    #[test]
    fn channel_kind_parses_lowercase() {
        assert_eq!(ChannelKind::from_str("web").unwrap(), ChannelKind::Web);
        assert_eq!(ChannelKind::Chat.to_string(), "chat");
    }

    #[test]
    fn missing_connector_fields_are_reported() {
        let creds = ConnectorCredentials {
            api_key: Some(SecretString::from("key".to_string())),
            secret_key: Some(SecretString::from("  ".to_string())),
            device_id: None,
            session_cookies: BTreeMap::new(),
        };
        assert_eq!(creds.missing_fields(), vec!["secret_key", "device_id"]);
    }
}
