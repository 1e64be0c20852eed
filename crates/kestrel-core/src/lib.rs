// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Kestrel chat agent.
//!
//! Holds the error taxonomy, the shared value types, and the capability
//! traits through which the supervisor, dispatcher, and throttle talk to the
//! chat platform, the generation provider, and durable storage.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{KestrelError, looks_like_session_expiry, looks_rate_limited};
pub use types::{
    ActivityCounts, ActivityLevel, ChannelKind, ConnectorCredentials, ConversationId, Credential,
    Exchange, InboundMessage,
};

pub use traits::activity::NoopActivitySink;
pub use traits::{
    ActivitySink, ConnectorBackend, ConnectorSession, GenerationClient, GenerationClientFactory,
    HistoryStore, MessageHandler, ReloginHook,
};
