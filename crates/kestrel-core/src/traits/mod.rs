// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits at the seams between Kestrel and its external collaborators.
//!
//! All traits use `#[async_trait]` so implementations can be held as
//! `Arc<dyn Trait>`.

pub mod activity;
pub mod connector;
pub mod generation;
pub mod history;

pub use activity::ActivitySink;
pub use connector::{ConnectorBackend, ConnectorSession, MessageHandler};
pub use generation::{GenerationClient, GenerationClientFactory, ReloginHook};
pub use history::HistoryStore;
