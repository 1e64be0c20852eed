// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fire-and-forget activity reporting.

use serde_json::Value;

use crate::types::{ActivityCounts, ActivityLevel};

/// Receives lifecycle events and counters for an external dashboard.
///
/// Methods are synchronous and must not block: implementations that do I/O
/// spawn it and swallow the outcome.
pub trait ActivitySink: Send + Sync + 'static {
    fn report(&self, level: ActivityLevel, message: &str, details: Option<Value>);

    fn report_activity(&self, counts: ActivityCounts);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActivitySink;

impl ActivitySink for NoopActivitySink {
    fn report(&self, _level: ActivityLevel, _message: &str, _details: Option<Value>) {}

    fn report_activity(&self, _counts: ActivityCounts) {}
}
