// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Activity sink that records everything it receives.

use std::sync::Mutex;

use serde_json::Value;

use kestrel_core::{ActivityCounts, ActivityLevel, ActivitySink};

use crate::lock;

#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<(ActivityLevel, String, Option<Value>)>>,
    counts: Mutex<Vec<ActivityCounts>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.reports)
            .iter()
            .map(|(_, m, _)| m.clone())
            .collect()
    }

    pub fn reports_at(&self, level: ActivityLevel) -> Vec<String> {
        lock(&self.reports)
            .iter()
            .filter(|(l, _, _)| *l == level)
            .map(|(_, m, _)| m.clone())
            .collect()
    }

    /// Sum of every counter report.
    pub fn totals(&self) -> ActivityCounts {
        lock(&self.counts)
            .iter()
            .fold(ActivityCounts::default(), |acc, c| ActivityCounts {
                messages_sent: acc.messages_sent + c.messages_sent,
                messages_received: acc.messages_received + c.messages_received,
                commands_used: acc.commands_used + c.commands_used,
            })
    }
}

impl ActivitySink for RecordingSink {
    fn report(&self, level: ActivityLevel, message: &str, details: Option<Value>) {
        lock(&self.reports).push((level, message.to_string(), details));
    }

    fn report_activity(&self, counts: ActivityCounts) {
        lock(&self.counts).push(counts);
    }
}
