// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message-count cooldown per conversation.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use kestrel_core::ConversationId;

#[derive(Debug, Clone, Copy)]
struct CooldownState {
    last_message: Instant,
    count: u32,
}

/// Puts a conversation in cooldown once `threshold` messages arrive, until
/// `window` has passed since the message that reached the threshold.
pub struct CooldownTracker {
    threshold: u32,
    window: Duration,
    states: Mutex<HashMap<ConversationId, CooldownState>>,
}

impl CooldownTracker {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the conversation is currently in cooldown.
    ///
    /// An expired cooldown resets the counter to zero.
    pub async fn check(&self, id: &ConversationId) -> bool {
        let mut states = self.states.lock().await;
        let Some(state) = states.get_mut(id) else {
            return false;
        };
        if state.count < self.threshold {
            return false;
        }
        if state.last_message.elapsed() < self.window {
            return true;
        }
        state.count = 0;
        false
    }

    /// Counts one inbound message.
    ///
    /// The timestamp tracks every message below the threshold and then stays
    /// on the one that reached it.
    pub async fn record(&self, id: &ConversationId) {
        let now = Instant::now();
        let mut states = self.states.lock().await;
        let state = states.entry(id.clone()).or_insert(CooldownState {
            last_message: now,
            count: 0,
        });
        state.count = state.count.saturating_add(1);
        if state.count <= self.threshold {
            state.last_message = now;
        }
    }

    /// Current message count, if the conversation is tracked.
    pub async fn count(&self, id: &ConversationId) -> Option<u32> {
        self.states.lock().await.get(id).map(|s| s.count)
    }

    /// Drops entries idle for longer than `idle`. Returns how many were removed.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let mut states = self.states.lock().await;
        let before = states.len();
        states.retain(|_, s| s.last_message.elapsed() <= idle);
        before - states.len()
    }

    pub async fn len(&self) -> usize {
        self.states.lock().await.len()
    }
}
