// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation cooldown and bounded history cache.
//!
//! [`ConversationThrottle`] answers two questions for the reply pipeline:
//! whether a conversation is sending too fast, and what was said recently.
//! History goes to a durable [`HistoryStore`] when one is reachable and to a
//! size-bounded in-memory map otherwise. Storage failures never reach callers.

pub mod cooldown;
pub mod fallback;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use kestrel_config::model::ThrottleConfig;
use kestrel_core::{ChannelKind, ConversationId, Exchange, HistoryStore, KestrelError};

pub use cooldown::CooldownTracker;
pub use fallback::FallbackHistory;

/// Tunables for [`ConversationThrottle`].
#[derive(Debug, Clone)]
pub struct ThrottleSettings {
    pub message_threshold: u32,
    pub window: Duration,
    pub idle_evict: Duration,
    pub max_cached_conversations: usize,
    pub sweep_probability: f64,
    pub text_cap: usize,
    pub web_history_max: usize,
    pub chat_history_max: usize,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self::from(&ThrottleConfig::default())
    }
}

impl From<&ThrottleConfig> for ThrottleSettings {
    fn from(config: &ThrottleConfig) -> Self {
        Self {
            message_threshold: config.message_threshold,
            window: Duration::from_secs(config.window_secs),
            idle_evict: Duration::from_secs(config.idle_evict_secs),
            max_cached_conversations: config.max_cached_conversations,
            sweep_probability: config.sweep_probability,
            text_cap: config.text_cap,
            web_history_max: config.web_history_max,
            chat_history_max: config.chat_history_max,
        }
    }
}

impl ThrottleSettings {
    /// Maximum exchanges kept for a channel kind.
    pub fn history_max(&self, channel: ChannelKind) -> usize {
        match channel {
            ChannelKind::Web => self.web_history_max,
            ChannelKind::Chat => self.chat_history_max,
        }
    }
}

type HistoryKey = (ChannelKind, ConversationId);

/// Cooldown tracker plus two-tier conversation history.
pub struct ConversationThrottle {
    settings: ThrottleSettings,
    cooldowns: CooldownTracker,
    store: Option<Arc<dyn HistoryStore>>,
    fallback: Mutex<HashMap<ChannelKind, FallbackHistory>>,
    /// Serializes read-modify-write appends per conversation.
    append_locks: Mutex<HashMap<HistoryKey, Arc<Mutex<()>>>>,
}

impl ConversationThrottle {
    /// `store = None` keeps history in memory only.
    pub fn new(settings: ThrottleSettings, store: Option<Arc<dyn HistoryStore>>) -> Self {
        Self {
            cooldowns: CooldownTracker::new(settings.message_threshold, settings.window),
            settings,
            store,
            fallback: Mutex::new(HashMap::new()),
            append_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &ThrottleSettings {
        &self.settings
    }

    pub async fn check_cooldown(&self, id: &ConversationId) -> bool {
        self.cooldowns.check(id).await
    }

    /// Counts one inbound message. Call for every message, in cooldown or not.
    pub async fn record_message(&self, id: &ConversationId) {
        self.cooldowns.record(id).await;
    }

    /// Recent exchanges, oldest first.
    pub async fn get_context(&self, channel: ChannelKind, id: &ConversationId) -> Vec<Exchange> {
        if let Some(store) = &self.store {
            match store.get(channel, id).await {
                Ok(Some(history)) => return history,
                Ok(None) => {}
                Err(e) => log_storage_failure("read", channel, id, &e),
            }
        }
        self.fallback_get(channel, id).await
    }

    /// Appends one exchange, keeping only the most recent entries for the channel.
    pub async fn append_exchange(
        &self,
        channel: ChannelKind,
        id: &ConversationId,
        user: &str,
        ai: &str,
    ) {
        let exchange = Exchange::truncated(user, ai, self.settings.text_cap);
        let max = self.settings.history_max(channel);
        let lock = self.append_lock(channel, id).await;
        let _guard = lock.lock().await;

        if let Some(store) = &self.store {
            match self.append_durable(store.as_ref(), channel, id, &exchange, max).await {
                Ok(()) => return,
                Err(e) => log_storage_failure("write", channel, id, &e),
            }
        }

        let mut fallback = self.fallback.lock().await;
        let history = fallback.entry(channel).or_default();
        let mut exchanges = history.get(id).cloned().unwrap_or_default();
        push_bounded(&mut exchanges, exchange, max);
        history.put(id, exchanges);
    }

    /// Forgets a conversation in both tiers.
    pub async fn clear(&self, channel: ChannelKind, id: &ConversationId) {
        if let Some(store) = &self.store {
            if let Err(e) = store.delete(channel, id).await {
                log_storage_failure("delete", channel, id, &e);
            }
        }
        if let Some(history) = self.fallback.lock().await.get_mut(&channel) {
            history.remove(id);
        }
        info!(channel = %channel, conversation = %id, "conversation history cleared");
    }

    /// Runs [`sweep`](Self::sweep) with the configured probability.
    pub async fn maybe_sweep(&self) -> bool {
        if rand::random::<f64>() < self.settings.sweep_probability {
            self.sweep().await;
            true
        } else {
            false
        }
    }

    /// Drops idle cooldown entries and trims oversized fallback maps.
    pub async fn sweep(&self) {
        let idle = self.cooldowns.evict_idle(self.settings.idle_evict).await;

        let mut trimmed = 0;
        for history in self.fallback.lock().await.values_mut() {
            trimmed += history.trim_to(self.settings.max_cached_conversations);
        }

        self.append_locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);

        debug!(idle_cooldowns = idle, trimmed_conversations = trimmed, "cache sweep");
    }

    /// Conversations currently held in the fallback map for `channel`.
    pub async fn fallback_len(&self, channel: ChannelKind) -> usize {
        self.fallback
            .lock()
            .await
            .get(&channel)
            .map_or(0, FallbackHistory::len)
    }

    pub async fn tracked_cooldowns(&self) -> usize {
        self.cooldowns.len().await
    }

    async fn append_durable(
        &self,
        store: &dyn HistoryStore,
        channel: ChannelKind,
        id: &ConversationId,
        exchange: &Exchange,
        max: usize,
    ) -> Result<(), KestrelError> {
        let mut exchanges = store.get(channel, id).await?.unwrap_or_default();
        push_bounded(&mut exchanges, exchange.clone(), max);
        store.upsert(channel, id, &exchanges).await
    }

    async fn fallback_get(&self, channel: ChannelKind, id: &ConversationId) -> Vec<Exchange> {
        self.fallback
            .lock()
            .await
            .get(&channel)
            .and_then(|h| h.get(id).cloned())
            .unwrap_or_default()
    }

    async fn append_lock(&self, channel: ChannelKind, id: &ConversationId) -> Arc<Mutex<()>> {
        let mut locks = self.append_locks.lock().await;
        Arc::clone(locks.entry((channel, id.clone())).or_default())
    }
}

fn push_bounded(exchanges: &mut Vec<Exchange>, exchange: Exchange, max: usize) {
    exchanges.push(exchange);
    if exchanges.len() > max {
        let excess = exchanges.len() - max;
        exchanges.drain(..excess);
    }
}

fn log_storage_failure(op: &str, channel: ChannelKind, id: &ConversationId, err: &KestrelError) {
    warn!(
        op,
        channel = %channel,
        conversation = %id,
        error = %err,
        "history store unavailable, using in-memory fallback"
    );
}
