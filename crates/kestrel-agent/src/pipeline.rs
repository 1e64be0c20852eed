// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns one inbound message into one reply.
//!
//! The pipeline never returns an error to the conversation: cooldowns,
//! provider failures, and timeouts all end in stock text.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use kestrel_config::model::KestrelConfig;
use kestrel_core::{
    ActivityCounts, ActivityLevel, ActivitySink, ChannelKind, ConnectorSession, Exchange,
    InboundMessage, MessageHandler,
};
use kestrel_credentials::GenerationDispatcher;
use kestrel_throttle::ConversationThrottle;

/// Used only if the configured fallback list is somehow empty.
const LAST_RESORT_REPLY: &str = "sorry, I can't answer right now";

/// What the pipeline decided to say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    Generated(String),
    Canned(String),
    Cooldown(String),
    /// Stock reply after a provider error or timeout. `delivered` means it
    /// was already pushed to the conversation.
    Fallback { text: String, delivered: bool },
}

impl ReplyOutcome {
    pub fn text(&self) -> &str {
        match self {
            ReplyOutcome::Generated(text)
            | ReplyOutcome::Canned(text)
            | ReplyOutcome::Cooldown(text)
            | ReplyOutcome::Fallback { text, .. } => text,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, ReplyOutcome::Fallback { delivered: true, .. })
    }
}

/// Reply texts and the generation deadline.
#[derive(Debug, Clone)]
pub struct ReplySettings {
    pub reply_timeout: Duration,
    pub cooldown_message: String,
    pub fallback_responses: Vec<String>,
    /// Keyed by trimmed, lowercased question.
    pub web_answers: HashMap<String, String>,
}

impl ReplySettings {
    pub fn from_config(config: &KestrelConfig) -> Self {
        Self {
            reply_timeout: Duration::from_secs(config.generation.reply_timeout_secs),
            cooldown_message: config.replies.cooldown_message.clone(),
            fallback_responses: config.replies.fallback_responses.clone(),
            web_answers: config
                .replies
                .web_answers
                .iter()
                .map(|(q, a)| (normalize_question(q), a.clone()))
                .collect(),
        }
    }
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self::from_config(&KestrelConfig::default())
    }
}

fn normalize_question(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Builds the provider prompt from earlier exchanges plus the new message.
pub fn build_prompt(history: &[Exchange], text: &str) -> String {
    let mut prompt = String::new();
    for exchange in history {
        let _ = writeln!(prompt, "User: {}", exchange.user);
        let _ = writeln!(prompt, "Assistant: {}", exchange.ai);
    }
    prompt.push_str("User: ");
    prompt.push_str(text);
    prompt
}

/// Cooldown, canned answers, generation with a deadline, and history.
pub struct ReplyPipeline {
    throttle: Arc<ConversationThrottle>,
    dispatcher: Arc<GenerationDispatcher>,
    settings: ReplySettings,
    sink: Arc<dyn ActivitySink>,
}

impl ReplyPipeline {
    pub fn new(
        throttle: Arc<ConversationThrottle>,
        dispatcher: Arc<GenerationDispatcher>,
        settings: ReplySettings,
        sink: Arc<dyn ActivitySink>,
    ) -> Self {
        Self {
            throttle,
            dispatcher,
            settings,
            sink,
        }
    }

    /// Computes the reply for `message`.
    ///
    /// With a `session`, a timed-out generation on a non-web channel pushes
    /// the fallback through it right away and reports it as delivered.
    pub async fn reply(
        &self,
        message: &InboundMessage,
        session: Option<&dyn ConnectorSession>,
    ) -> ReplyOutcome {
        self.throttle.maybe_sweep().await;

        let id = &message.conversation;
        let in_cooldown = self.throttle.check_cooldown(id).await;
        self.throttle.record_message(id).await;
        if in_cooldown {
            info!(conversation = %id, "conversation in cooldown");
            return ReplyOutcome::Cooldown(self.settings.cooldown_message.clone());
        }

        if message.channel == ChannelKind::Web {
            if let Some(answer) = self
                .settings
                .web_answers
                .get(&normalize_question(&message.text))
            {
                debug!(conversation = %id, "canned web answer");
                return ReplyOutcome::Canned(answer.clone());
            }
        }

        let history = self.throttle.get_context(message.channel, id).await;
        let prompt = build_prompt(&history, &message.text);

        let generation = self.dispatcher.generate(&prompt);
        match tokio::time::timeout(self.settings.reply_timeout, generation).await {
            Ok(Ok(text)) => {
                self.throttle
                    .append_exchange(message.channel, id, &message.text, &text)
                    .await;
                ReplyOutcome::Generated(text)
            }
            Ok(Err(e)) => {
                warn!(conversation = %id, error = %e, "generation failed, using fallback");
                self.sink.report(
                    ActivityLevel::Warning,
                    "generation failed",
                    Some(serde_json::json!({
                        "conversation": id.as_str(),
                        "error": e.to_string(),
                    })),
                );
                ReplyOutcome::Fallback {
                    text: self.pick_fallback(),
                    delivered: false,
                }
            }
            Err(_) => {
                let text = self.pick_fallback();
                warn!(
                    conversation = %id,
                    timeout_secs = self.settings.reply_timeout.as_secs(),
                    "generation timed out, using fallback"
                );
                let delivered = match session {
                    Some(session) if message.channel != ChannelKind::Web => {
                        self.send_partial(session, message, &text).await;
                        true
                    }
                    _ => false,
                };
                ReplyOutcome::Fallback { text, delivered }
            }
        }
    }

    async fn send_partial(
        &self,
        session: &dyn ConnectorSession,
        message: &InboundMessage,
        text: &str,
    ) {
        match session.send(&message.conversation, text).await {
            Ok(()) => self.count_sent(),
            Err(e) => warn!(
                conversation = %message.conversation,
                error = %e,
                "partial fallback send failed"
            ),
        }
    }

    fn pick_fallback(&self) -> String {
        self.settings
            .fallback_responses
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| LAST_RESORT_REPLY.to_string())
    }

    fn count_sent(&self) {
        self.sink.report_activity(ActivityCounts {
            messages_sent: 1,
            ..ActivityCounts::default()
        });
    }
}

#[async_trait]
impl MessageHandler for ReplyPipeline {
    async fn handle(&self, message: InboundMessage, session: Arc<dyn ConnectorSession>) {
        self.sink.report_activity(ActivityCounts {
            messages_received: 1,
            ..ActivityCounts::default()
        });

        let outcome = self.reply(&message, Some(session.as_ref())).await;
        if outcome.is_delivered() {
            return;
        }
        match session.send(&message.conversation, outcome.text()).await {
            Ok(()) => self.count_sent(),
            Err(e) => warn!(
                conversation = %message.conversation,
                error = %e,
                "failed to send reply"
            ),
        }
    }
}
