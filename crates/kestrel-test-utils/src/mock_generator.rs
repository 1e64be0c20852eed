// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted generation provider.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use kestrel_core::{Credential, GenerationClient, GenerationClientFactory, KestrelError};

use crate::lock;

/// One scripted provider response.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Fails with a 429-style quota error.
    RateLimited,
    /// Fails with a non-rate-limit error carrying this message.
    Error(String),
    /// Waits, then returns the text.
    Delayed(Duration, String),
}

#[derive(Default)]
struct Script {
    queued: HashMap<String, VecDeque<ScriptedReply>>,
    sticky: HashMap<String, ScriptedReply>,
    calls: HashMap<String, usize>,
    prompts: Vec<String>,
}

/// Factory whose clients answer from a per-key script.
///
/// Keys are matched by their raw secret. A queued reply is consumed once;
/// otherwise the sticky reply for the key is used; otherwise the call fails.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<Script>>,
    built: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call with `key` returns `reply` unless something is queued.
    pub fn always(&self, key: &str, reply: ScriptedReply) {
        lock(&self.script).sticky.insert(key.to_string(), reply);
    }

    /// Queues a one-shot reply for `key`.
    pub fn push(&self, key: &str, reply: ScriptedReply) {
        lock(&self.script)
            .queued
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls_for(&self, key: &str) -> usize {
        lock(&self.script).calls.get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.script).calls.values().sum()
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        lock(&self.script).prompts.clone()
    }

    /// How many clients the pool asked this factory to build.
    pub fn clients_built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }
}

impl GenerationClientFactory for ScriptedGenerator {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn GenerationClient>, KestrelError> {
        self.built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedClient {
            key: credential.expose().to_string(),
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedClient {
    key: String,
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(
        &self,
        _model: &str,
        prompt: &str,
        _system_preamble: &str,
    ) -> Result<String, KestrelError> {
        let reply = {
            let mut script = lock(&self.script);
            *script.calls.entry(self.key.clone()).or_default() += 1;
            script.prompts.push(prompt.to_string());
            let queued = script
                .queued
                .get_mut(&self.key)
                .and_then(|q| q.pop_front());
            queued.or_else(|| script.sticky.get(&self.key).cloned())
        };

        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::RateLimited) => Err(KestrelError::RateLimited {
                message: "429 RESOURCE_EXHAUSTED: quota exceeded".to_string(),
            }),
            Some(ScriptedReply::Error(message)) => Err(KestrelError::generation(message)),
            Some(ScriptedReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Err(KestrelError::generation(format!(
                "no scripted reply for key {}",
                self.key
            ))),
        }
    }
}
