// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Failover dispatch of generation requests across the credential pool.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use kestrel_config::model::GenerationConfig;
use kestrel_core::{GenerationClientFactory, KestrelError};

use crate::pool::{CredentialPool, PoolStatus};
use crate::relogin::ReloginGuard;

/// Outcome of one provider call.
#[derive(Debug)]
pub enum Attempt {
    Succeeded(String),
    RateLimited(KestrelError),
    Failed(KestrelError),
}

impl Attempt {
    pub fn classify(result: Result<String, KestrelError>) -> Self {
        match result {
            Ok(text) => Attempt::Succeeded(text),
            Err(e) if e.is_rate_limited() => Attempt::RateLimited(e),
            Err(e) => Attempt::Failed(e),
        }
    }
}

/// Tunables for [`GenerationDispatcher`].
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub model: String,
    pub system_preamble: String,
    pub max_retries: u32,
    pub key_cooldown: Duration,
    pub rate_limit_pause: Duration,
    pub relogin_keywords: Vec<String>,
}

impl From<&GenerationConfig> for DispatchSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            system_preamble: config.system_preamble.clone(),
            max_retries: config.max_retries,
            key_cooldown: Duration::from_secs(config.key_cooldown_secs),
            rate_limit_pause: Duration::from_millis(config.rate_limit_pause_ms),
            relogin_keywords: config
                .relogin_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }
}

/// Sends prompts to the provider, rotating credentials on rate limits.
pub struct GenerationDispatcher {
    pool: Option<CredentialPool>,
    factory: Arc<dyn GenerationClientFactory>,
    settings: DispatchSettings,
    relogin: Option<ReloginGuard>,
}

impl GenerationDispatcher {
    /// Builds a dispatcher over `keys`.
    ///
    /// With no usable keys the dispatcher still constructs, but every
    /// `generate` call fails fast with a configuration error.
    pub fn new(
        keys: &[String],
        factory: Arc<dyn GenerationClientFactory>,
        settings: DispatchSettings,
    ) -> Self {
        let pool = match CredentialPool::new(keys, settings.key_cooldown) {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(error = %e, "generation disabled");
                None
            }
        };
        Self {
            pool,
            factory,
            settings,
            relogin: None,
        }
    }

    /// Attaches the re-login guard fired on keyword-matching rate limits.
    pub fn with_relogin(mut self, guard: ReloginGuard) -> Self {
        self.relogin = Some(guard);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.pool.is_some()
    }

    pub fn relogin(&self) -> Option<&ReloginGuard> {
        self.relogin.as_ref()
    }

    /// Generates with the configured retry bound.
    pub async fn generate(&self, prompt: &str) -> Result<String, KestrelError> {
        self.generate_with_retries(prompt, self.settings.max_retries)
            .await
    }

    /// Generates a reply, trying up to `max_retries` credentials.
    ///
    /// Rate-limited attempts put the credential in cooldown and move on.
    /// Any other failure is retried once, then surfaced.
    pub async fn generate_with_retries(
        &self,
        prompt: &str,
        max_retries: u32,
    ) -> Result<String, KestrelError> {
        let pool = self.pool.as_ref().ok_or_else(|| {
            KestrelError::Config("no generation API keys configured".to_string())
        })?;
        let max_retries = max_retries.max(1);
        let mut other_failures = 0u32;
        let mut last_error = String::new();

        for attempt in 1..=max_retries {
            let (credential, outcome) = match pool.checkout(self.factory.as_ref()).await {
                Ok(checkout) => {
                    let result = checkout
                        .client
                        .generate(
                            &self.settings.model,
                            prompt,
                            &self.settings.system_preamble,
                        )
                        .await;
                    (Some(checkout.credential), Attempt::classify(result))
                }
                Err(e) => (None, Attempt::Failed(e)),
            };

            match outcome {
                Attempt::Succeeded(text) => {
                    if attempt > 1 {
                        info!(attempt, "generation recovered after failover");
                    }
                    return Ok(text);
                }
                Attempt::RateLimited(err) => {
                    let key = credential.as_ref().map(|c| c.preview()).unwrap_or_default();
                    warn!(key = %key, attempt, max_retries, error = %err, "credential rate limited");
                    if let Some(credential) = &credential {
                        pool.mark_failed(credential).await;
                    }
                    self.maybe_relogin(prompt).await;
                    last_error = err.to_string();
                    if attempt < max_retries {
                        tokio::time::sleep(self.settings.rate_limit_pause).await;
                    }
                }
                Attempt::Failed(err) => {
                    other_failures += 1;
                    warn!(attempt, max_retries, error = %err, "generation attempt failed");
                    if other_failures >= 2 || attempt == max_retries {
                        return Err(KestrelError::GenerationFailed {
                            message: format!("generation failed after {attempt} attempts"),
                            source: Some(Box::new(err)),
                        });
                    }
                    last_error = err.to_string();
                }
            }
        }

        Err(KestrelError::AllCredentialsExhausted {
            attempts: max_retries,
            last_error,
        })
    }

    pub async fn pool_status(&self) -> Option<PoolStatus> {
        match &self.pool {
            Some(pool) => Some(pool.status().await),
            None => None,
        }
    }

    pub async fn reset_failures(&self) {
        if let Some(pool) = &self.pool {
            pool.reset().await;
        }
    }

    async fn maybe_relogin(&self, prompt: &str) {
        let Some(guard) = &self.relogin else {
            return;
        };
        let lower = prompt.to_lowercase();
        if self
            .settings
            .relogin_keywords
            .iter()
            .any(|k| !k.is_empty() && lower.contains(k.as_str()))
        {
            guard.trigger().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use kestrel_core::ReloginHook;
    use kestrel_test_utils::{ScriptedGenerator, ScriptedReply};

    fn settings() -> DispatchSettings {
        DispatchSettings {
            model: "gemini-2.5-flash".into(),
            system_preamble: "be nice".into(),
            max_retries: 3,
            key_cooldown: Duration::from_secs(60),
            rate_limit_pause: Duration::from_secs(1),
            relogin_keywords: vec!["zalo".into()],
        }
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_pool_fails_fast_without_calls() {
        let generator = Arc::new(ScriptedGenerator::new());
        let dispatcher = GenerationDispatcher::new(&[], generator.clone(), settings());
        assert!(!dispatcher.is_configured());
        let err = dispatcher.generate("hi").await.unwrap_err();
        assert!(matches!(err, KestrelError::Config(_)));
        assert_eq!(generator.total_calls(), 0);
        assert!(dispatcher.pool_status().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_key_fails_over_to_next() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.always("k1", ScriptedReply::RateLimited);
        generator.always("k2", ScriptedReply::Text("from k2".into()));
        let dispatcher = GenerationDispatcher::new(&keys(&["k1", "k2"]), generator.clone(), settings());

        assert_eq!(dispatcher.generate("hello").await.unwrap(), "from k2");

        let status = dispatcher.pool_status().await.unwrap();
        assert!(status.keys[0].is_failed);
        assert!(status.keys[0].failed_at.is_some());
        assert!(!status.keys[1].is_failed);
        assert_eq!(generator.calls_for("k1"), 1);
        assert_eq!(generator.calls_for("k2"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn all_rate_limited_exhausts_after_exactly_max_retries() {
        let generator = Arc::new(ScriptedGenerator::new());
        for k in ["k1", "k2", "k3", "k4"] {
            generator.always(k, ScriptedReply::RateLimited);
        }
        let dispatcher = GenerationDispatcher::new(
            &keys(&["k1", "k2", "k3", "k4"]),
            generator.clone(),
            settings(),
        );

        let started = tokio::time::Instant::now();
        let err = dispatcher.generate("hello").await.unwrap_err();
        match err {
            KestrelError::AllCredentialsExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("429"), "{last_error}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(generator.total_calls(), 3);
        // Pauses only between attempts.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn non_rate_limit_error_retried_once_then_surfaced() {
        let generator = Arc::new(ScriptedGenerator::new());
        for k in ["k1", "k2", "k3"] {
            generator.always(k, ScriptedReply::Error("invalid argument".into()));
        }
        let dispatcher =
            GenerationDispatcher::new(&keys(&["k1", "k2", "k3"]), generator.clone(), settings());

        let err = dispatcher.generate("hello").await.unwrap_err();
        assert!(matches!(err, KestrelError::GenerationFailed { .. }));
        assert_eq!(generator.total_calls(), 2);
        assert_eq!(dispatcher.pool_status().await.unwrap().failed_keys, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_then_success() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.always("k1", ScriptedReply::Error("connection reset".into()));
        generator.always("k2", ScriptedReply::Text("ok".into()));
        let dispatcher = GenerationDispatcher::new(&keys(&["k1", "k2"]), generator, settings());
        assert_eq!(dispatcher.generate("hello").await.unwrap(), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn reset_makes_failed_keys_available() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.always("k1", ScriptedReply::RateLimited);
        generator.always("k2", ScriptedReply::Text("ok".into()));
        let dispatcher = GenerationDispatcher::new(&keys(&["k1", "k2"]), generator, settings());
        dispatcher.generate("hello").await.unwrap();
        assert_eq!(dispatcher.pool_status().await.unwrap().failed_keys, 1);
        dispatcher.reset_failures().await;
        assert_eq!(dispatcher.pool_status().await.unwrap().failed_keys, 0);
    }

    struct CountingHook(AtomicUsize);

    #[async_trait]
    impl ReloginHook for CountingHook {
        async fn relogin(&self) -> Result<(), KestrelError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn keyword_prompt_triggers_single_relogin() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.always("k1", ScriptedReply::RateLimited);
        generator.always("k2", ScriptedReply::RateLimited);
        let hook = Arc::new(CountingHook(AtomicUsize::new(0)));
        let dispatcher = GenerationDispatcher::new(&keys(&["k1", "k2"]), generator, settings())
            .with_relogin(ReloginGuard::new(hook.clone(), Duration::from_secs(300)));

        let _ = dispatcher.generate("message from Zalo user").await;
        if let Some(guard) = dispatcher.relogin() {
            guard.shutdown().await;
        }
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);

        let _ = dispatcher.generate("plain web message").await;
        assert_eq!(hook.0.load(Ordering::SeqCst), 1);
    }
}
