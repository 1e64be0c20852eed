// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Round-robin credential pool with per-credential cooldown.
//!
//! Selection, failure marking, and client construction share one mutex, so a
//! burst of concurrent requests cannot all land on a credential that has
//! just been rate limited. The lock is never held across a provider call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use kestrel_core::{Credential, GenerationClient, GenerationClientFactory, KestrelError};

/// A credential together with its memoised client.
#[derive(Clone)]
pub struct Checkout {
    pub credential: Credential,
    pub client: Arc<dyn GenerationClient>,
}

#[derive(Debug, Clone, Copy)]
struct Failure {
    at: Instant,
    wall: DateTime<Utc>,
}

#[derive(Default)]
struct PoolState {
    cursor: usize,
    failures: HashMap<usize, Failure>,
    clients: HashMap<usize, Arc<dyn GenerationClient>>,
}

/// Status of one credential, safe to expose over an admin surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyStatus {
    pub index: usize,
    pub key_preview: String,
    pub is_failed: bool,
    pub failed_at: Option<DateTime<Utc>>,
    pub cooldown_remaining_secs: u64,
}

/// Pool-wide status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStatus {
    pub total_keys: usize,
    pub available_keys: usize,
    pub failed_keys: usize,
    pub current_index: usize,
    pub keys: Vec<KeyStatus>,
}

/// Fixed, ordered set of interchangeable provider credentials.
pub struct CredentialPool {
    credentials: Vec<Credential>,
    cooldown: Duration,
    state: Mutex<PoolState>,
}

impl CredentialPool {
    /// Builds a pool from raw keys. Blank entries are ignored.
    pub fn new<I, S>(keys: I, cooldown: Duration) -> Result<Self, KestrelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let credentials: Vec<Credential> = keys
            .into_iter()
            .filter_map(|k| {
                let k = k.as_ref().trim();
                (!k.is_empty()).then(|| k.to_string())
            })
            .enumerate()
            .map(|(i, k)| Credential::new(i, k))
            .collect();

        if credentials.is_empty() {
            return Err(KestrelError::Config(
                "no generation API keys configured".to_string(),
            ));
        }

        info!(count = credentials.len(), "credential pool initialized");
        Ok(Self {
            credentials,
            cooldown,
            state: Mutex::new(PoolState::default()),
        })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Next credential in rotation that is outside its cooldown.
    ///
    /// When every credential is cooling down, logs a warning and returns the
    /// first one anyway.
    pub async fn next_available(&self) -> Credential {
        let mut state = self.state.lock().await;
        self.select(&mut state)
    }

    /// Selects a credential and returns its client, building it on first use.
    pub async fn checkout(
        &self,
        factory: &dyn GenerationClientFactory,
    ) -> Result<Checkout, KestrelError> {
        let mut state = self.state.lock().await;
        let credential = self.select(&mut state);
        let client = match state.clients.get(&credential.index()) {
            Some(client) => Arc::clone(client),
            None => {
                let client = factory.build(&credential)?;
                debug!(key = %credential.preview(), "generation client created");
                state.clients.insert(credential.index(), Arc::clone(&client));
                client
            }
        };
        Ok(Checkout { credential, client })
    }

    /// Starts the cooldown for `credential` from now.
    pub async fn mark_failed(&self, credential: &Credential) {
        let mut state = self.state.lock().await;
        state.failures.insert(
            credential.index(),
            Failure {
                at: Instant::now(),
                wall: Utc::now(),
            },
        );
        warn!(key = %credential.preview(), "credential marked failed");
    }

    /// Clears every failure record.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.failures.clear();
        info!("credential failures reset");
    }

    pub async fn status(&self) -> PoolStatus {
        let state = self.state.lock().await;
        let now = Instant::now();
        let keys: Vec<KeyStatus> = self
            .credentials
            .iter()
            .map(|cred| {
                let failure = state.failures.get(&cred.index());
                let remaining = failure
                    .map(|f| self.cooldown.saturating_sub(now.duration_since(f.at)))
                    .unwrap_or_default();
                KeyStatus {
                    index: cred.index(),
                    key_preview: cred.preview(),
                    is_failed: !remaining.is_zero(),
                    failed_at: failure.map(|f| f.wall),
                    cooldown_remaining_secs: remaining.as_secs_f64().ceil() as u64,
                }
            })
            .collect();
        let failed = keys.iter().filter(|k| k.is_failed).count();
        PoolStatus {
            total_keys: keys.len(),
            available_keys: keys.len() - failed,
            failed_keys: failed,
            current_index: state.cursor,
            keys,
        }
    }

    fn select(&self, state: &mut PoolState) -> Credential {
        let now = Instant::now();
        let len = self.credentials.len();
        for _ in 0..len {
            let index = state.cursor;
            state.cursor = (state.cursor + 1) % len;
            match state.failures.get(&index) {
                Some(f) if now.duration_since(f.at) < self.cooldown => continue,
                Some(_) => {
                    state.failures.remove(&index);
                }
                None => {}
            }
            return self.credentials[index].clone();
        }
        warn!(count = len, "all credentials cooling down, using the first one");
        self.credentials[0].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use kestrel_test_utils::ScriptedGenerator;

    fn pool(keys: &[&str]) -> CredentialPool {
        CredentialPool::new(keys.iter().copied(), Duration::from_secs(60)).unwrap()
    }

    #[test]
    fn empty_pool_is_configuration_error() {
        let err = CredentialPool::new(Vec::<String>::new(), Duration::from_secs(60))
            .err()
            .unwrap();
        assert!(matches!(err, KestrelError::Config(_)));

        let err = CredentialPool::new(["  ", ""], Duration::from_secs(60))
            .err()
            .unwrap();
        assert!(matches!(err, KestrelError::Config(_)));
    }

    #[tokio::test]
    async fn healthy_pool_visits_each_key_once_per_cycle() {
        let pool = pool(&["k1", "k2", "k3"]);
        let mut seen = HashSet::new();
        for _ in 0..3 {
            seen.insert(pool.next_available().await.index());
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(pool.next_available().await.index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_key_is_skipped_for_exactly_the_cooldown() {
        let pool = pool(&["k1", "k2"]);
        let k1 = pool.next_available().await;
        pool.mark_failed(&k1).await;

        for _ in 0..4 {
            assert_eq!(pool.next_available().await.index(), 1);
        }

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(pool.next_available().await.index(), 1);
        assert_eq!(pool.next_available().await.index(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        let picks = [
            pool.next_available().await.index(),
            pool.next_available().await.index(),
        ];
        assert!(picks.contains(&0), "k1 should be selectable again: {picks:?}");
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn all_cooling_down_returns_first_with_warning() {
        let pool = pool(&["k1", "k2"]);
        for _ in 0..2 {
            let c = pool.next_available().await;
            pool.mark_failed(&c).await;
        }
        assert_eq!(pool.next_available().await.index(), 0);
        assert!(logs_contain("all credentials cooling down"));
    }

    #[tokio::test(start_paused = true)]
    async fn status_masks_keys_and_reports_cooldown() {
        let pool = pool(&["AIzaSyAAAAAAAAAA", "AIzaSyBBBBBBBBBB"]);
        let first = pool.next_available().await;
        pool.mark_failed(&first).await;
        tokio::time::advance(Duration::from_secs(15)).await;

        let status = pool.status().await;
        assert_eq!(status.total_keys, 2);
        assert_eq!(status.failed_keys, 1);
        assert_eq!(status.available_keys, 1);
        assert_eq!(status.current_index, 1);
        assert_eq!(status.keys[0].key_preview, "AIzaSyAA...");
        assert!(status.keys[0].is_failed);
        assert!(status.keys[0].failed_at.is_some());
        assert_eq!(status.keys[0].cooldown_remaining_secs, 45);
        assert!(!status.keys[1].is_failed);

        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("AAAAAAAAAA"));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_failures() {
        let pool = pool(&["k1"]);
        let c = pool.next_available().await;
        pool.mark_failed(&c).await;
        assert_eq!(pool.status().await.failed_keys, 1);
        pool.reset().await;
        assert_eq!(pool.status().await.failed_keys, 0);
    }

    #[tokio::test]
    async fn clients_are_built_once_per_credential() {
        let pool = pool(&["k1", "k2"]);
        let generator = ScriptedGenerator::new();
        for _ in 0..6 {
            pool.checkout(&generator).await.unwrap();
        }
        assert_eq!(generator.clients_built(), 2);
    }
}
