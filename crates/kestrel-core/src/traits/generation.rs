// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generative provider capabilities.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::KestrelError;
use crate::types::Credential;

/// Builds a provider client bound to one credential.
///
/// The credential pool calls this at most once per credential.
pub trait GenerationClientFactory: Send + Sync + 'static {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn GenerationClient>, KestrelError>;
}

/// A provider client bound to one credential.
#[async_trait]
pub trait GenerationClient: Send + Sync + 'static {
    /// Generates a completion for `prompt` under `system_preamble`.
    ///
    /// Quota exhaustion should surface as [`KestrelError::RateLimited`] or
    /// carry `429` in its message.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        system_preamble: &str,
    ) -> Result<String, KestrelError>;
}

/// Restarts the chat connector after the provider hints at a stale session.
#[async_trait]
pub trait ReloginHook: Send + Sync + 'static {
    async fn relogin(&self) -> Result<(), KestrelError>;
}
