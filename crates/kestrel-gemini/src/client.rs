// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Gemini `generateContent` endpoint.
//!
//! One [`GeminiClient`] per API key, all sharing a single connection pool.
//! No retries here: failover across keys belongs to the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use kestrel_config::model::GenerationConfig;
use kestrel_core::{Credential, GenerationClient, GenerationClientFactory, KestrelError};

use crate::types::{ApiErrorResponse, Content, GenerateRequest, GenerateResponse};

/// Builds [`GeminiClient`]s for the credential pool.
#[derive(Debug, Clone)]
pub struct GeminiClientFactory {
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClientFactory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, KestrelError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KestrelError::GenerationFailed {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, KestrelError> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

impl GenerationClientFactory for GeminiClientFactory {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn GenerationClient>, KestrelError> {
        Ok(Arc::new(GeminiClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            api_key: credential.expose().to_string(),
            key_preview: credential.preview(),
        }))
    }
}

/// Gemini client bound to one API key.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    key_preview: String,
}

#[async_trait]
impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        system_preamble: &str,
    ) -> Result<String, KestrelError> {
        let url = format!("{}/models/{model}:generateContent", self.base_url);
        let request = GenerateRequest {
            system_instruction: (!system_preamble.trim().is_empty())
                .then(|| Content::text(None, system_preamble.trim())),
            contents: vec![Content::text(Some("user"), prompt)],
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| KestrelError::GenerationFailed {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, key = %self.key_preview, model, "generateContent response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| format!("{} {}", e.error.status, e.error.message))
                .unwrap_or(body);
            let message = format!("Gemini API returned {status}: {}", detail.trim());
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                KestrelError::RateLimited { message }
            } else {
                KestrelError::generation(message)
            });
        }

        let parsed: GenerateResponse =
            response
                .json()
                .await
                .map_err(|e| KestrelError::GenerationFailed {
                    message: format!("failed to parse response: {e}"),
                    source: Some(Box::new(e)),
                })?;
        parsed
            .text()
            .ok_or_else(|| KestrelError::generation("Gemini returned an empty response"))
    }
}
