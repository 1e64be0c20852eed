// SPDX-FileCopyrightText: 2026 Kestrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Kestrel chat agent.

use thiserror::Error;

/// Boxed source error carried by several variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The primary error type used across every Kestrel crate.
#[derive(Debug, Error)]
pub enum KestrelError {
    /// Missing or invalid credentials or settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// The chat platform rejected a login attempt.
    #[error("login failed: {message}")]
    Login {
        message: String,
        source: Option<BoxError>,
    },

    /// The generation provider signalled a quota or rate limit (HTTP 429).
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// The generation provider failed for a reason other than rate limiting.
    #[error("generation failed: {message}")]
    GenerationFailed {
        message: String,
        source: Option<BoxError>,
    },

    /// Every dispatch attempt hit a rate-limited credential.
    #[error("all credentials failed after {attempts} attempts; last error: {last_error}")]
    AllCredentialsExhausted { attempts: u32, last_error: String },

    /// The durable history store could not be reached.
    #[error("storage unavailable: {source}")]
    StorageUnavailable { source: BoxError },

    /// The background listen loop exited with an error or panicked.
    #[error("listen loop crashed: {message}")]
    ListenCrash { message: String },

    /// Connector send/disconnect failures.
    #[error("connector error: {message}")]
    Connector {
        message: String,
        source: Option<BoxError>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KestrelError {
    /// Wraps any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        KestrelError::StorageUnavailable {
            source: Box::new(err),
        }
    }

    /// Builds a generation failure without a source.
    pub fn generation(message: impl Into<String>) -> Self {
        KestrelError::GenerationFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a login failure without a source.
    pub fn login(message: impl Into<String>) -> Self {
        KestrelError::Login {
            message: message.into(),
            source: None,
        }
    }

    /// Whether this error means the provider throttled the credential.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            KestrelError::RateLimited { .. } => true,
            other => looks_rate_limited(&other.to_string()),
        }
    }

    /// Whether this error is a session-expiry style login failure worth retrying.
    pub fn is_session_expiry(&self) -> bool {
        match self {
            KestrelError::Login { message, .. } | KestrelError::Connector { message, .. } => {
                looks_like_session_expiry(message)
            }
            other => looks_like_session_expiry(&other.to_string()),
        }
    }
}

/// Provider rate-limit heuristic over the rendered error text.
pub fn looks_rate_limited(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("429") || lower.contains("rate limit") || lower.contains("quota")
}

/// Session-expiry heuristic over the rendered login error text.
///
/// `subscriptable` is what the platform client reports when the stored
/// session payload has gone stale.
pub fn looks_like_session_expiry(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("login") || lower.contains("cookie") || lower.contains("subscriptable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_detection_is_case_insensitive() {
        assert!(looks_rate_limited("HTTP 429 Too Many Requests"));
        assert!(looks_rate_limited("Rate Limit reached"));
        assert!(looks_rate_limited("RESOURCE_EXHAUSTED: Quota exceeded"));
        assert!(!looks_rate_limited("invalid argument"));
    }

    #[test]
    fn explicit_variant_is_rate_limited() {
        let err = KestrelError::RateLimited {
            message: "slow down".into(),
        };
        assert!(err.is_rate_limited());
        assert!(!KestrelError::generation("bad request").is_rate_limited());
        assert!(KestrelError::generation("status 429").is_rate_limited());
    }

    #[test]
    fn session_expiry_detection() {
        assert!(looks_like_session_expiry("Cookie expired"));
        assert!(looks_like_session_expiry("'NoneType' object is not subscriptable"));
        assert!(looks_like_session_expiry("LOGIN required"));
        assert!(!looks_like_session_expiry("network unreachable"));
        assert!(KestrelError::login("cookie rejected").is_session_expiry());
        assert!(!KestrelError::login("account banned").is_session_expiry());
        assert!(!KestrelError::Internal("boom".into()).is_session_expiry());
    }

    #[test]
    fn exhausted_message_names_last_error() {
        let err = KestrelError::AllCredentialsExhausted {
            attempts: 3,
            last_error: "429".into(),
        };
        let text = err.to_string();
        assert!(text.contains("3 attempts"));
        assert!(text.contains("429"));
    }
}
