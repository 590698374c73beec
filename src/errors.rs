//! # Error Types Module
//!
//! This module defines the error taxonomy used by outbound calls.
//! A [`CallError`] describes one failed attempt; a [`BotError`] is what
//! callers of the services finally see.

use thiserror::Error;

/// Failure of a single outbound HTTP attempt
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// Failure attributable to the proxy (connect/timeout through it, HTTP 407)
    #[error("Proxy error: {0}")]
    Proxy(String),
    /// Request timed out on a direct connection
    #[error("Timeout error: {0}")]
    Timeout(String),
    /// Any other network-level failure
    #[error("Transport error: {0}")]
    Transport(String),
    /// Upstream answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// Upstream answered but the body was not what we expected
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// No usable proxy route could be built for the attempt
    #[error("Proxy unavailable: {0}")]
    ProxyUnavailable(String),
}

impl CallError {
    /// Whether the failure should make the caller rotate its proxy session
    pub fn is_proxy_related(&self) -> bool {
        match self {
            CallError::Proxy(_) => true,
            CallError::Status { status, .. } => *status == 407,
            _ => false,
        }
    }

    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            CallError::Status { status, .. } => !matches!(status, 400 | 401 | 403 | 404),
            CallError::ProxyUnavailable(_) => false,
            _ => true,
        }
    }

    /// Classify a `reqwest` error, knowing whether the request went through a proxy
    pub fn from_reqwest(err: reqwest::Error, via_proxy: bool) -> Self {
        if via_proxy && (err.is_connect() || err.is_timeout()) {
            return CallError::Proxy(err.to_string());
        }
        if err.is_timeout() {
            return CallError::Timeout(err.to_string());
        }
        if err.is_decode() {
            return CallError::InvalidResponse(err.to_string());
        }
        if let Some(status) = err.status() {
            return CallError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        CallError::Transport(err.to_string())
    }
}

/// Errors surfaced to the bot layer and at startup
#[derive(Debug, Error)]
pub enum BotError {
    /// Proxy pool exhausted or misconfigured
    #[error("Proxy unavailable: {0}")]
    ProxyUnavailable(String),
    /// A call failed with an error that is not worth retrying
    #[error("Call failed: {0}")]
    CallFailed(#[from] CallError),
    /// Terminal failure after the retry policy ran out
    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: CallError,
    },
    /// Invalid or missing configuration, fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BotError {
    /// Convert an error that will not be retried into what callers see
    pub fn from_final(err: CallError) -> Self {
        match err {
            CallError::ProxyUnavailable(msg) => BotError::ProxyUnavailable(msg),
            other => BotError::CallFailed(other),
        }
    }

    /// The underlying call error, if any
    pub fn call_error(&self) -> Option<&CallError> {
        match self {
            BotError::CallFailed(err) => Some(err),
            BotError::RetriesExhausted { last, .. } => Some(last),
            _ => None,
        }
    }
}
