//! # Retry Module
//!
//! Exponential backoff for outbound calls. Every call site (LLM completion,
//! Wildberries card, detail and search requests) goes through [`with_backoff`]
//! with an explicit [`RetryPolicy`].
//!
//! ## State Machine
//!
//! `Ready → Attempting → {Success | Backoff → Attempting | Exhausted}`
//!
//! A failure attributed to the proxy rotates the proxy session before the
//! backoff sleep. Failures that cannot succeed on retry end the loop at once.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::errors::{BotError, CallError};
use crate::proxy::ProxySessionManager;

/// Lower and upper bound of the random jitter factor
pub const JITTER_RANGE: (f64, f64) = (0.8, 1.2);

/// Largest accepted `max_backoff_secs`: one day
pub const MAX_BACKOFF_CEILING_SECS: f64 = 86_400.0;

/// Backoff configuration shared by all outbound call sites
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up
    pub max_retries: u32,
    /// Delay after the first failure, in seconds
    pub initial_backoff_secs: f64,
    /// Upper bound for any delay, in seconds
    pub max_backoff_secs: f64,
    /// Multiplier applied per attempt
    pub backoff_factor: f64,
    /// Randomize delays within [`JITTER_RANGE`]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_secs: 2.0,
            max_backoff_secs: 60.0,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Total attempts the wrapper performs; never less than one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay after the failure of attempt `attempt` (0-based), without jitter
    ///
    /// `min(max_backoff, initial_backoff * backoff_factor^attempt)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff_secs * self.backoff_factor.powi(exponent);
        self.capped_duration(secs)
    }

    /// Apply jitter to a delay when enabled, never exceeding the cap
    pub fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(JITTER_RANGE.0..=JITTER_RANGE.1);
        self.capped_duration(delay.as_secs_f64() * factor)
    }

    /// Clamp `secs` into `[0, max_backoff]`; never panics on overflow or NaN
    fn capped_duration(&self, secs: f64) -> Duration {
        let cap = Duration::try_from_secs_f64(self.max_backoff_secs.max(0.0))
            .unwrap_or(Duration::from_secs_f64(MAX_BACKOFF_CEILING_SECS));
        match Duration::try_from_secs_f64(secs.max(0.0)) {
            Ok(delay) => delay.min(cap),
            Err(_) => cap,
        }
    }

    pub fn validate(&self) -> Result<(), BotError> {
        let finite = self.initial_backoff_secs.is_finite()
            && self.max_backoff_secs.is_finite()
            && self.backoff_factor.is_finite();
        if !finite || self.initial_backoff_secs <= 0.0 {
            return Err(BotError::Config(
                "LLM_INITIAL_BACKOFF must be a positive number".into(),
            ));
        }
        if self.backoff_factor < 1.0 {
            return Err(BotError::Config(
                "LLM_BACKOFF_FACTOR must be at least 1.0".into(),
            ));
        }
        if self.max_backoff_secs > MAX_BACKOFF_CEILING_SECS {
            return Err(BotError::Config(format!(
                "LLM_MAX_BACKOFF must not exceed {MAX_BACKOFF_CEILING_SECS} seconds"
            )));
        }
        if self.max_backoff_secs < self.initial_backoff_secs {
            return Err(BotError::Config(
                "LLM_MAX_BACKOFF must not be lower than LLM_INITIAL_BACKOFF".into(),
            ));
        }
        Ok(())
    }
}

/// States of one wrapped call, used in log records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Ready,
    Attempting,
    Backoff,
    Success,
    Exhausted,
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetryState::Ready => "ready",
            RetryState::Attempting => "attempting",
            RetryState::Backoff => "backoff",
            RetryState::Success => "success",
            RetryState::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// Run `call` until it succeeds or the policy runs out
///
/// `call` receives the 0-based attempt number. When `proxies` is given, a
/// proxy-related failure rotates its session before the next attempt.
///
/// # Errors
///
/// - `BotError::RetriesExhausted` carrying the last failure once
///   `policy.max_attempts()` attempts failed
/// - `BotError::CallFailed` / `BotError::ProxyUnavailable` for failures that
///   are not retryable, after a single attempt
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    proxies: Option<&ProxySessionManager>,
    operation: &str,
    mut call: F,
) -> Result<T, BotError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;
    debug!(operation, max_attempts, state = %RetryState::Ready, "Starting call");

    loop {
        debug!(operation, attempt, state = %RetryState::Attempting, "Attempting call");

        let err = match call(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, state = %RetryState::Success, "Call succeeded after retry");
                } else {
                    debug!(operation, state = %RetryState::Success, "Call succeeded");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            error!(operation, attempt, error = %err, "Call failed with a non-retryable error");
            return Err(BotError::from_final(err));
        }

        if err.is_proxy_related() {
            if let Some(manager) = proxies {
                let rotated = manager.rotate();
                warn!(
                    operation,
                    session_id = rotated.as_ref().map(|e| e.session_id.as_str()).unwrap_or("-"),
                    "Proxy failure, rotated proxy session"
                );
            }
        }

        if attempt + 1 >= max_attempts {
            error!(
                operation,
                attempts = attempt + 1,
                state = %RetryState::Exhausted,
                error = %err,
                "Max retries exceeded"
            );
            return Err(BotError::RetriesExhausted {
                attempts: attempt + 1,
                last: err,
            });
        }

        let delay = policy.jittered(policy.backoff_delay(attempt));
        warn!(
            operation,
            attempt = attempt + 1,
            max_attempts,
            delay_secs = delay.as_secs_f64(),
            state = %RetryState::Backoff,
            error = %err,
            "Call failed, backing off"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
