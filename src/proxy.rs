//! # Proxy Session Manager Module
//!
//! This module owns the rotating residential proxy used for outbound calls.
//! A [`ProxySession`] binds one endpoint (a sticky exit IP, selected by the
//! session id embedded in the proxy username) for a limited time. The
//! [`ProxySessionManager`] hands out the current endpoint, replaces the
//! session when it expires, and rotates it on demand after a proxy failure.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info};

use crate::config::ProxyConfig;
use crate::errors::BotError;

/// Session ids are 11 lowercase hex digits (44 random bits)
const SESSION_ID_MASK: u64 = (1 << 44) - 1;

/// One proxy endpoint with credentials bound to a session id
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    /// Username with the region and session id embedded
    pub username: String,
    password: String,
    pub region: String,
    pub session_id: String,
}

impl ProxyEndpoint {
    /// Proxy URL without credentials
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("region", &self.region)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Time-boxed binding to one proxy endpoint
#[derive(Debug, Clone)]
pub struct ProxySession {
    pub endpoint: ProxyEndpoint,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ProxySession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_expired(self, now)
    }
}

/// `true` once `now` reaches the session's expiry
pub fn is_expired(session: &ProxySession, now: DateTime<Utc>) -> bool {
    now >= session.expires_at
}

/// Owner of the current proxy session
///
/// Only the manager decides which session is current. A replacement session
/// is fully built before it is swapped in, and readers get an `Arc` snapshot,
/// so a session is never observed half-constructed or mutated in place.
///
/// When proxying is disabled the manager never constructs a session and
/// every accessor returns `None`.
pub struct ProxySessionManager {
    config: ProxyConfig,
    lifetime: Duration,
    current: Mutex<Option<Arc<ProxySession>>>,
    rotations: AtomicU64,
}

impl ProxySessionManager {
    /// Create a manager from validated proxy settings
    ///
    /// # Errors
    ///
    /// `BotError::Config` when proxying is enabled without credentials or
    /// with an unusable session lifetime.
    pub fn new(config: ProxyConfig) -> Result<Self, BotError> {
        config.validate()?;
        let minutes = i64::try_from(config.timeout_minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .ok_or_else(|| BotError::Config("PROXY_TIMEOUT_MINUTES is out of range".into()))?;

        Ok(Self {
            config,
            lifetime: minutes,
            current: Mutex::new(None),
            rotations: AtomicU64::new(0),
        })
    }

    /// A manager that always routes calls directly
    pub fn disabled() -> Self {
        Self {
            config: ProxyConfig::default(),
            lifetime: Duration::zero(),
            current: Mutex::new(None),
            rotations: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Endpoint of the active session, creating a session if needed
    pub fn current_proxy(&self) -> Option<ProxyEndpoint> {
        self.current_proxy_at(Utc::now())
    }

    /// Same as [`current_proxy`](Self::current_proxy) with an explicit clock reading
    pub fn current_proxy_at(&self, now: DateTime<Utc>) -> Option<ProxyEndpoint> {
        if !self.config.enabled {
            return None;
        }

        let mut current = self.current.lock();
        if let Some(session) = current.as_ref() {
            if !is_expired(session, now) {
                return Some(session.endpoint.clone());
            }
            debug!(session_id = %session.endpoint.session_id, "Proxy session expired");
        }

        let previous = current.as_ref().map(|s| s.endpoint.session_id.clone());
        let session = Arc::new(self.build_session(previous.as_deref(), now));
        info!(
            session_id = %session.endpoint.session_id,
            expires_at = %session.expires_at,
            "Started new proxy session"
        );
        let endpoint = session.endpoint.clone();
        *current = Some(session);
        Some(endpoint)
    }

    /// Replace the current session regardless of its expiry
    pub fn rotate(&self) -> Option<ProxyEndpoint> {
        self.rotate_at(Utc::now())
    }

    /// Same as [`rotate`](Self::rotate) with an explicit clock reading
    pub fn rotate_at(&self, now: DateTime<Utc>) -> Option<ProxyEndpoint> {
        if !self.config.enabled {
            return None;
        }

        let mut current = self.current.lock();
        let previous = current.as_ref().map(|s| s.endpoint.session_id.clone());
        let session = Arc::new(self.build_session(previous.as_deref(), now));
        info!(
            previous = previous.as_deref().unwrap_or("-"),
            session_id = %session.endpoint.session_id,
            "Rotated proxy session"
        );
        let endpoint = session.endpoint.clone();
        *current = Some(session);
        self.rotations.fetch_add(1, Ordering::Relaxed);
        Some(endpoint)
    }

    /// Number of explicit rotations since startup; expiry renewals are not counted
    pub fn rotation_count(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Snapshot of the current session without creating one
    pub fn current_session(&self) -> Option<Arc<ProxySession>> {
        self.current.lock().clone()
    }

    fn build_session(&self, previous_id: Option<&str>, now: DateTime<Utc>) -> ProxySession {
        let session_id = generate_session_id(previous_id);
        let endpoint = ProxyEndpoint {
            host: self.config.host.clone(),
            port: self.config.port,
            username: session_username(&self.config, &session_id),
            password: self.config.password.clone(),
            region: self.config.region.clone(),
            session_id,
        };

        ProxySession {
            endpoint,
            created_at: now,
            expires_at: now + self.lifetime,
        }
    }
}

impl fmt::Debug for ProxySessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySessionManager")
            .field("enabled", &self.config.enabled)
            .field("lifetime", &self.lifetime)
            .field("rotations", &self.rotation_count())
            .field("current", &self.current_session().map(|s| s.endpoint.session_id.clone()))
            .finish()
    }
}

/// PIA username carrying the exit region and sticky session id
pub fn session_username(config: &ProxyConfig, session_id: &str) -> String {
    format!(
        "{}-region-{}-sessid-{}-sesstime-{}",
        config.username, config.region, session_id, config.session_time_minutes
    )
}

/// Random session id that differs from `previous`
pub fn generate_session_id(previous: Option<&str>) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let id = format!("{:011x}", rng.gen::<u64>() & SESSION_ID_MASK);
        if previous != Some(id.as_str()) {
            return id;
        }
    }
}
