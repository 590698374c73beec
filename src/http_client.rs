//! # Outbound HTTP Client Module
//!
//! Thin wrapper around `reqwest` that picks the route for each request:
//! direct, or through the current proxy session. One client is kept per
//! proxy session and rebuilt after rotation; the direct client is built once.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::{BotError, CallError};
use crate::proxy::{ProxyEndpoint, ProxySessionManager};

/// Desktop browser user agent sent to Wildberries
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Error bodies are cut to this many characters in error messages
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Client chosen for one attempt
pub struct Route {
    pub client: Client,
    pub endpoint: Option<ProxyEndpoint>,
}

impl Route {
    pub fn via_proxy(&self) -> bool {
        self.endpoint.is_some()
    }
}

/// HTTP client aware of the proxy session manager
pub struct OutboundClient {
    direct: Client,
    proxied: Mutex<Option<(String, Client)>>,
    proxies: Arc<ProxySessionManager>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl OutboundClient {
    /// Build a client with a per-request timeout and optional user agent
    pub fn new(
        proxies: Arc<ProxySessionManager>,
        timeout: Duration,
        user_agent: Option<&str>,
    ) -> Result<Self, BotError> {
        let user_agent = user_agent.map(str::to_string);
        let direct = base_builder(timeout, user_agent.as_deref())
            .build()
            .map_err(|e| BotError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            direct,
            proxied: Mutex::new(None),
            proxies,
            timeout,
            user_agent,
        })
    }

    pub fn proxies(&self) -> &ProxySessionManager {
        &self.proxies
    }

    /// Manager to rotate on proxy failures, if this call site uses the proxy
    pub fn rotation_for(&self, use_proxy: bool) -> Option<&ProxySessionManager> {
        if use_proxy && self.proxies.is_enabled() {
            Some(&self.proxies)
        } else {
            None
        }
    }

    /// Pick the client for the next attempt
    pub fn route(&self, use_proxy: bool) -> Result<Route, CallError> {
        let endpoint = if use_proxy {
            self.proxies.current_proxy()
        } else {
            None
        };
        self.route_for(endpoint)
    }

    fn route_for(&self, endpoint: Option<ProxyEndpoint>) -> Result<Route, CallError> {
        let Some(endpoint) = endpoint else {
            return Ok(Route {
                client: self.direct.clone(),
                endpoint: None,
            });
        };

        let mut cached = self.proxied.lock();
        if let Some((session_id, client)) = cached.as_ref() {
            if *session_id == endpoint.session_id {
                return Ok(Route {
                    client: client.clone(),
                    endpoint: Some(endpoint),
                });
            }
        }

        let proxy = reqwest::Proxy::all(endpoint.url())
            .map_err(|e| CallError::ProxyUnavailable(e.to_string()))?
            .basic_auth(&endpoint.username, endpoint.password());
        let client = base_builder(self.timeout, self.user_agent.as_deref())
            .proxy(proxy)
            .build()
            .map_err(|e| CallError::ProxyUnavailable(e.to_string()))?;

        // A rotation may have happened since the endpoint was read
        let is_current = self
            .proxies
            .current_session()
            .is_some_and(|s| s.endpoint.session_id == endpoint.session_id);
        if is_current {
            debug!(session_id = %endpoint.session_id, "Built HTTP client for proxy session");
            *cached = Some((endpoint.session_id.clone(), client.clone()));
        } else {
            debug!(session_id = %endpoint.session_id, "Proxy session already rotated, client not cached");
        }

        Ok(Route {
            client,
            endpoint: Some(endpoint),
        })
    }

    /// GET `url` and decode the JSON body
    pub async fn get_json<T>(&self, url: &str, use_proxy: bool) -> Result<T, CallError>
    where
        T: DeserializeOwned,
    {
        let route = self.route(use_proxy)?;
        let request = route.client.get(url);
        send_json(request, route.via_proxy(), url).await
    }

    /// POST a JSON body with bearer authentication and decode the JSON answer
    pub async fn post_json<B, T>(
        &self,
        url: &str,
        bearer: &str,
        body: &B,
        use_proxy: bool,
    ) -> Result<T, CallError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let route = self.route(use_proxy)?;
        let request = route.client.post(url).bearer_auth(bearer).json(body);
        send_json(request, route.via_proxy(), url).await
    }
}

fn base_builder(timeout: Duration, user_agent: Option<&str>) -> reqwest::ClientBuilder {
    let builder = Client::builder().timeout(timeout);
    match user_agent {
        Some(agent) => builder.user_agent(agent),
        None => builder,
    }
}

async fn send_json<T>(request: RequestBuilder, via_proxy: bool, url: &str) -> Result<T, CallError>
where
    T: DeserializeOwned,
{
    let response = request
        .send()
        .await
        .map_err(|e| CallError::from_reqwest(e, via_proxy))?;

    let status = response.status();
    // Wildberries sometimes labels JSON as text, so decode from the raw body
    let text = response
        .text()
        .await
        .map_err(|e| CallError::from_reqwest(e, via_proxy))?;

    if !status.is_success() {
        warn!(url, status = status.as_u16(), "Upstream returned an error status");
        return Err(CallError::Status {
            status: status.as_u16(),
            body: truncate_body(&text),
        });
    }

    serde_json::from_str(&text).map_err(|e| {
        warn!(url, error = %e, "Failed to decode JSON response");
        CallError::InvalidResponse(format!("{e}: {}", truncate_body(&text)))
    })
}

fn truncate_body(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_BODY_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{cut}...")
    }
}
