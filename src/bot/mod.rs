//! Bot module for handling Telegram interactions
//!
//! This module is split into two submodules:
//! - `message_handler`: Handles commands, product links and everything else
//! - `ui_builder`: Formats product captions and keyword results

pub mod message_handler;
pub mod ui_builder;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::AppConfig;
use crate::errors::BotError;
use crate::http_client::{OutboundClient, BROWSER_USER_AGENT};
use crate::llm::LlmService;
use crate::proxy::ProxySessionManager;
use crate::wildberries::WildberriesService;

// Re-export main handler function for use in main.rs
pub use message_handler::message_handler;
pub use ui_builder::{
    format_keyword_results, format_keyword_results_text, format_product_caption,
    format_product_text,
};

/// Per-request timeout for LLM completions
pub const LLM_TIMEOUT: Duration = Duration::from_secs(15);
/// Per-request timeout for Wildberries endpoints
pub const WILDBERRIES_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state injected into every handler
pub struct AppState {
    pub config: AppConfig,
    pub llm: LlmService,
    pub wildberries: WildberriesService,
    pub proxies: Arc<ProxySessionManager>,
}

impl AppState {
    /// Wire the proxy manager, HTTP clients and services from configuration
    pub fn new(config: AppConfig) -> Result<Self, BotError> {
        let proxies = Arc::new(ProxySessionManager::new(config.proxy.clone())?);

        let llm_http = Arc::new(OutboundClient::new(Arc::clone(&proxies), LLM_TIMEOUT, None)?);
        let wb_http = Arc::new(OutboundClient::new(
            Arc::clone(&proxies),
            WILDBERRIES_TIMEOUT,
            Some(BROWSER_USER_AGENT),
        )?);

        let llm = LlmService::new(&config, llm_http);
        let wildberries = WildberriesService::new(&config, wb_http);

        info!(
            provider = llm.provider().as_str(),
            proxy_enabled = proxies.is_enabled(),
            llm_use_proxy = config.llm.active().use_proxy,
            wb_use_proxy = config.wildberries.use_proxy,
            "Application state initialized"
        );

        Ok(Self {
            config,
            llm,
            wildberries,
            proxies,
        })
    }

    /// Position limit shown in help and results
    pub fn position_limit(&self) -> u32 {
        self.config.wildberries.max_position_limit
    }
}
