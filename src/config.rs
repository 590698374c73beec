//! # Configuration Module
//!
//! This module defines the bot configuration: Telegram, LLM providers,
//! Wildberries search, proxy and retry settings. Values come from the
//! environment (optionally seeded from a `.env` file) and fall back to the
//! defaults below.

use std::env;
use std::str::FromStr;

use crate::errors::BotError;
use crate::retry::RetryPolicy;

// Defaults for search settings
pub const DEFAULT_KEYWORDS_COUNT: usize = 5;
pub const DEFAULT_MAX_SEARCH_PAGES: u32 = 5;
pub const DEFAULT_MAX_POSITION_LIMIT: u32 = 500;

// Defaults for PIA proxy settings
pub const DEFAULT_PIA_HOST: &str = "ms94o76z.proxy.piaproxy.co";
pub const DEFAULT_PIA_PORT: u16 = 5000;
pub const DEFAULT_PIA_REGION: &str = "ru";
pub const DEFAULT_PIA_SESSION_TIME: u32 = 10080; // provider-side stickiness, minutes
pub const DEFAULT_PROXY_TIMEOUT_MINUTES: u64 = 2;

pub const DEFAULT_OPENROUTER_MODEL: &str = "anthropic/claude-3-haiku-20240229";
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-chat";

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    OpenRouter,
    DeepSeek,
}

impl LlmProvider {
    /// Parse a provider name; unknown names fall back to OpenRouter
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "deepseek" => Self::DeepSeek,
            "openrouter" => Self::OpenRouter,
            other => {
                tracing::warn!(provider = %other, "Unknown LLM provider, using OpenRouter");
                Self::OpenRouter
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::DeepSeek => "deepseek",
        }
    }

    /// Chat completions endpoint of the provider
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
            Self::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
        }
    }
}

/// Credentials and routing for one LLM provider
#[derive(Clone, Default)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    /// Route this provider's calls through the proxy manager
    pub use_proxy: bool,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("use_proxy", &self.use_proxy)
            .finish()
    }
}

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub openrouter: ProviderSettings,
    pub deepseek: ProviderSettings,
    /// Number of keywords requested from the model
    pub keywords_count: usize,
}

impl LlmConfig {
    /// Settings of the selected provider
    pub fn active(&self) -> &ProviderSettings {
        match self.provider {
            LlmProvider::OpenRouter => &self.openrouter,
            LlmProvider::DeepSeek => &self.deepseek,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            openrouter: ProviderSettings {
                model: DEFAULT_OPENROUTER_MODEL.to_string(),
                ..Default::default()
            },
            deepseek: ProviderSettings {
                model: DEFAULT_DEEPSEEK_MODEL.to_string(),
                ..Default::default()
            },
            keywords_count: DEFAULT_KEYWORDS_COUNT,
        }
    }
}

/// Wildberries search configuration
#[derive(Debug, Clone)]
pub struct WildberriesConfig {
    pub region: String,
    pub use_proxy: bool,
    /// Pages of search results walked per keyword
    pub max_search_pages: u32,
    /// Positions beyond this are reported as "below the limit"
    pub max_position_limit: u32,
}

impl Default for WildberriesConfig {
    fn default() -> Self {
        Self {
            region: "ru".to_string(),
            use_proxy: false,
            max_search_pages: DEFAULT_MAX_SEARCH_PAGES,
            max_position_limit: DEFAULT_MAX_POSITION_LIMIT,
        }
    }
}

/// Rotating PIA proxy configuration
#[derive(Clone)]
pub struct ProxyConfig {
    /// Master switch; when off every call goes direct
    pub enabled: bool,
    /// Session lifetime before a forced rotation
    pub timeout_minutes: u64,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Exit region embedded in the proxy username
    pub region: String,
    /// Provider-side session stickiness embedded in the proxy username
    pub session_time_minutes: u32,
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("enabled", &self.enabled)
            .field("timeout_minutes", &self.timeout_minutes)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("region", &self.region)
            .field("session_time_minutes", &self.session_time_minutes)
            .finish()
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_minutes: DEFAULT_PROXY_TIMEOUT_MINUTES,
            host: DEFAULT_PIA_HOST.to_string(),
            port: DEFAULT_PIA_PORT,
            username: String::new(),
            password: String::new(),
            region: DEFAULT_PIA_REGION.to_string(),
            session_time_minutes: DEFAULT_PIA_SESSION_TIME,
        }
    }
}

impl ProxyConfig {
    /// Check the proxy settings; credentials are only required when enabled
    pub fn validate(&self) -> Result<(), BotError> {
        if !self.enabled {
            return Ok(());
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(BotError::Config(
                "PIA_USERNAME and PIA_PASSWORD must be set when PROXY_ENABLED is true".into(),
            ));
        }
        if self.host.is_empty() {
            return Err(BotError::Config("PIA_BASE_HOST must not be empty".into()));
        }
        if self.timeout_minutes == 0 {
            return Err(BotError::Config(
                "PROXY_TIMEOUT_MINUTES must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Logging output settings
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
}

impl LogConfig {
    /// Logging settings alone, so tracing can start before the rest is parsed
    pub fn from_env() -> Self {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            json: lookup("LOG_FORMAT")
                .is_some_and(|f| f.trim().eq_ignore_ascii_case("json")),
        }
    }
}

/// Complete application configuration
#[derive(Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub llm: LlmConfig,
    pub wildberries: WildberriesConfig,
    pub proxy: ProxyConfig,
    pub retry: RetryPolicy,
    pub log: LogConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bot_token", &"<redacted>")
            .field("llm", &self.llm)
            .field("wildberries", &self.wildberries)
            .field("proxy", &self.proxy)
            .field("retry", &self.retry)
            .field("log", &self.log)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, BotError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = get("BOT_TOKEN")
            .or_else(|| get("TELEGRAM_BOT_TOKEN"))
            .ok_or_else(|| BotError::Config("BOT_TOKEN must be set".into()))?;

        let llm_defaults = LlmConfig::default();
        let llm = LlmConfig {
            provider: get("LLM_PROVIDER")
                .map(|p| LlmProvider::from_name(&p))
                .unwrap_or_default(),
            openrouter: ProviderSettings {
                api_key: get("OPENROUTER_API_KEY").unwrap_or_default(),
                model: get("OPENROUTER_MODEL").unwrap_or(llm_defaults.openrouter.model),
                use_proxy: parse_bool(&get, "OPENROUTER_USE_PROXY", false)?,
            },
            deepseek: ProviderSettings {
                api_key: get("DEEPSEEK_API_KEY").unwrap_or_default(),
                model: get("DEEPSEEK_MODEL").unwrap_or(llm_defaults.deepseek.model),
                use_proxy: parse_bool(&get, "DEEPSEEK_USE_PROXY", false)?,
            },
            keywords_count: parse_num(&get, "SEARCH_KEYWORDS_COUNT", DEFAULT_KEYWORDS_COUNT)?,
        };

        let wildberries = WildberriesConfig {
            region: get("WB_REGION").unwrap_or_else(|| "ru".to_string()),
            use_proxy: parse_bool(&get, "WB_USE_PROXY", false)?,
            max_search_pages: parse_num(&get, "MAX_SEARCH_PAGES", DEFAULT_MAX_SEARCH_PAGES)?,
            max_position_limit: parse_num(&get, "MAX_POSITION_LIMIT", DEFAULT_MAX_POSITION_LIMIT)?,
        };

        let proxy = ProxyConfig {
            enabled: parse_bool(&get, "PROXY_ENABLED", false)?,
            timeout_minutes: parse_num(
                &get,
                "PROXY_TIMEOUT_MINUTES",
                DEFAULT_PROXY_TIMEOUT_MINUTES,
            )?,
            host: get("PIA_BASE_HOST").unwrap_or_else(|| DEFAULT_PIA_HOST.to_string()),
            port: parse_num(&get, "PIA_PORT", DEFAULT_PIA_PORT)?,
            username: get("PIA_USERNAME").unwrap_or_default(),
            password: get("PIA_PASSWORD").unwrap_or_default(),
            region: get("PIA_REGION").unwrap_or_else(|| DEFAULT_PIA_REGION.to_string()),
            session_time_minutes: parse_num(&get, "PIA_SESSION_TIME", DEFAULT_PIA_SESSION_TIME)?,
        };

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse_num(&get, "LLM_MAX_RETRIES", retry_defaults.max_retries)?,
            initial_backoff_secs: parse_num(
                &get,
                "LLM_INITIAL_BACKOFF",
                retry_defaults.initial_backoff_secs,
            )?,
            max_backoff_secs: parse_num(&get, "LLM_MAX_BACKOFF", retry_defaults.max_backoff_secs)?,
            backoff_factor: parse_num(&get, "LLM_BACKOFF_FACTOR", retry_defaults.backoff_factor)?,
            jitter: parse_bool(&get, "LLM_BACKOFF_JITTER", retry_defaults.jitter)?,
        };

        let log = LogConfig::from_lookup(&lookup);

        let config = Self {
            bot_token,
            llm,
            wildberries,
            proxy,
            retry,
            log,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the bot cannot run with
    pub fn validate(&self) -> Result<(), BotError> {
        self.proxy.validate()?;
        self.retry.validate()?;

        if self.llm.active().api_key.is_empty() {
            return Err(BotError::Config(format!(
                "API key for LLM provider '{}' must be set",
                self.llm.provider.as_str()
            )));
        }
        if self.llm.keywords_count == 0 {
            return Err(BotError::Config(
                "SEARCH_KEYWORDS_COUNT must be greater than zero".into(),
            ));
        }
        if self.wildberries.max_search_pages == 0 {
            return Err(BotError::Config(
                "MAX_SEARCH_PAGES must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_num<T, F>(get: &F, key: &str, default: T) -> Result<T, BotError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BotError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

fn parse_bool<F>(get: &F, key: &str, default: bool) -> Result<bool, BotError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(BotError::Config(format!("{key} must be a boolean, got: {raw}"))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_only_required_values_set() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("OPENROUTER_API_KEY", "sk-test"),
        ]))
        .unwrap();

        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.llm.provider, LlmProvider::OpenRouter);
        assert_eq!(config.llm.keywords_count, 5);
        assert_eq!(config.wildberries.max_search_pages, 5);
        assert_eq!(config.wildberries.max_position_limit, 500);
        assert!(!config.proxy.enabled);
        assert_eq!(config.proxy.timeout_minutes, 2);
        assert_eq!(config.proxy.port, 5000);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff_secs, 2.0);
        assert_eq!(config.retry.max_backoff_secs, 60.0);
        assert_eq!(config.retry.backoff_factor, 2.0);
    }

    #[test]
    fn test_missing_bot_token_is_fatal() {
        let result = AppConfig::from_lookup(lookup(&[("OPENROUTER_API_KEY", "sk-test")]));
        assert!(matches!(result, Err(BotError::Config(_))));
    }

    #[test]
    fn test_telegram_token_alias() {
        let config = AppConfig::from_lookup(lookup(&[
            ("TELEGRAM_BOT_TOKEN", "42:xyz"),
            ("OPENROUTER_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(config.bot_token, "42:xyz");
    }

    #[test]
    fn test_proxy_enabled_without_credentials_is_fatal() {
        let result = AppConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("OPENROUTER_API_KEY", "sk-test"),
            ("PROXY_ENABLED", "True"),
        ]));
        assert!(matches!(result, Err(BotError::Config(_))));
    }

    #[test]
    fn test_proxy_settings_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("DEEPSEEK_API_KEY", "ds-key"),
            ("LLM_PROVIDER", "DeepSeek"),
            ("DEEPSEEK_USE_PROXY", "true"),
            ("PROXY_ENABLED", "true"),
            ("PROXY_TIMEOUT_MINUTES", "7"),
            ("PIA_USERNAME", "user"),
            ("PIA_PASSWORD", "secret"),
            ("PIA_PORT", "6000"),
            ("WB_USE_PROXY", "1"),
        ]))
        .unwrap();

        assert_eq!(config.llm.provider, LlmProvider::DeepSeek);
        assert!(config.llm.active().use_proxy);
        assert_eq!(config.llm.active().model, "deepseek-chat");
        assert!(config.proxy.enabled);
        assert_eq!(config.proxy.timeout_minutes, 7);
        assert_eq!(config.proxy.port, 6000);
        assert!(config.wildberries.use_proxy);
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let result = AppConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("OPENROUTER_API_KEY", "sk-test"),
            ("LLM_MAX_RETRIES", "many"),
        ]));
        match result {
            Err(BotError::Config(msg)) => assert!(msg.contains("LLM_MAX_RETRIES")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_backoff_is_fatal_at_startup() {
        let result = AppConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("OPENROUTER_API_KEY", "sk-test"),
            ("LLM_INITIAL_BACKOFF", "1e20"),
            ("LLM_MAX_BACKOFF", "1e20"),
        ]));
        match result {
            Err(BotError::Config(msg)) => assert!(msg.contains("LLM_MAX_BACKOFF")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_log_config_reads_only_log_format() {
        // Parsed on its own before the full configuration, even when it is invalid
        assert!(LogConfig::from_lookup(&lookup(&[("LOG_FORMAT", "JSON")])).json);
        assert!(!LogConfig::from_lookup(&lookup(&[("LOG_FORMAT", "pretty")])).json);
        assert!(!LogConfig::from_lookup(&lookup(&[])).json);
    }

    #[test]
    fn test_missing_api_key_for_selected_provider() {
        let result = AppConfig::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("OPENROUTER_API_KEY", "sk-test"),
            ("LLM_PROVIDER", "deepseek"),
        ]));
        assert!(matches!(result, Err(BotError::Config(_))));
    }

    #[test]
    fn test_unknown_provider_falls_back_to_openrouter() {
        assert_eq!(LlmProvider::from_name("gpt-magic"), LlmProvider::OpenRouter);
        assert_eq!(LlmProvider::from_name(" deepseek "), LlmProvider::DeepSeek);
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let proxy = ProxyConfig {
            password: "hunter2".to_string(),
            ..Default::default()
        };
        assert!(!format!("{proxy:?}").contains("hunter2"));

        let provider = ProviderSettings {
            api_key: "sk-very-secret".to_string(),
            ..Default::default()
        };
        assert!(!format!("{provider:?}").contains("sk-very-secret"));
    }
}
