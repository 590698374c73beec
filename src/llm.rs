//! # LLM Keyword Service
//!
//! Asks an OpenAI-compatible chat completion API (OpenRouter or DeepSeek)
//! for the search keywords a buyer would type to find a product.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, LlmProvider, ProviderSettings};
use crate::errors::{BotError, CallError};
use crate::http_client::OutboundClient;
use crate::retry::{with_backoff, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Keyword extraction through the configured LLM provider
pub struct LlmService {
    http: Arc<OutboundClient>,
    provider: LlmProvider,
    settings: ProviderSettings,
    keywords_count: usize,
    retry: RetryPolicy,
}

impl LlmService {
    pub fn new(config: &AppConfig, http: Arc<OutboundClient>) -> Self {
        Self {
            http,
            provider: config.llm.provider,
            settings: config.llm.active().clone(),
            keywords_count: config.llm.keywords_count,
            retry: config.retry.clone(),
        }
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    /// Chat completion request asking for the product's keywords
    pub fn build_request(&self, product: &Value) -> ChatCompletionRequest {
        build_request(&self.settings.model, self.keywords_count, product)
    }

    /// Extract search keywords for a product card
    ///
    /// The request and the parsing of its answer are retried together, since
    /// a malformed answer is as transient as a network error.
    pub async fn extract_keywords(&self, product: &Value) -> Result<Vec<String>, BotError> {
        let request = self.build_request(product);
        let use_proxy = self.settings.use_proxy;
        info!(
            provider = self.provider.as_str(),
            model = %self.settings.model,
            use_proxy,
            "Requesting keywords from LLM"
        );

        let keywords = with_backoff(
            &self.retry,
            self.http.rotation_for(use_proxy),
            "llm_keywords",
            |attempt| {
                let request = &request;
                async move {
                    debug!(attempt, "Sending chat completion request");
                    let response: ChatCompletionResponse = self
                        .http
                        .post_json(
                            self.provider.endpoint(),
                            &self.settings.api_key,
                            request,
                            use_proxy,
                        )
                        .await?;
                    parse_keywords(&response, self.keywords_count)
                }
            },
        )
        .await?;

        info!(count = keywords.len(), "Successfully parsed keywords");
        Ok(keywords)
    }
}

/// Build the chat completion request for `count` keywords
pub fn build_request(model: &str, count: usize, product: &Value) -> ChatCompletionRequest {
    let system_prompt = format!(
        "You are a marketplace analyst who finds the search queries buyers use.\n\
         Study the product data and pick the {count} most relevant search keywords \
         a buyer on Wildberries would type to find this product.\n\
         Rules:\n\
         1. Return exactly {count} keywords.\n\
         2. Mix generic and specific queries.\n\
         3. Use the product name, description and characteristics.\n\
         4. Answer with a JSON array of strings only, without explanations."
    );
    let user_prompt = format!(
        "Product data:\n\n{product}\n\n\
         Return the {count} most relevant search keywords as a JSON array of strings."
    );

    ChatCompletionRequest {
        model: model.to_string(),
        messages: vec![
            ChatMessage::new("system", system_prompt),
            ChatMessage::new("user", user_prompt),
        ],
    }
}

/// Read the keyword list out of a chat completion answer
pub fn parse_keywords(
    response: &ChatCompletionResponse,
    limit: usize,
) -> Result<Vec<String>, CallError> {
    let content = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_deref())
        .ok_or_else(|| CallError::InvalidResponse("LLM answer has no content".into()))?;

    let body = strip_code_fences(content);
    let parsed: Vec<String> = serde_json::from_str(body)
        .or_else(|_| match (body.find('['), body.rfind(']')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str(&body[start..=end]),
            _ => serde_json::from_str(body),
        })
        .map_err(|e| {
            warn!(error = %e, content = %content, "LLM answer is not a JSON array of strings");
            CallError::InvalidResponse(format!("keywords are not a JSON array: {e}"))
        })?;

    let keywords: Vec<String> = parsed
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .take(limit)
        .collect();

    if keywords.is_empty() {
        return Err(CallError::InvalidResponse("LLM returned no keywords".into()));
    }
    Ok(keywords)
}

/// Remove a surrounding Markdown code block, if any
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the language tag on the opening line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_with(content: &str) -> ChatCompletionResponse {
        serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_plain_array() {
        let response = response_with(r#"["платье летнее", "платье миди", "сарафан"]"#);
        let keywords = parse_keywords(&response, 5).unwrap();
        assert_eq!(keywords, vec!["платье летнее", "платье миди", "сарафан"]);
    }

    #[test]
    fn test_parse_truncates_to_limit() {
        let response = response_with(r#"["a", "b", "c", "d"]"#);
        assert_eq!(parse_keywords(&response, 2).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_fenced_array() {
        let response = response_with("```json\n[\"кроссовки\", \"кеды\"]\n```");
        assert_eq!(parse_keywords(&response, 5).unwrap(), vec!["кроссовки", "кеды"]);
    }

    #[test]
    fn test_parse_array_inside_text() {
        let response = response_with("Here you go: [\"чехол\", \" \", \"чехол iphone\"] hope it helps");
        assert_eq!(parse_keywords(&response, 5).unwrap(), vec!["чехол", "чехол iphone"]);
    }

    #[test]
    fn test_parse_rejects_missing_content() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(matches!(
            parse_keywords(&response, 5),
            Err(CallError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty_and_invalid() {
        assert!(parse_keywords(&response_with("[]"), 5).is_err());
        assert!(parse_keywords(&response_with("no keywords here"), 5).is_err());
        assert!(parse_keywords(&response_with(r#"{"keywords": 1}"#), 5).is_err());
    }

    #[test]
    fn test_build_request_shape() {
        let product = json!({ "imt_name": "Платье", "nm_id": 182803851 });
        let request = build_request("deepseek-chat", 5, &product);

        assert_eq!(request.model, "deepseek-chat");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[1].role, "user");

        let system = request.messages[0].content.as_deref().unwrap();
        assert!(system.contains("exactly 5 keywords"));
        let user = request.messages[1].content.as_deref().unwrap();
        assert!(user.contains("182803851"));
        assert!(user.contains("Платье"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("  [1]  "), "[1]");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("```json\n[\"a\"]\n```"), "[\"a\"]");
    }
}
