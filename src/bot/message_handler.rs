//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use reqwest::Url;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InputFile, ParseMode};
use tracing::{debug, error, info, warn};

// Import localization
use crate::localization::{t_args_lang, t_lang};

use crate::errors::BotError;
use crate::url_patterns::looks_like_product_link;
use crate::wildberries::{extract_article_id, product_url};

use super::ui_builder::{
    format_keyword_results, format_keyword_results_text, format_product_caption,
    format_product_text,
};
use super::AppState;

/// Command name of a message, without arguments or the `@botname` suffix
pub fn command_of(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    Some(first.split('@').next().unwrap_or(first))
}

/// Catalog key of the message shown for a failed step
pub fn error_message_key<'a>(error: &BotError, fallback: &'a str) -> &'a str {
    match error {
        BotError::ProxyUnavailable(_) => "error-proxy-unavailable",
        _ => fallback,
    }
}

async fn delete_progress(bot: &Bot, progress: &Message) {
    if let Err(e) = bot.delete_message(progress.chat.id, progress.id).await {
        warn!(user_id = %progress.chat.id, error = %e, "Failed to delete progress message");
    }
}

/// Send MarkdownV2, retrying as plain text if Telegram rejects the markup
async fn send_markdown_or_plain(bot: &Bot, chat_id: ChatId, markdown: String, plain: String) -> Result<()> {
    if let Err(e) = bot
        .send_message(chat_id, markdown)
        .parse_mode(ParseMode::MarkdownV2)
        .await
    {
        warn!(user_id = %chat_id, error = %e, "Markdown reply rejected, sending plain text");
        bot.send_message(chat_id, plain).await?;
    }
    Ok(())
}

async fn handle_product_link(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    state: &AppState,
    language_code: Option<&str>,
) -> Result<()> {
    bot.send_chat_action(chat_id, ChatAction::Typing).await?;

    let Some(article) = extract_article_id(text) else {
        debug!(user_id = %chat_id, "Message mentions the catalog but has no article");
        bot.send_message(chat_id, t_lang("error-invalid-link", language_code))
            .await?;
        return Ok(());
    };

    info!(user_id = %chat_id, article, "Starting product analysis");
    let progress = bot
        .send_message(
            chat_id,
            t_args_lang(
                "progress-analyzing",
                &[("article", &article.to_string())],
                language_code,
            ),
        )
        .await?;

    let product_data = match state.wildberries.get_product_data(article).await {
        Ok(data) => data,
        Err(e) => {
            warn!(user_id = %chat_id, article, error = %e, "Failed to fetch product card");
            delete_progress(bot, &progress).await;
            bot.send_message(
                chat_id,
                t_lang(error_message_key(&e, "error-product-data"), language_code),
            )
            .await?;
            return Ok(());
        }
    };

    bot.edit_message_text(chat_id, progress.id, t_lang("progress-keywords", language_code))
        .await?;

    let keywords = match state.llm.extract_keywords(&product_data).await {
        Ok(keywords) => keywords,
        Err(e) => {
            error!(user_id = %chat_id, article, error = %e, "Keyword extraction failed");
            delete_progress(bot, &progress).await;
            bot.send_message(
                chat_id,
                t_lang(error_message_key(&e, "error-analysis-failed"), language_code),
            )
            .await?;
            return Ok(());
        }
    };

    bot.edit_message_text(
        chat_id,
        progress.id,
        t_args_lang(
            "progress-searching",
            &[("count", &keywords.len().to_string())],
            language_code,
        ),
    )
    .await?;

    let analysis = state
        .wildberries
        .analyze_product_keywords(article, &product_url(article), &keywords)
        .await;

    delete_progress(bot, &progress).await;

    let caption = format_product_caption(&analysis.product, language_code);
    let photo_sent = match Url::parse(&analysis.product.image_url) {
        Ok(image) => match bot
            .send_photo(chat_id, InputFile::url(image))
            .caption(caption.clone())
            .parse_mode(ParseMode::MarkdownV2)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(user_id = %chat_id, article, error = %e, "Failed to send product photo, falling back to text");
                false
            }
        },
        Err(e) => {
            warn!(user_id = %chat_id, article, error = %e, "Invalid product image URL");
            false
        }
    };
    if !photo_sent {
        send_markdown_or_plain(
            bot,
            chat_id,
            caption,
            format_product_text(&analysis.product, language_code),
        )
        .await?;
    }

    let limit = state.position_limit();
    send_markdown_or_plain(
        bot,
        chat_id,
        format_keyword_results(&analysis.results, limit, language_code),
        format_keyword_results_text(&analysis.results, limit, language_code),
    )
    .await?;

    info!(
        user_id = %chat_id,
        article,
        keywords = analysis.keywords.len(),
        found = analysis.found_count(),
        "Product analysis delivered"
    );
    Ok(())
}

async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    text: &str,
    state: &AppState,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, message_length = text.len(), "Received text message from user");

    match command_of(text) {
        Some("/start") => {
            bot.send_message(msg.chat.id, t_lang("welcome", language_code))
                .await?;
        }
        Some("/help") => {
            let limit = state.position_limit().to_string();
            let help_message = [
                t_args_lang("help", &[("limit", &limit)], language_code),
                t_lang("help-commands", language_code),
            ]
            .join("\n\n");
            bot.send_message(msg.chat.id, help_message).await?;
        }
        _ if looks_like_product_link(text) => {
            if let Err(e) = handle_product_link(bot, msg.chat.id, text, state, language_code).await {
                error!(user_id = %msg.chat.id, error = %e, "Unexpected error while analyzing product");
                bot.send_message(
                    msg.chat.id,
                    t_args_lang("error-generic", &[("error", &e.to_string())], language_code),
                )
                .await?;
            }
        }
        _ => {
            bot.send_message(msg.chat.id, t_lang("link-hint", language_code))
                .await?;
        }
    }
    Ok(())
}

async fn handle_unsupported_message(
    bot: &Bot,
    msg: &Message,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id = %msg.chat.id, "Received unsupported message type from user");
    bot.send_message(msg.chat.id, t_lang("link-hint", language_code))
        .await?;
    Ok(())
}

pub async fn message_handler(bot: Bot, msg: Message, state: Arc<AppState>) -> Result<()> {
    // Extract user's language code from Telegram
    let language_code = msg
        .from
        .as_ref()
        .and_then(|user| user.language_code.as_ref())
        .map(|s| s.as_str());

    match msg.text() {
        Some(text) => handle_text_message(&bot, &msg, text, &state, language_code).await,
        None => handle_unsupported_message(&bot, &msg, language_code).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CallError;

    #[test]
    fn test_command_of() {
        assert_eq!(command_of("/start"), Some("/start"));
        assert_eq!(command_of("  /help please"), Some("/help"));
        assert_eq!(command_of("/start@wb_position_bot"), Some("/start"));
        assert_eq!(command_of("https://www.wildberries.ru/catalog/1/detail.aspx"), None);
        assert_eq!(command_of(""), None);
    }

    #[test]
    fn test_error_message_key() {
        let proxy = BotError::ProxyUnavailable("no credentials".into());
        assert_eq!(error_message_key(&proxy, "error-product-data"), "error-proxy-unavailable");

        let exhausted = BotError::RetriesExhausted {
            attempts: 3,
            last: CallError::Timeout("slow".into()),
        };
        assert_eq!(error_message_key(&exhausted, "error-analysis-failed"), "error-analysis-failed");
    }
}
