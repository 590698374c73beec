//! UI Builder module for formatting analysis replies
//!
//! Every reply comes in two renderings: MarkdownV2 for the normal send and
//! plain text for the fallback when Telegram rejects the markup.

use teloxide::utils::markdown::{bold, escape, link};

use crate::localization::{t_args_lang, t_lang};
use crate::models::{ProductDetails, SearchResult};

/// Format a price in roubles, dropping kopecks when there are none
pub fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{price:.0} ₽")
    } else {
        format!("{price:.2} ₽")
    }
}

/// Label/value lines between the product name and the ID line
fn caption_fields(product: &ProductDetails, language_code: Option<&str>) -> Vec<String> {
    let mut fields = Vec::new();
    if !product.brand.is_empty() {
        fields.push(format!("{}: {}", t_lang("caption-brand", language_code), product.brand));
    }
    fields.push(format!(
        "{}: {}",
        t_lang("caption-price", language_code),
        format_price(product.price)
    ));
    fields.push(format!("{}: {:.1}", t_lang("caption-rating", language_code), product.rating));
    fields.push(format!(
        "{}: {}",
        t_lang("caption-feedbacks", language_code),
        product.feedbacks
    ));
    fields
}

/// MarkdownV2 caption for the product photo
pub fn format_product_caption(product: &ProductDetails, language_code: Option<&str>) -> String {
    let mut caption = format!("{}\n\n", bold(&escape(&product.name)));
    for field in caption_fields(product, language_code) {
        caption.push_str(&escape(&field));
        caption.push('\n');
    }
    caption.push_str(&format!(
        "{}: {}\n\n",
        escape(&t_lang("caption-id", language_code)),
        link(&product.url, &product.id.to_string())
    ));
    caption.push_str(&escape(&t_lang("caption-results", language_code)));
    caption
}

/// Plain-text version of [`format_product_caption`]
pub fn format_product_text(product: &ProductDetails, language_code: Option<&str>) -> String {
    let mut text = format!("{}\n\n", product.name);
    for field in caption_fields(product, language_code) {
        text.push_str(&field);
        text.push('\n');
    }
    text.push_str(&format!(
        "{}: {} ({})\n\n",
        t_lang("caption-id", language_code),
        product.id,
        product.url
    ));
    text.push_str(&t_lang("caption-results", language_code));
    text
}

fn result_lines(results: &[SearchResult], limit: u32, language_code: Option<&str>) -> Vec<String> {
    let limit = limit.to_string();
    results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            let position = match result.position {
                Some(position) => {
                    format!("{} {}", t_lang("result-position", language_code), position)
                }
                None => t_args_lang("result-below-limit", &[("limit", &limit)], language_code),
            };
            format!("{}. {}: {}", i + 1, result.keyword, position)
        })
        .collect()
}

/// MarkdownV2 numbered keyword list with the position found for each keyword
pub fn format_keyword_results(
    results: &[SearchResult],
    limit: u32,
    language_code: Option<&str>,
) -> String {
    let mut message = format!("{}\n\n", bold(&escape(&t_lang("results-title", language_code))));
    for line in result_lines(results, limit, language_code) {
        message.push_str(&escape(&line));
        message.push('\n');
    }
    message
}

/// Plain-text version of [`format_keyword_results`]
pub fn format_keyword_results_text(
    results: &[SearchResult],
    limit: u32,
    language_code: Option<&str>,
) -> String {
    let mut message = format!("{}\n\n", t_lang("results-title", language_code));
    for line in result_lines(results, limit, language_code) {
        message.push_str(&line);
        message.push('\n');
    }
    message
}
