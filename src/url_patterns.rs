//! # URL Patterns Module
//!
//! This module contains regex patterns used to recognize Wildberries product links.

use lazy_static::lazy_static;
use regex::Regex;

/// Marker that makes a message look like a product link
pub const PRODUCT_LINK_MARKER: &str = "wildberries.ru/catalog";

// Product page link, capturing the article number
pub const PRODUCT_URL_PATTERN: &str = r"wildberries\.ru/catalog/(\d+)/detail\.aspx";

// Lazy static regex for product links to avoid recompilation
lazy_static! {
    pub static ref PRODUCT_URL_REGEX: Regex =
        Regex::new(PRODUCT_URL_PATTERN).expect("Product URL pattern should be valid");
}

/// Whether the text mentions a Wildberries catalog link at all
pub fn looks_like_product_link(text: &str) -> bool {
    text.contains(PRODUCT_LINK_MARKER)
}
