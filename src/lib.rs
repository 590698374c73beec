//! # Wildberries Position Bot
//!
//! A Telegram bot that takes a Wildberries product link, asks an LLM for the
//! search keywords buyers would use, and reports the product's position in
//! Wildberries search for each of them. Outbound calls go through a rotating
//! residential proxy session and a shared retry/backoff wrapper.

pub mod bot;
pub mod config;
pub mod errors;
pub mod http_client;
pub mod llm;
pub mod localization;
pub mod models;
pub mod proxy;
pub mod retry;
pub mod url_patterns;
pub mod wildberries;
