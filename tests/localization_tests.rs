//! # Localization Tests
//!
//! This module contains unit tests for the localization functionality,
//! testing message retrieval, argument substitution and language fallback.

use std::collections::HashMap;
use wb_position_bot::localization::{
    detect_language, init_localization, t_args_lang, t_lang, LocalizationManager,
    SUPPORTED_LANGUAGES,
};

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() -> LocalizationManager {
        // Create a new localization manager for each test
        LocalizationManager::new().expect("Failed to create localization manager")
    }

    const BOT_KEYS: [&str; 21] = [
        "welcome",
        "help",
        "help-commands",
        "link-hint",
        "progress-analyzing",
        "progress-keywords",
        "progress-searching",
        "caption-brand",
        "caption-price",
        "caption-rating",
        "caption-feedbacks",
        "caption-id",
        "caption-results",
        "results-title",
        "result-position",
        "result-below-limit",
        "error-invalid-link",
        "error-product-data",
        "error-analysis-failed",
        "error-proxy-unavailable",
        "error-generic",
    ];

    /// Test that every key used by the bot exists in every catalog
    #[test]
    fn test_all_bot_keys_are_translated() {
        let manager = setup_localization();

        for lang in SUPPORTED_LANGUAGES {
            for key in BOT_KEYS {
                let message = manager.get_message_in_language(key, lang, None);
                assert!(
                    !message.starts_with("Missing translation:"),
                    "{key} is missing in {lang}"
                );
            }
        }
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("help-commands", "en", None);
        assert!(message.contains("Commands"));
        assert!(message.contains("/start"));
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("nonexistent-key", "en", None);
        assert_eq!(message, "Missing translation: nonexistent-key");
    }

    #[test]
    fn test_get_message_unsupported_language() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("help-commands", "de", None);
        // Should fall back to Russian
        assert!(message.contains("Команды"));
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = setup_localization();

        let mut args = HashMap::new();
        args.insert("article", "182803851");
        let message = manager.get_message_in_language("progress-analyzing", "en", Some(&args));
        assert!(message.contains("182803851"));
        // No Unicode isolation marks around placeables
        assert!(!message.contains('\u{2068}'));

        let mut args = HashMap::new();
        args.insert("limit", "500");
        let message = manager.get_message_in_language("help", "ru", Some(&args));
        assert!(message.contains("топ-500"));
    }

    #[test]
    fn test_default_language_is_russian() {
        let manager = setup_localization();

        let message = manager.get_message("result-position", None);
        assert_eq!(message, "позиция");
    }

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language(Some("en")), "en");
        assert_eq!(detect_language(Some("en-US")), "en");
        assert_eq!(detect_language(Some("RU")), "ru");
        assert_eq!(detect_language(Some("uk")), "ru");
        assert_eq!(detect_language(None), "ru");
    }

    #[test]
    fn test_global_helpers() {
        init_localization().expect("Failed to initialize localization");

        assert_eq!(t_lang("result-position", Some("en-GB")), "position");
        assert_eq!(
            t_args_lang("result-below-limit", &[("limit", "500")], Some("en")),
            "below 500"
        );
        assert_eq!(
            t_args_lang("result-below-limit", &[("limit", "500")], None),
            "ниже 500"
        );
    }
}
