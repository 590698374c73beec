//! # Localization Module
//!
//! Fluent message catalogs for the bot's replies. Russian is the default
//! language of the audience; English is available for users whose Telegram
//! client reports it.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Result;
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use unic_langid::LanguageIdentifier;

pub const DEFAULT_LANGUAGE: &str = "ru";
pub const SUPPORTED_LANGUAGES: [&str; 2] = ["ru", "en"];

const RU_MESSAGES: &str = include_str!("../locales/ru/main.ftl");
const EN_MESSAGES: &str = include_str!("../locales/en/main.ftl");

/// Localization manager for the bot
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a new localization manager with all supported languages
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();
        for (lang, source) in [("ru", RU_MESSAGES), ("en", EN_MESSAGES)] {
            let locale: LanguageIdentifier = lang.parse()?;
            bundles.insert(lang.to_string(), Self::create_bundle(locale, source)?);
        }
        Ok(Self { bundles })
    }

    fn create_bundle(
        locale: LanguageIdentifier,
        source: &str,
    ) -> Result<FluentBundle<FluentResource>> {
        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow::anyhow!("Invalid {locale} catalog: {errors:?}"))?;

        let mut bundle = FluentBundle::new_concurrent(vec![locale.clone()]);
        // Telegram renders the isolation marks as visible garbage in some clients
        bundle.set_use_isolating(false);
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow::anyhow!("Duplicate messages in {locale} catalog: {errors:?}"))?;
        Ok(bundle)
    }

    /// Get a localized message in a language, falling back to the default
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        let bundle = match self
            .bundles
            .get(language)
            .or_else(|| self.bundles.get(DEFAULT_LANGUAGE))
        {
            Some(bundle) => bundle,
            None => return format!("Missing translation: {key}"),
        };

        let pattern = match bundle.get_message(key).and_then(|msg| msg.value()) {
            Some(pattern) => pattern,
            None => return format!("Missing translation: {key}"),
        };

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, FluentValue::from(*value));
            }
            fluent_args
        });

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, fluent_args.as_ref(), &mut errors);
        if !errors.is_empty() {
            tracing::debug!(key, ?errors, "Fluent formatting reported errors");
        }
        value.into_owned()
    }

    /// Get a localized message in the default language
    pub fn get_message(&self, key: &str, args: Option<&HashMap<&str, &str>>) -> String {
        self.get_message_in_language(key, DEFAULT_LANGUAGE, args)
    }
}

/// Map a Telegram language code onto a supported language
pub fn detect_language(language_code: Option<&str>) -> &'static str {
    let Some(code) = language_code else {
        return DEFAULT_LANGUAGE;
    };
    let primary = code
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|lang| **lang == primary)
        .copied()
        .unwrap_or(DEFAULT_LANGUAGE)
}

static LOCALIZATION_MANAGER: OnceLock<LocalizationManager> = OnceLock::new();

/// Initialize the global localization manager
pub fn init_localization() -> Result<()> {
    if LOCALIZATION_MANAGER.get().is_none() {
        let manager = LocalizationManager::new()?;
        // A concurrent initializer may have won; both managers are identical
        let _ = LOCALIZATION_MANAGER.set(manager);
    }
    Ok(())
}

/// Get the global localization manager
pub fn get_localization_manager() -> Option<&'static LocalizationManager> {
    LOCALIZATION_MANAGER.get()
}

/// Localized message for a Telegram language code
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    match get_localization_manager() {
        Some(manager) => manager.get_message_in_language(key, detect_language(language_code), None),
        None => format!("Missing translation: {key}"),
    }
}

/// Localized message with arguments for a Telegram language code
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    let args: HashMap<&str, &str> = args.iter().cloned().collect();
    match get_localization_manager() {
        Some(manager) => {
            manager.get_message_in_language(key, detect_language(language_code), Some(&args))
        }
        None => format!("Missing translation: {key}"),
    }
}
