//! Generation options: locale, value formats and translations
//!
//! Options are read-only during a run. They can be built in code with the
//! `with_*` methods or loaded from a TOML file:
//!
//! ```toml
//! [locale]
//! tag = "de-DE"
//!
//! [formats]
//! date = "%d.%m.%Y"
//! float = { decimals = 2, grouping = true }
//!
//! [translations]
//! ACTIVE = "Aktiv"
//!
//! [resolution]
//! deferred_timeout_ms = 2000
//! fallback = "-"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::placeholder::FALLBACK;
use crate::resolve::{CustomRegistry, Formatter, Formatters, Locale, ResolutionSettings, Translator, ValueKind};

/// Errors that can occur when loading options
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Failed to read options file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse options TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Settings that shape how resolved values are rendered
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub locale: Locale,
    pub formatters: Formatters,
    /// Replacement text for enumerated and boolean values
    pub translations: HashMap<String, String>,
    /// Upper bound for waiting on a deferred value
    pub deferred_timeout: Duration,
    /// Text rendered for placeholders that resolve to nothing
    pub fallback: String,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            formatters: Formatters::default(),
            translations: HashMap::new(),
            deferred_timeout: Duration::from_secs(5),
            fallback: FALLBACK.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TomlOptions {
    locale: Option<TomlLocale>,
    formats: Option<TomlFormats>,
    translations: Option<HashMap<String, String>>,
    resolution: Option<TomlResolution>,
}

#[derive(Deserialize)]
struct TomlLocale {
    tag: String,
    decimal_separator: Option<char>,
    grouping_separator: Option<char>,
}

#[derive(Deserialize)]
struct TomlFormats {
    date: Option<String>,
    datetime: Option<String>,
    time: Option<String>,
    float: Option<TomlNumber>,
    int: Option<TomlNumber>,
}

#[derive(Deserialize)]
struct TomlNumber {
    decimals: Option<usize>,
    #[serde(default)]
    grouping: bool,
}

#[derive(Deserialize)]
struct TomlResolution {
    deferred_timeout_ms: Option<u64>,
    fallback: Option<String>,
}

impl GenerationOptions {
    /// Load options from TOML file
    pub fn from_file(path: &Path) -> Result<Self, OptionsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load options from TOML string; omitted sections keep their defaults
    pub fn from_str(content: &str) -> Result<Self, OptionsError> {
        let parsed: TomlOptions = toml::from_str(content)?;
        let mut options = Self::default();

        if let Some(locale) = parsed.locale {
            let preset = Locale::from_tag(&locale.tag);
            let decimal = locale.decimal_separator.unwrap_or(preset.decimal_separator());
            let grouping = locale.grouping_separator.unwrap_or(preset.grouping_separator());
            options.locale = preset.with_separators(decimal, grouping);
        }

        if let Some(formats) = parsed.formats {
            let patterns = [
                (ValueKind::Date, formats.date),
                (ValueKind::DateTime, formats.datetime),
                (ValueKind::Time, formats.time),
            ];
            for (kind, pattern) in patterns {
                if let Some(pattern) = pattern {
                    options.formatters.set(kind, Formatter::Pattern(pattern));
                }
            }
            for (kind, number) in [(ValueKind::Float, formats.float), (ValueKind::Int, formats.int)] {
                if let Some(number) = number {
                    options.formatters.set(
                        kind,
                        Formatter::Number {
                            decimals: number.decimals,
                            grouping: number.grouping,
                        },
                    );
                }
            }
        }

        if let Some(translations) = parsed.translations {
            options.translations = translations;
        }

        if let Some(resolution) = parsed.resolution {
            if let Some(ms) = resolution.deferred_timeout_ms {
                options.deferred_timeout = Duration::from_millis(ms);
            }
            if let Some(fallback) = resolution.fallback {
                options.fallback = fallback;
            }
        }
        Ok(options)
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_formatter(mut self, kind: ValueKind, formatter: Formatter) -> Self {
        self.formatters.set(kind, formatter);
        self
    }

    pub fn with_translation(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.translations.insert(from.into(), to.into());
        self
    }

    pub fn with_deferred_timeout(mut self, timeout: Duration) -> Self {
        self.deferred_timeout = timeout;
        self
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Translation function over the configured table; unknown text passes through
    pub fn translator(&self) -> Option<Translator> {
        if self.translations.is_empty() {
            return None;
        }
        let table = self.translations.clone();
        Some(Arc::new(move |text: &str| {
            table.get(text).cloned().unwrap_or_else(|| text.to_string())
        }))
    }

    /// Settings for a property resolver using these options and `registry`
    pub fn resolution_settings(&self, registry: CustomRegistry) -> ResolutionSettings {
        ResolutionSettings {
            formatters: self.formatters.clone(),
            locale: self.locale.clone(),
            translator: self.translator(),
            registry,
            deferred_timeout: self.deferred_timeout,
        }
    }
}
