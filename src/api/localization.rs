//! Localized message lookup.
//!
//! Catalogs are flat YAML maps from message key to template, embedded in the
//! binary and parsed once at startup. Templates use positional placeholders
//! (`{0}`, `{1}`, ...).
//!
//! A lookup that misses in the requested culture falls back to the default
//! culture, then to the key itself.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

const EN_CATALOG: &str = include_str!("../../resources/locales/en.yaml");
const RU_CATALOG: &str = include_str!("../../resources/locales/ru.yaml");

// =============================================================================
// Locale
// =============================================================================

/// Supported request cultures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Locale {
    En,
    #[default]
    Ru,
}

impl Locale {
    /// Every supported culture.
    pub const ALL: [Self; 2] = [Self::En, Self::Ru];

    /// Two-letter culture tag.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
        }
    }

    /// Matches a language tag by its primary subtag, e.g. `en-US` or `RU`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let primary = tag.trim().split(['-', '_']).next()?;
        Self::ALL
            .into_iter()
            .find(|locale| locale.tag().eq_ignore_ascii_case(primary))
    }
}

impl Display for Locale {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.tag())
    }
}

impl FromStr for Locale {
    type Err = LocalizationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_tag(value).ok_or_else(|| LocalizationError::UnsupportedCulture(value.to_string()))
    }
}

// =============================================================================
// Message Keys
// =============================================================================

/// Keys of every localized message the API emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    NotFoundOrder,
    NotFoundOrderDesc,
    ApiNotFound,
    ApiNotFoundDetail,
    Title400,
    Detail,
    Title500,
    Detail500,
    WeightGreaterThanZero,
    DeliveryTimeInFuture,
    CityDistrictNotEmpty,
    MalformedBody,
    MalformedQuery,
    MalformedId,
}

impl MessageKey {
    pub const ALL: [Self; 14] = [
        Self::NotFoundOrder,
        Self::NotFoundOrderDesc,
        Self::ApiNotFound,
        Self::ApiNotFoundDetail,
        Self::Title400,
        Self::Detail,
        Self::Title500,
        Self::Detail500,
        Self::WeightGreaterThanZero,
        Self::DeliveryTimeInFuture,
        Self::CityDistrictNotEmpty,
        Self::MalformedBody,
        Self::MalformedQuery,
        Self::MalformedId,
    ];

    /// Catalog key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFoundOrder => "NotFoundOrder",
            Self::NotFoundOrderDesc => "NotFoundOrderDesc",
            Self::ApiNotFound => "ApiNotFound",
            Self::ApiNotFoundDetail => "ApiNotFoundDetail",
            Self::Title400 => "Title400",
            Self::Detail => "Detail",
            Self::Title500 => "Title500",
            Self::Detail500 => "Detail500",
            Self::WeightGreaterThanZero => "WeightGreaterThanZero",
            Self::DeliveryTimeInFuture => "DeliveryTimeInFuture",
            Self::CityDistrictNotEmpty => "CityDistrictNotEmpty",
            Self::MalformedBody => "MalformedBody",
            Self::MalformedQuery => "MalformedQuery",
            Self::MalformedId => "MalformedId",
        }
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while loading catalogs or resolving cultures.
#[derive(Debug, Error)]
pub enum LocalizationError {
    /// A catalog is not a flat map of strings.
    #[error("Invalid message catalog for culture '{locale}': {source}")]
    InvalidCatalog {
        locale: Locale,
        #[source]
        source: serde_yaml::Error,
    },

    /// The culture tag is not one of the supported cultures.
    #[error("Unsupported culture: '{0}'. Expected 'en' or 'ru'")]
    UnsupportedCulture(String),
}

// =============================================================================
// Localizer
// =============================================================================

/// Message catalogs for every supported culture plus the default culture.
#[derive(Debug, Clone)]
pub struct Localizer {
    default_locale: Locale,
    catalogs: HashMap<Locale, HashMap<String, String>>,
}

impl Localizer {
    /// Loads the catalogs embedded in the binary.
    ///
    /// # Errors
    ///
    /// Returns `LocalizationError::InvalidCatalog` if an embedded catalog
    /// does not parse.
    pub fn embedded(default_locale: Locale) -> Result<Self, LocalizationError> {
        Self::from_sources(
            default_locale,
            &[(Locale::En, EN_CATALOG), (Locale::Ru, RU_CATALOG)],
        )
    }

    /// Parses one YAML catalog per culture.
    ///
    /// # Errors
    ///
    /// Returns `LocalizationError::InvalidCatalog` for the first source that
    /// is not a flat string map.
    pub fn from_sources(
        default_locale: Locale,
        sources: &[(Locale, &str)],
    ) -> Result<Self, LocalizationError> {
        let catalogs = sources
            .iter()
            .map(|&(locale, source)| {
                serde_yaml::from_str::<HashMap<String, String>>(source)
                    .map(|catalog| (locale, catalog))
                    .map_err(|source| LocalizationError::InvalidCatalog { locale, source })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            default_locale,
            catalogs,
        })
    }

    #[must_use]
    pub const fn default_locale(&self) -> Locale {
        self.default_locale
    }

    /// Returns the template for `key`, falling back to the default culture
    /// and then to the key name.
    #[must_use]
    pub fn message(&self, locale: Locale, key: MessageKey) -> String {
        self.lookup(locale, key)
            .or_else(|| self.lookup(self.default_locale, key))
            .unwrap_or_else(|| key.as_str())
            .to_string()
    }

    /// Returns the message for `key` with `{n}` replaced by `arguments[n]`.
    #[must_use]
    pub fn format(&self, locale: Locale, key: MessageKey, arguments: &[&dyn Display]) -> String {
        arguments
            .iter()
            .enumerate()
            .fold(self.message(locale, key), |message, (index, argument)| {
                message.replace(&format!("{{{index}}}"), &argument.to_string())
            })
    }

    fn lookup(&self, locale: Locale, key: MessageKey) -> Option<&str> {
        self.catalogs
            .get(&locale)
            .and_then(|catalog| catalog.get(key.as_str()))
            .map(String::as_str)
    }

    /// Picks the request culture.
    ///
    /// The first supported value wins, in order: `culture` query parameter,
    /// `ui-culture` query parameter, `Accept-Language` header, default.
    #[must_use]
    pub fn negotiate(
        &self,
        culture: Option<&str>,
        ui_culture: Option<&str>,
        accept_language: Option<&str>,
    ) -> Locale {
        culture
            .and_then(Locale::from_tag)
            .or_else(|| ui_culture.and_then(Locale::from_tag))
            .or_else(|| accept_language.and_then(preferred_locale))
            .unwrap_or(self.default_locale)
    }
}

/// Highest-weighted supported culture in an `Accept-Language` value.
///
/// Entries with `q=0` are excluded. Ties keep header order.
fn preferred_locale(header: &str) -> Option<Locale> {
    let mut candidates: Vec<(Locale, f32)> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let locale = Locale::from_tag(parts.next()?)?;
            let quality = parts
                .filter_map(|parameter| parameter.trim().strip_prefix("q="))
                .find_map(|value| value.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            (quality > 0.0).then_some((locale, quality))
        })
        .collect();

    candidates.sort_by(|left, right| right.1.total_cmp(&left.1));
    candidates.first().map(|&(locale, _)| locale)
}

// =============================================================================
// Tests
// =============================================================================
