//! Locale settings
//!
//! Maps each supported locale to the text direction the layout should use.
//! Locales without an entry use the default locale's direction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cookie holding the visitor's chosen locale
pub const LOCALE_COOKIE_NAME: &str = "locale";
pub const DEFAULT_LOCALE: Locale = Locale::Hebrew;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locale {
    #[serde(rename = "he")]
    Hebrew,
    #[serde(rename = "en")]
    English,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::Hebrew => "he",
            Locale::English => "en",
        }
    }

    /// Locale from a cookie value; missing or unknown values give the default.
    pub fn from_cookie(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_LOCALE)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "he" => Ok(Locale::Hebrew),
            "en" => Ok(Locale::English),
            other => Err(format!("unsupported locale: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "lr")]
    LeftToRight,
    #[serde(rename = "rl")]
    RightToLeft,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::LeftToRight => "lr",
            Direction::RightToLeft => "rl",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DIRECTION_MAP: &[(Locale, Direction)] = &[(Locale::Hebrew, Direction::RightToLeft)];

fn mapped_direction(locale: Locale) -> Option<Direction> {
    DIRECTION_MAP
        .iter()
        .find(|(l, _)| *l == locale)
        .map(|(_, d)| *d)
}

/// Text direction for `locale`
pub fn get_direction(locale: Locale) -> Direction {
    mapped_direction(locale)
        .or_else(|| mapped_direction(DEFAULT_LOCALE))
        .unwrap_or(Direction::RightToLeft)
}
