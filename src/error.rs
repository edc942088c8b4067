//! Error types for Noah Portal
//!
//! `DatabaseError` is the one shape every facade failure is reported in.
//! `SetupError` covers everything that can go wrong before the first query.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown database error occurred";

/// Code the hosted service uses when a single object was requested but the
/// query matched zero or several rows.
pub const NOT_SINGLE_ROW_CODE: &str = "PGRST116";
pub const NOT_SINGLE_ROW_MESSAGE: &str = "JSON object requested, multiple (or no) rows returned";

/// Uniform database error
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct DatabaseError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl DatabaseError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_ERROR_CODE, UNKNOWN_ERROR_MESSAGE)
    }

    /// Build an error from whatever the provider returned, filling in the
    /// generic code and message where they are missing or empty.
    pub fn from_parts(
        code: Option<String>,
        message: Option<String>,
        details: Option<serde_json::Value>,
        hint: Option<String>,
    ) -> Self {
        Self {
            code: code
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string()),
            message: message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
            details: details.filter(|d| !d.is_null()),
            hint: hint.filter(|h| !h.is_empty()),
        }
    }

    /// Normalize a provider error body such as
    /// `{"code":"23505","message":"duplicate key ...","details":...,"hint":null}`.
    pub fn from_body(body: &serde_json::Value) -> Self {
        let text = |key: &str| body.get(key).and_then(|v| v.as_str()).map(str::to_string);
        Self::from_parts(
            text("code"),
            text("message"),
            body.get("details").cloned(),
            text("hint"),
        )
    }

    pub fn not_single_row(rows: usize) -> Self {
        Self::new(NOT_SINGLE_ROW_CODE, NOT_SINGLE_ROW_MESSAGE)
            .with_details(serde_json::json!(format!("The result contains {} rows", rows)))
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<reqwest::Error> for DatabaseError {
    fn from(err: reqwest::Error) -> Self {
        let details = err.url().map(|u| serde_json::json!(u.path()));
        Self::from_parts(None, Some(err.to_string()), details, None)
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_parts(None, Some(err.to_string()), None, None)
    }
}

/// Failures while building the configuration or the database client
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid database URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid header value for {name}")]
    InvalidHeader { name: &'static str },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
