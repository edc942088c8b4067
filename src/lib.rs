//! Noah Portal core library
//!
//! This module exports the data access and UI configuration layer of the
//! Noah patient portal.

pub mod db;
pub mod error;
pub mod i18n;
pub mod models;
pub mod navigation;
pub mod telemetry;

pub use db::{Database, Filters, Table};
pub use error::{DatabaseError, SetupError};

/// Application configuration
pub mod config {
    use serde::Deserialize;

    use crate::error::SetupError;

    /// Secrets read from the environment (or `.env`) on top of the files
    pub const URL_VAR: &str = "SUPABASE_URL";
    pub const ANON_KEY_VAR: &str = "SUPABASE_ANON_KEY";

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct Config {
        #[serde(default)]
        pub database: DatabaseConfig,
        #[serde(default)]
        pub logging: LoggingConfig,
    }

    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct DatabaseConfig {
        #[serde(default)]
        pub url: String,
        #[serde(default)]
        pub anon_key: String,
        /// Non-default schema exposed by the REST API
        #[serde(default)]
        pub schema: Option<String>,
        /// Log every facade operation with its parameters
        #[serde(default)]
        pub debug: bool,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct LoggingConfig {
        #[serde(default = "default_level")]
        pub level: String,
        #[serde(default)]
        pub json: bool,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: default_level(),
                json: false,
            }
        }
    }

    fn default_level() -> String {
        "info".to_string()
    }

    /// Load configuration from file
    pub fn load_config() -> Result<Config, SetupError> {
        dotenv::dotenv().ok();

        let env = std::env::var("NOAH_ENV").unwrap_or_else(|_| "development".into());

        let settings = config::Config::builder()
            // Start with default settings
            .add_source(config::File::with_name("config/default").required(false))
            // Override with environment-specific settings
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables, e.g. NOAH__DATABASE__DEBUG=true
            .add_source(config::Environment::with_prefix("NOAH").separator("__"))
            // Service secrets win over everything else
            .set_override_option("database.url", std::env::var(URL_VAR).ok())?
            .set_override_option("database.anon_key", std::env::var(ANON_KEY_VAR).ok())?
            .build()?;

        let config: Config = settings.try_deserialize()?;

        if config.database.url.trim().is_empty() {
            return Err(SetupError::MissingSetting("database.url"));
        }
        if config.database.anon_key.trim().is_empty() {
            return Err(SetupError::MissingSetting("database.anon_key"));
        }

        Ok(config)
    }

}
