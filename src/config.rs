//! Runtime configuration loaded from the environment.
//!
//! A `.env` file in the working directory is honored outside of tests.

use std::env;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:lectern.db?mode=rwc";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `LECTERN_PORT`
    pub port: u16,

    /// `LECTERN_DATABASE_URL`
    pub database_url: String,

    /// `LECTERN_CATALOG_URL`: remote document store to import the catalog from.
    pub catalog_url: Option<String>,

    /// `LECTERN_CATALOG_TOKEN`
    pub catalog_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("LECTERN_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                ConfigError::InvalidValue("LECTERN_PORT".to_string(), e.to_string())
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            database_url: var("LECTERN_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            catalog_url: var("LECTERN_CATALOG_URL"),
            catalog_token: var("LECTERN_CATALOG_TOKEN"),
        })
    }
}
