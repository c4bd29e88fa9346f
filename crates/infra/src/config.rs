//! Process settings read from the environment.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tether_integrations::{Catalog, DEFAULT_TARGET_LABEL, Registry, RegistryError};

pub const INSTALLED_INTEGRATIONS_VAR: &str = "TETHER_INSTALLED_INTEGRATIONS";
pub const TARGET_LABEL_VAR: &str = "TETHER_TARGET_LABEL";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const BIND_VAR: &str = "TETHER_BIND";

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Catalog identifiers, registered in this order.
    pub installed_integrations: Vec<String>,
    /// Label of the target key in form data.
    pub target_label: String,
    /// In-memory stores when absent.
    pub database_url: Option<String>,
    pub bind: SocketAddr,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] over an arbitrary source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let installed = lookup(INSTALLED_INTEGRATIONS_VAR)
            .ok_or(ConfigError::Missing(INSTALLED_INTEGRATIONS_VAR))?;
        let installed_integrations = installed
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        let target_label = lookup(TARGET_LABEL_VAR)
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| DEFAULT_TARGET_LABEL.to_string());
        let valid_label = target_label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid_label {
            return Err(ConfigError::Invalid {
                key: TARGET_LABEL_VAR,
                message: format!("{target_label:?} must match [a-z0-9_]+"),
            });
        }

        let database_url = lookup(DATABASE_URL_VAR).filter(|url| !url.trim().is_empty());

        let bind = lookup(BIND_VAR)
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: BIND_VAR,
                message: e.to_string(),
            })?;

        Ok(Self {
            installed_integrations,
            target_label,
            database_url,
            bind,
        })
    }

    /// Registry holding the configured integrations, in order.
    pub fn build_registry(&self, catalog: &Catalog) -> Result<Registry, RegistryError> {
        Registry::from_installed(catalog, &self.installed_integrations)
    }
}
