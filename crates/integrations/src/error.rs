use thiserror::Error;

use tether_core::ValidationError;

/// Registry lookups and registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("integration '{0}' is already registered")]
    DuplicateIntegration(String),

    #[error("integration '{0}' is not available")]
    IntegrationUnavailable(String),

    /// The key is neither an integration name nor an integration type.
    #[error("invalid integration key: {0}")]
    InvalidKey(String),

    #[error("invalid capability tag '{0}'")]
    InvalidCapability(String),

    #[error("application is not linked to any integration")]
    NotLinked,

    #[error("integration '{integration}' does not declare capability '{capability}'")]
    MissingCapability {
        integration: String,
        capability: String,
    },

    #[error("unknown integration identifier '{0}'")]
    UnknownIntegration(String),

    #[error("default registry is already initialised")]
    AlreadyInitialized,

    #[error("default registry is not initialised")]
    NotInitialized,
}

/// Computing an installation lookup for a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Local integrations are installed once per application, so the lookup
    /// cannot be built without it.
    #[error("local integration '{0}' requires the application to look up its installation")]
    MissingApplication(String),

    #[error("integration '{0}' does not resolve installations from requests")]
    NotImplemented(String),

    #[error("request carries no '{0}' to identify the installation")]
    MissingValue(&'static str),
}

/// Fetching exactly one installation for a lookup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FindError {
    #[error("no installation matches the lookup")]
    NotFound,

    #[error("{0} installations match the lookup")]
    Multiple(usize),

    #[error("installation backend error: {0}")]
    Backend(String),
}

/// Integration behaviour (config checks, clients).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IntegrationError {
    #[error("integration '{0}' does not provide a client")]
    NoClient(String),

    #[error("invalid client configuration: {0}")]
    InvalidClientConfig(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Form binding outside of plain validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error("integration '{given}' does not match application integration '{expected}'")]
    IntegrationMismatch { expected: String, given: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("form backend error: {0}")]
    Backend(String),
}
