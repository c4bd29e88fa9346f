//! Domain error model.

use thiserror::Error;

use crate::validation::ValidationError;

pub type DomainResult<T> = Result<T, DomainError>;

/// Failures of the pure domain types; storage and transport errors live in
/// the layers that own them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An application may point at one integration only.
    #[error("application cannot be linked to both internal integration '{internal}' and local integration '{local}'")]
    ConflictingLinks { internal: String, local: String },

    #[error("invalid {kind}: {message}")]
    InvalidId { kind: &'static str, message: String },

    /// Config must be a JSON object (or null).
    #[error("config must be a JSON object, got {0}")]
    InvalidConfig(&'static str),
}

impl DomainError {
    pub fn invalid_id(kind: &'static str, err: impl ToString) -> Self {
        Self::InvalidId {
            kind,
            message: err.to_string(),
        }
    }
}
