use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use tether_core::Application;

use crate::{AccessToken, Subject};

/// Outcome of a successful bearer token validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub subject: Subject,
    pub token: AccessToken,
    pub application: Application,
}

/// OAuth2 protocol-level error (RFC 6750 `error` / `error_description`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct OAuthError {
    pub error: String,
    pub description: Option<String>,
}

impl OAuthError {
    pub fn new(error: impl Into<String>, description: Option<String>) -> Self {
        Self {
            error: error.into(),
            description,
        }
    }

    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self::new("invalid_token", Some(description.into()))
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self::new("server_error", Some(description.into()))
    }
}

/// Token collaborator: maps a bearer value to the token it names.
///
/// - `Ok(None)`: the value names no token we know of (no credentials).
/// - `Err(_)`: the token exists but authentication must fail.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, bearer: &str, now: DateTime<Utc>) -> Result<Option<TokenGrant>, OAuthError>;
}

impl<V> TokenValidator for Arc<V>
where
    V: TokenValidator + ?Sized,
{
    fn validate(&self, bearer: &str, now: DateTime<Utc>) -> Result<Option<TokenGrant>, OAuthError> {
        (**self).validate(bearer, now)
    }
}
