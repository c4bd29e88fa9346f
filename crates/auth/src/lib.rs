//! OAuth2 token model and the contracts the integrations layer consumes from
//! the provider.
//!
//! This crate is IO-free: token issuance and storage live elsewhere.

pub mod authorize;
pub mod principal;
pub mod scope;
pub mod token;
pub mod validator;

pub use authorize::{AuthzError, require_scopes};
pub use principal::{PrincipalId, Subject};
pub use scope::{Scope, ScopeSet};
pub use token::{AccessToken, INTERNAL_TOKEN_TTL_HOURS, TokenValidationError};
pub use validator::{OAuthError, TokenGrant, TokenValidator};
