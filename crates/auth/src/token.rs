use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use tether_core::ApplicationId;

use crate::{PrincipalId, Scope, ScopeSet, Subject};

/// Lifetime, in hours, of tokens minted for internal integrations.
pub const INTERNAL_TOKEN_TTL_HOURS: i64 = 12;

/// OAuth2 access token as stored by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Opaque bearer value.
    pub token: String,

    pub application_id: ApplicationId,

    /// End user that authorised the token, if any.
    pub user: Option<PrincipalId>,

    /// Space separated granted scopes.
    pub scope: String,

    pub expires_at: DateTime<Utc>,

    /// Only valid for server-to-server calls from our own services; never
    /// accepted as an integration's inbound credential.
    pub is_internal_only: bool,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token time window (expires_at <= created_at)")]
    InvalidTimeWindow,
}

impl AccessToken {
    /// Internal-only token for an integration's own application, valid for
    /// [`INTERNAL_TOKEN_TTL_HOURS`] from `now`.
    ///
    /// `scopes` end up sorted and space joined.
    pub fn internal<'a>(
        application_id: ApplicationId,
        scopes: impl IntoIterator<Item = &'a Scope>,
        now: DateTime<Utc>,
    ) -> Self {
        let scope: ScopeSet = scopes.into_iter().collect();
        Self {
            token: Uuid::new_v4().simple().to_string(),
            application_id,
            user: None,
            scope: scope.to_string(),
            expires_at: now + Duration::hours(INTERNAL_TOKEN_TTL_HOURS),
            is_internal_only: true,
            created_at: now,
        }
    }

    pub fn scopes(&self) -> ScopeSet {
        ScopeSet::parse(&self.scope)
    }

    pub fn subject(&self) -> Subject {
        Subject::from_user(self.user)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn check_valid(&self, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
        if self.expires_at <= self.created_at {
            return Err(TokenValidationError::InvalidTimeWindow);
        }
        if self.is_expired(now) {
            return Err(TokenValidationError::Expired);
        }
        Ok(())
    }
}
