use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use tether_auth::{OAuthError, TokenGrant, TokenValidationError, TokenValidator};

use crate::store::{ApplicationStore, TokenStore};

/// Validates bearer tokens against the token and application stores.
#[derive(Clone)]
pub struct StoreTokenValidator {
    tokens: Arc<dyn TokenStore>,
    applications: Arc<dyn ApplicationStore>,
}

impl StoreTokenValidator {
    pub fn new(tokens: Arc<dyn TokenStore>, applications: Arc<dyn ApplicationStore>) -> Self {
        Self {
            tokens,
            applications,
        }
    }

    pub fn with_store<S>(store: Arc<S>) -> Self
    where
        S: TokenStore + ApplicationStore + 'static,
    {
        Self::new(store.clone(), store)
    }
}

impl TokenValidator for StoreTokenValidator {
    fn validate(&self, bearer: &str, now: DateTime<Utc>) -> Result<Option<TokenGrant>, OAuthError> {
        let Some(token) = self
            .tokens
            .get_token(bearer)
            .map_err(|e| OAuthError::server_error(e.to_string()))?
        else {
            return Ok(None);
        };

        token.check_valid(now).map_err(|e| match e {
            TokenValidationError::Expired => OAuthError::invalid_token("The access token expired"),
            TokenValidationError::InvalidTimeWindow => {
                OAuthError::invalid_token("The access token is invalid")
            }
        })?;

        let application = self
            .applications
            .get_application(token.application_id)
            .map_err(|e| OAuthError::server_error(e.to_string()))?
            .ok_or_else(|| {
                warn!(application_id = %token.application_id, "token of a missing application");
                OAuthError::invalid_token("The access token is invalid")
            })?;

        Ok(Some(TokenGrant {
            subject: token.subject(),
            token,
            application,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tether_auth::AccessToken;
    use tether_core::Application;

    use crate::store::InMemoryStore;

    #[test]
    fn unknown_bearer_is_not_a_credential() {
        let validator = StoreTokenValidator::with_store(InMemoryStore::arc());
        assert_eq!(validator.validate("nope", Utc::now()).unwrap(), None);
    }

    #[test]
    fn expired_token_fails_with_invalid_token() {
        let store = InMemoryStore::arc();
        let app = Application::internal("shopify");
        store.save_application(&app).unwrap();
        let now = Utc::now();
        let token = AccessToken::internal(app.id, std::iter::empty(), now);
        store.save_token(&token).unwrap();

        let validator = StoreTokenValidator::with_store(store);
        let err = validator
            .validate(&token.token, now + Duration::hours(13))
            .unwrap_err();
        assert_eq!(err.error, "invalid_token");
        assert_eq!(err.description.as_deref(), Some("The access token expired"));
    }

    #[test]
    fn valid_token_carries_its_application() {
        let store = InMemoryStore::arc();
        let app = Application::internal("shopify");
        store.save_application(&app).unwrap();
        let now = Utc::now();
        let token = AccessToken::internal(app.id, std::iter::empty(), now);
        store.save_token(&token).unwrap();

        let grant = StoreTokenValidator::with_store(store)
            .validate(&token.token, now)
            .unwrap()
            .unwrap();
        assert_eq!(grant.application.id, app.id);
        assert!(grant.subject.is_anonymous());
        assert_eq!(grant.token, token);
    }
}
