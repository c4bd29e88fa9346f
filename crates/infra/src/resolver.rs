//! Resolve an inbound request to the installation it was made for.

use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, warn};

use tether_auth::{AccessToken, OAuthError, Subject, TokenValidator};
use tether_integrations::{
    Capability, Context, DEFAULT_TARGET_LABEL, InboundRequest, Registry,
};

use crate::store::{InstallationStore, StoreError};

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    /// No credentials for this authenticator; let the next one try.
    Unclaimed,
    /// Internal-only token: authenticated server-to-server call with no
    /// installation attached.
    Anonymous,
    Authenticated {
        subject: Subject,
        token: AccessToken,
        context: Context,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication failed: {error}")]
    Failed {
        error: String,
        description: Option<String>,
    },
}

impl AuthError {
    pub fn failed() -> Self {
        AuthError::Failed {
            error: "authentication_failed".to_string(),
            description: None,
        }
    }
}

impl From<OAuthError> for AuthError {
    fn from(err: OAuthError) -> Self {
        AuthError::Failed {
            error: err.error,
            description: err.description,
        }
    }
}

/// Bearer-token authenticator that also resolves the caller's installation.
#[derive(Clone)]
pub struct IntegrationAuthenticator {
    validator: Arc<dyn TokenValidator>,
    registry: Arc<Registry>,
    installations: Arc<dyn InstallationStore>,
    required: Vec<Capability>,
    target_label: Cow<'static, str>,
}

impl IntegrationAuthenticator {
    pub fn new(
        validator: Arc<dyn TokenValidator>,
        registry: Arc<Registry>,
        installations: Arc<dyn InstallationStore>,
    ) -> Self {
        Self {
            validator,
            registry,
            installations,
            required: Vec::new(),
            target_label: Cow::Borrowed(DEFAULT_TARGET_LABEL),
        }
    }

    /// Only claim tokens whose integration declares every capability in `required`.
    pub fn requiring(mut self, required: impl IntoIterator<Item = Capability>) -> Self {
        self.required = required.into_iter().collect();
        self
    }

    pub fn with_target_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.target_label = label.into();
        self
    }

    pub fn authenticate(
        &self,
        request: &InboundRequest,
        now: DateTime<Utc>,
    ) -> Result<Authentication, AuthError> {
        let Some(bearer) = request.bearer_token() else {
            return Ok(Authentication::Unclaimed);
        };
        let Some(grant) = self.validator.validate(bearer, now)? else {
            return Ok(Authentication::Unclaimed);
        };

        if grant.token.is_internal_only {
            return Ok(Authentication::Anonymous);
        }

        let integration = match self.registry.for_application(&grant.application, &self.required) {
            Ok(integration) => integration,
            Err(err) => {
                debug!(application_id = %grant.application.id, %err, "token not claimed");
                return Ok(Authentication::Unclaimed);
            }
        };

        let lookup = integration
            .installation_lookup_from_request(request, Some(&grant.application))
            .map_err(|err| {
                warn!(integration = integration.name(), %err, "no installation lookup for request");
                AuthError::failed()
            })?;

        let (installation, _) = self.installations.get_one(&lookup).map_err(|err| {
            match &err {
                StoreError::NotFound | StoreError::Multiple(_) => error!(
                    integration = integration.name(),
                    lookup = ?lookup,
                    %err,
                    "invalid installation"
                ),
                other => error!(integration = integration.name(), err = %other, "installation lookup failed"),
            }
            AuthError::failed()
        })?;

        let context = Context::new(installation).with_target_label(self.target_label.clone());
        Ok(Authentication::Authenticated {
            subject: grant.subject,
            token: grant.token,
            context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Bytes;
    use axum::http::{HeaderMap, HeaderValue, Method, Uri, header::AUTHORIZATION};
    use chrono::Duration;
    use serde_json::json;
    use tether_auth::{PrincipalId, TokenGrant};
    use tether_core::config::from_value;
    use tether_core::{Application, ApplicationId, Installation, TargetId, ValidationError};
    use tether_integrations::builtin::shopify::{SHOP_DOMAIN_HEADER, SHOP_FIELD};
    use tether_integrations::builtin::{ApiClientIntegration, ShopifyIntegration};
    use tether_integrations::capability::{API_CLIENT, WEBHOOKS};
    use tether_core::ConfigMap;
    use tether_integrations::{InstallationLookup, InstallationQuery};

    use crate::store::{ApplicationStore, InMemoryStore, InstallCheck, InstallRequest};

    /// Hands out one fixed grant for the bearer "good".
    struct FixedValidator(TokenGrant);

    impl TokenValidator for FixedValidator {
        fn validate(&self, bearer: &str, _now: DateTime<Utc>) -> Result<Option<TokenGrant>, OAuthError> {
            match bearer {
                "good" => Ok(Some(self.0.clone())),
                "broken" => Err(OAuthError::invalid_token("The access token expired")),
                _ => Ok(None),
            }
        }
    }

    /// Counts lookups to prove some paths never reach storage.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryStore,
        lookups: AtomicUsize,
    }

    impl InstallationStore for CountingStore {
        fn install(
            &self,
            request: InstallRequest,
            check: InstallCheck<'_>,
        ) -> Result<Installation, StoreError> {
            self.inner.install(request, check)
        }

        fn get_installation(
            &self,
            application_id: ApplicationId,
            target: TargetId,
        ) -> Result<Option<Installation>, StoreError> {
            self.inner.get_installation(application_id, target)
        }

        fn soft_delete(
            &self,
            application_id: ApplicationId,
            target: TargetId,
            at: DateTime<Utc>,
        ) -> Result<Installation, StoreError> {
            self.inner.soft_delete(application_id, target, at)
        }

        fn find_installations(
            &self,
            lookup: &InstallationLookup,
        ) -> Result<Vec<(Installation, Application)>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.find_installations(lookup)
        }
    }

    fn registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry.register(ApiClientIntegration).unwrap();
        registry.register(ShopifyIntegration::default()).unwrap();
        Arc::new(registry)
    }

    fn grant(application: &Application, internal_only: bool) -> TokenGrant {
        let now = Utc::now();
        let mut token = AccessToken::internal(application.id, std::iter::empty(), now);
        token.is_internal_only = internal_only;
        token.user = Some(PrincipalId::new());
        token.expires_at = now + Duration::hours(1);
        TokenGrant {
            subject: token.subject(),
            token,
            application: application.clone(),
        }
    }

    fn request(bearer: Option<&str>, shop: Option<&str>) -> InboundRequest {
        let mut headers = HeaderMap::new();
        if let Some(bearer) = bearer {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {bearer}")).unwrap(),
            );
        }
        if let Some(shop) = shop {
            headers.insert(SHOP_DOMAIN_HEADER, HeaderValue::from_str(shop).unwrap());
        }
        InboundRequest::new(Method::GET, Uri::from_static("/whoami"), headers, Bytes::new())
    }

    fn install(store: &CountingStore, app: &Application, target: u64, shop: &str) {
        store.inner.save_application(app).unwrap();
        store
            .install(
                InstallRequest {
                    application_id: app.id,
                    target: TargetId::new(target),
                    config: Some(from_value(json!({SHOP_FIELD: shop})).unwrap()),
                    exclusive: false,
                },
                &|inst: &Installation,
                  _: &dyn InstallationQuery|
                 -> Result<Option<ConfigMap>, ValidationError> { Ok(inst.config.clone()) },
            )
            .unwrap();
    }

    fn authenticator(
        grant: TokenGrant,
        store: Arc<CountingStore>,
    ) -> IntegrationAuthenticator {
        IntegrationAuthenticator::new(Arc::new(FixedValidator(grant)), registry(), store)
    }

    #[test]
    fn missing_or_unknown_bearer_is_unclaimed() {
        let app = Application::internal("shopify");
        let auth = authenticator(grant(&app, false), Arc::default());
        assert_eq!(
            auth.authenticate(&request(None, None), Utc::now()).unwrap(),
            Authentication::Unclaimed
        );
        assert_eq!(
            auth.authenticate(&request(Some("other"), None), Utc::now()).unwrap(),
            Authentication::Unclaimed
        );
    }

    #[test]
    fn protocol_errors_fail_with_oauth_details() {
        let app = Application::internal("shopify");
        let auth = authenticator(grant(&app, false), Arc::default());
        let err = auth
            .authenticate(&request(Some("broken"), None), Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::Failed {
                error: "invalid_token".into(),
                description: Some("The access token expired".into()),
            }
        );
    }

    #[test]
    fn internal_only_token_is_anonymous_without_lookup() {
        let store = Arc::new(CountingStore::default());
        let app = Application::internal("shopify");
        let auth = authenticator(grant(&app, true), store.clone());

        let outcome = auth
            .authenticate(&request(Some("good"), Some("a.myshopify.com")), Utc::now())
            .unwrap();
        assert_eq!(outcome, Authentication::Anonymous);
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unlinked_or_incapable_applications_are_unclaimed() {
        let store = Arc::new(CountingStore::default());
        let plain = Application::new("plain");
        let auth = authenticator(grant(&plain, false), store.clone());
        assert_eq!(
            auth.authenticate(&request(Some("good"), None), Utc::now()).unwrap(),
            Authentication::Unclaimed
        );

        let shopify = Application::internal("shopify");
        let auth = authenticator(grant(&shopify, false), store.clone()).requiring([API_CLIENT]);
        assert_eq!(
            auth.authenticate(&request(Some("good"), None), Utc::now()).unwrap(),
            Authentication::Unclaimed
        );
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn resolves_the_installation_named_by_the_request() {
        let store = Arc::new(CountingStore::default());
        let app = Application::internal("shopify");
        install(&store, &app, 7, "a.myshopify.com");
        install(&store, &app, 8, "b.myshopify.com");

        let auth = authenticator(grant(&app, false), store).requiring([WEBHOOKS]);
        let outcome = auth
            .authenticate(&request(Some("good"), Some("B.myshopify.com")), Utc::now())
            .unwrap();
        let Authentication::Authenticated { subject, context, .. } = outcome else {
            panic!("expected an authenticated result, got {outcome:?}");
        };
        assert!(!subject.is_anonymous());
        assert_eq!(context.target(), TargetId::new(8));
    }

    #[test]
    fn local_applications_resolve_by_application() {
        let store = Arc::new(CountingStore::default());
        let app = Application::local("Acme", "api_client");
        install(&store, &app, 3, "ignored");

        let auth = authenticator(grant(&app, false), store);
        let outcome = auth.authenticate(&request(Some("good"), None), Utc::now()).unwrap();
        let Authentication::Authenticated { context, .. } = outcome else {
            panic!("expected an authenticated result, got {outcome:?}");
        };
        assert_eq!(context.target(), TargetId::new(3));
    }

    #[test]
    fn ambiguous_installation_fails() {
        let store = Arc::new(CountingStore::default());
        let app = Application::internal("shopify");
        install(&store, &app, 1, "a.myshopify.com");
        install(&store, &app, 2, "a.myshopify.com");

        let auth = authenticator(grant(&app, false), store);
        let err = auth
            .authenticate(&request(Some("good"), Some("a.myshopify.com")), Utc::now())
            .unwrap_err();
        assert_eq!(err, AuthError::failed());
    }

    #[test]
    fn missing_installation_or_lookup_value_fails() {
        let store = Arc::new(CountingStore::default());
        let app = Application::internal("shopify");
        install(&store, &app, 1, "a.myshopify.com");
        let auth = authenticator(grant(&app, false), store);

        let unknown_shop = auth
            .authenticate(&request(Some("good"), Some("z.myshopify.com")), Utc::now())
            .unwrap_err();
        assert_eq!(unknown_shop, AuthError::failed());

        let no_shop = auth
            .authenticate(&request(Some("good"), None), Utc::now())
            .unwrap_err();
        assert_eq!(no_shop, AuthError::failed());
    }
}
