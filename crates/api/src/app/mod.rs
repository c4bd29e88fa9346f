//! HTTP application wiring.
//!
//! - `services.rs`: store selection and service wiring
//! - `routes/`: admin and installation handlers
//! - `dto.rs`: response shapes
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Prefix under which integration routes are nested.
pub const INTEGRATIONS_BASE_PATH: &str = "api/integrations/";

/// Build the full HTTP router.
pub fn build_app(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        authenticator: services.authenticator.clone(),
    };

    // Bearer-authenticated routes.
    let protected = routes::admin_router()
        .merge(routes::installation_router())
        .layer(Extension(services.clone()))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    // Integration routes authenticate their own callers (signatures, shop lookups).
    let integrations = services
        .registry
        .get_urls(INTEGRATIONS_BASE_PATH)
        .layer(Extension(services.finder()));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .merge(integrations)
}

pub use services::AppServices;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tether_infra::InMemoryStore;
    use tether_integrations::Registry;
    use tether_integrations::builtin::ShopifyIntegration;
    use tower::ServiceExt;

    fn app() -> Router {
        let mut registry = Registry::new();
        registry.register(ShopifyIntegration::default()).unwrap();
        let services =
            AppServices::from_store(Arc::new(registry), InMemoryStore::arc(), "target_id");
        build_app(Arc::new(services))
    }

    async fn status(app: Router, method: &str, uri: &str) -> StatusCode {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn health_is_public() {
        assert_eq!(status(app(), "GET", "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_and_whoami_require_a_bearer() {
        assert_eq!(status(app(), "GET", "/integrations").await, StatusCode::UNAUTHORIZED);
        assert_eq!(status(app(), "GET", "/whoami").await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn integration_routes_are_nested_under_base_path() {
        // Unsigned call: the route exists but rejects the caller.
        assert_eq!(
            status(app(), "GET", "/api/integrations/shopify/proxy").await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status(app(), "GET", "/api/integrations/unknown/proxy").await,
            StatusCode::NOT_FOUND
        );
    }
}
