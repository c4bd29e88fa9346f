use axum::{
    Router,
    routing::{delete, get, post},
};

pub mod installations;
pub mod system;

/// Admin endpoints. Callers must present an internal-only token.
pub fn admin_router() -> Router {
    Router::new()
        .route("/integrations", get(installations::list_integrations))
        .route(
            "/applications/:id/installations",
            post(installations::install),
        )
        .route(
            "/applications/:id/installations/:target",
            delete(installations::uninstall),
        )
        .route(
            "/applications/:id/installations/:target/form",
            get(installations::form_initial),
        )
}

/// Endpoints for integration callers resolved to an installation.
pub fn installation_router() -> Router {
    Router::new().route("/whoami", get(system::whoami))
}
