use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::warn;

use tether_infra::{AuthError, Authentication, IntegrationAuthenticator};
use tether_integrations::InboundRequest;

use crate::app::errors::json_error;
use crate::context::RequestAuth;

#[derive(Clone)]
pub struct AuthState {
    pub authenticator: IntegrationAuthenticator,
}

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    // Lookups only read headers and the query string.
    let inbound = InboundRequest::new(
        req.method().clone(),
        req.uri().clone(),
        req.headers().clone(),
        Bytes::new(),
    );

    let auth = match state.authenticator.authenticate(&inbound, Utc::now()) {
        Ok(Authentication::Unclaimed) => {
            return Err(json_error(
                StatusCode::UNAUTHORIZED,
                "not_authenticated",
                "Authentication credentials were not provided.",
            ));
        }
        Ok(Authentication::Anonymous) => RequestAuth::Anonymous,
        Ok(Authentication::Authenticated {
            subject,
            token,
            context,
        }) => RequestAuth::Installation {
            subject,
            token,
            context,
        },
        Err(AuthError::Failed { error, description }) => {
            warn!(%error, "request authentication failed");
            return Err(json_error(
                StatusCode::UNAUTHORIZED,
                "authentication_failed",
                description.unwrap_or(error),
            ));
        }
    };

    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}
