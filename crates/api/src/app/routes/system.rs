use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::app::errors::json_error;
use crate::context::RequestAuth;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(auth): Extension<RequestAuth>) -> Response {
    let RequestAuth::Installation {
        subject, context, ..
    } = auth
    else {
        return json_error(
            StatusCode::UNAUTHORIZED,
            "not_authenticated",
            "an installation token is required",
        );
    };

    let installation = context.installation();
    let mut body = serde_json::json!({
        "installation_id": installation.id.to_string(),
        "application_id": installation.application_id.to_string(),
        "user_id": subject.principal_id().map(|id| id.to_string()),
        "target_label": context.target_label(),
    });
    body[context.target_label()] = context.target().get().into();
    (StatusCode::OK, Json(body)).into_response()
}
