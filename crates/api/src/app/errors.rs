use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use tether_core::ValidationError;
use tether_infra::{InstallError, StoreError};
use tether_integrations::{FormError, RegistryError};

pub fn install_error_to_response(err: InstallError) -> Response {
    match err {
        InstallError::Registry(err) => registry_error_to_response(err),
        InstallError::NotInstallable(name) => json_error(
            StatusCode::CONFLICT,
            "not_installable",
            format!("integration {name} cannot be installed"),
        ),
        InstallError::LocalIntegration(name) => json_error(
            StatusCode::BAD_REQUEST,
            "local_integration",
            format!("integration {name} is local"),
        ),
        InstallError::ApplicationNotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("application {id} not found"),
        ),
        InstallError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        InstallError::Validation(err) => validation_error(&err),
        InstallError::Store(err) => store_error_to_response(err),
    }
}

pub fn registry_error_to_response(err: RegistryError) -> Response {
    match err {
        RegistryError::NotLinked
        | RegistryError::IntegrationUnavailable(_)
        | RegistryError::UnknownIntegration(_) => {
            json_error(StatusCode::NOT_FOUND, "integration_unavailable", err.to_string())
        }
        RegistryError::NotInitialized | RegistryError::AlreadyInitialized => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "registry_error", err.to_string())
        }
        other => json_error(StatusCode::BAD_REQUEST, "registry_error", other.to_string()),
    }
}

pub fn form_error_to_response(err: FormError) -> Response {
    match err {
        FormError::Registry(err) => registry_error_to_response(err),
        FormError::IntegrationMismatch { .. } => {
            json_error(StatusCode::BAD_REQUEST, "integration_mismatch", err.to_string())
        }
        FormError::Backend(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg),
    }
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        StoreError::Validation(err) => validation_error(&err),
        other => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            other.to_string(),
        ),
    }
}

/// 400 with the per-field messages under `fields`.
pub fn validation_error(err: &ValidationError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        axum::Json(json!({
            "error": "validation_error",
            "message": err.to_string(),
            "fields": err.message_dict(),
        })),
    )
        .into_response()
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
