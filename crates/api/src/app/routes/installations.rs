use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use tether_core::{ApplicationId, ConfigMap, TargetId};
use tether_integrations::form::{APPLICATION_FIELD, InstallationForm};

use crate::app::dto::{self, FormInitial, IntegrationSummary};
use crate::app::errors::{
    form_error_to_response, install_error_to_response, json_error, registry_error_to_response,
    validation_error,
};
use crate::app::services::AppServices;
use crate::context::RequestAuth;

pub async fn list_integrations(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<RequestAuth>,
) -> Response {
    if let Err(resp) = require_internal(&auth) {
        return resp;
    }
    let items = services
        .registry
        .iter()
        .map(|i| IntegrationSummary::from_integration(&**i))
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

/// Body: the installation form data (target under the configured label plus
/// the integration's config fields). The application comes from the path.
pub async fn install(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<RequestAuth>,
    Path(id): Path<String>,
    Json(mut body): Json<ConfigMap>,
) -> Response {
    if let Err(resp) = require_internal(&auth) {
        return resp;
    }
    let application_id = match parse_application_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let service = &services.integrations;
    let application = match service.application(application_id) {
        Ok(app) => app,
        Err(err) => return install_error_to_response(err),
    };
    let integration = match services.registry.for_application(&application, &[]) {
        Ok(integration) => integration,
        Err(err) => return registry_error_to_response(err),
    };

    let form = InstallationForm::new(&*integration, service.target_label());
    body.insert(
        APPLICATION_FIELD.to_string(),
        application_id.to_string().into(),
    );
    let cleaned = match form.clean(&body, Some(&application)) {
        Ok(cleaned) => cleaned,
        Err(err) => return validation_error(&err),
    };
    let config = integration.config_form().map(|_| form.config(&cleaned));

    match service.install(&application, cleaned.target, config) {
        Ok(installation) => (
            StatusCode::CREATED,
            Json(dto::installation_to_json(
                &installation,
                service.target_label(),
            )),
        )
            .into_response(),
        Err(err) => install_error_to_response(err),
    }
}

pub async fn uninstall(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<RequestAuth>,
    Path((id, target)): Path<(String, u64)>,
) -> Response {
    if let Err(resp) = require_internal(&auth) {
        return resp;
    }
    let application_id = match parse_application_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let service = &services.integrations;
    let result = service
        .application(application_id)
        .and_then(|app| service.uninstall(&app, TargetId::new(target)));
    match result {
        Ok(installation) => (
            StatusCode::OK,
            Json(dto::installation_to_json(
                &installation,
                service.target_label(),
            )),
        )
            .into_response(),
        Err(err) => install_error_to_response(err),
    }
}

/// Initial values of the config form for (application, target).
pub async fn form_initial(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(auth): Extension<RequestAuth>,
    Path((id, target)): Path<(String, u64)>,
) -> Response {
    if let Err(resp) = require_internal(&auth) {
        return resp;
    }
    let application_id = match parse_application_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let service = &services.integrations;
    let application = match service.application(application_id) {
        Ok(app) => app,
        Err(err) => return install_error_to_response(err),
    };
    let Some(name) = application.integration_name().map(str::to_string) else {
        return json_error(
            StatusCode::NOT_FOUND,
            "integration_unavailable",
            "application is not linked to any integration",
        );
    };

    match service.bound_form(
        name.clone(),
        Some(application),
        TargetId::new(target),
        ConfigMap::new(),
    ) {
        Ok(Some(bound)) => (
            StatusCode::OK,
            Json(FormInitial {
                integration: name,
                initial: bound.initial_values(),
            }),
        )
            .into_response(),
        Ok(None) => json_error(
            StatusCode::NOT_FOUND,
            "no_config_form",
            format!("integration {name} has no config form"),
        ),
        Err(err) => form_error_to_response(err),
    }
}

fn require_internal(auth: &RequestAuth) -> Result<(), Response> {
    match auth {
        RequestAuth::Anonymous => Ok(()),
        RequestAuth::Installation { context, .. } => {
            warn!(
                installation_id = %context.installation().id,
                "installation token used on admin endpoint"
            );
            Err(json_error(
                StatusCode::FORBIDDEN,
                "forbidden",
                "admin endpoints require an internal token",
            ))
        }
    }
}

fn parse_application_id(raw: &str) -> Result<ApplicationId, Response> {
    raw.parse::<ApplicationId>().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid application id: {raw}"),
        )
    })
}
