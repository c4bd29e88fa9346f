use serde::Serialize;
use serde_json::Value;

use tether_core::{ConfigMap, Installation};
use tether_integrations::Integration;

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct IntegrationSummary {
    pub name: String,
    pub display_name: String,
    pub is_local: bool,
    pub is_installable: bool,
    pub is_uninstallable: bool,
    pub has_config_form: bool,
    pub capabilities: Vec<String>,
}

impl IntegrationSummary {
    pub fn from_integration(integration: &dyn Integration) -> Self {
        Self {
            name: integration.name().to_string(),
            display_name: integration.display_name().to_string(),
            is_local: integration.is_local(),
            is_installable: integration.is_installable(),
            is_uninstallable: integration.is_uninstallable(),
            has_config_form: integration.config_form().is_some(),
            capabilities: integration
                .capabilities()
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        }
    }
}

pub fn installation_to_json(installation: &Installation, target_label: &str) -> Value {
    let mut body = serde_json::json!({
        "id": installation.id.to_string(),
        "application_id": installation.application_id.to_string(),
        "config": installation.config,
        "api_client_name": installation.api_client_name,
        "is_active": installation.is_active(),
        "deleted_at": installation.deleted_at(),
        "created_at": installation.created_at,
        "updated_at": installation.updated_at,
    });
    body[target_label] = installation.target.get().into();
    body
}

/// Initial values of an installation's config form.
#[derive(Debug, Serialize)]
pub struct FormInitial {
    pub integration: String,
    pub initial: ConfigMap,
}
