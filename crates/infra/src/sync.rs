//! Keep internal applications in step with the registry.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use tether_core::{Application, ClientType};
use tether_integrations::Registry;

use crate::store::{ApplicationStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Integration names touched by one sync, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub revoked: Vec<String>,
}

/// Give every registered non-local integration an approved internal
/// application, and revoke approval from those whose integration is gone.
pub fn sync_with_registry(
    registry: &Registry,
    applications: &dyn ApplicationStore,
) -> Result<SyncReport, SyncError> {
    let previously_approved: Vec<Application> = applications
        .internal_applications()?
        .into_iter()
        .filter(|app| app.is_approved)
        .collect();

    let mut report = SyncReport::default();
    for integration in registry.iter().filter(|i| !i.is_local()) {
        let (_, created) = provision_internal_application(applications, integration.name())?;
        if created {
            report.created.push(integration.name().to_string());
        } else {
            report.updated.push(integration.name().to_string());
        }
    }

    for mut app in previously_approved {
        let Some(name) = app.internal_integration_name().map(str::to_string) else {
            continue;
        };
        if registry.get(name.as_str()).is_ok_and(|i| !i.is_local()) {
            continue;
        }
        warn!(integration = %name, application_id = %app.id, "revoking internal application");
        app.is_approved = false;
        applications.save_application(&app)?;
        report.revoked.push(name);
    }

    info!(
        created = report.created.len(),
        updated = report.updated.len(),
        revoked = report.revoked.len(),
        "registry synchronized"
    );
    Ok(report)
}

/// Update-or-create the internal application of `name`. The flag is true
/// when the application was created.
pub(crate) fn provision_internal_application(
    applications: &dyn ApplicationStore,
    name: &str,
) -> Result<(Application, bool), StoreError> {
    if let Some(mut app) = applications.find_internal_application(name)? {
        app.name = format!("{name} (Internal)");
        app.client_type = ClientType::Confidential;
        app.is_approved = true;
        applications.save_application(&app)?;
        return Ok((app, false));
    }

    let app = Application::internal(name);
    match applications.save_application(&app) {
        Ok(()) => {
            info!(integration = name, application_id = %app.id, "internal application created");
            Ok((app, true))
        }
        // Lost a race with a concurrent creator.
        Err(StoreError::Conflict(_)) => applications
            .find_internal_application(name)?
            .map(|app| (app, false))
            .ok_or(StoreError::NotFound),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_integrations::builtin::{ApiClientIntegration, MixpanelIntegration, ShopifyIntegration};

    use crate::store::InMemoryStore;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(ApiClientIntegration).unwrap();
        registry.register(ShopifyIntegration::default()).unwrap();
        registry.register(MixpanelIntegration::default()).unwrap();
        registry
    }

    #[test]
    fn creates_internal_applications_for_non_local_integrations() {
        let store = InMemoryStore::new();
        let report = sync_with_registry(&registry(), &store).unwrap();

        assert_eq!(report.created, ["shopify", "mixpanel"]);
        assert!(report.updated.is_empty());
        assert!(report.revoked.is_empty());

        let shopify = store.find_internal_application("shopify").unwrap().unwrap();
        assert_eq!(shopify.name, "shopify (Internal)");
        assert_eq!(shopify.client_type, ClientType::Confidential);
        assert!(shopify.is_approved);
        assert!(store.find_internal_application("api_client").unwrap().is_none());
    }

    #[test]
    fn second_run_updates_in_place() {
        let store = InMemoryStore::new();
        sync_with_registry(&registry(), &store).unwrap();
        let before = store.find_internal_application("mixpanel").unwrap().unwrap();

        let mut renamed = before.clone();
        renamed.name = "renamed".into();
        renamed.is_approved = false;
        store.save_application(&renamed).unwrap();

        let report = sync_with_registry(&registry(), &store).unwrap();
        assert_eq!(report.updated, ["shopify", "mixpanel"]);

        let after = store.find_internal_application("mixpanel").unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.name, "mixpanel (Internal)");
        assert!(after.is_approved);
    }

    #[test]
    fn revokes_applications_of_unregistered_integrations() {
        let store = InMemoryStore::new();
        store.save_application(&Application::internal("legacy_crm")).unwrap();

        let report = sync_with_registry(&registry(), &store).unwrap();
        assert_eq!(report.revoked, ["legacy_crm"]);

        let legacy = store.find_internal_application("legacy_crm").unwrap().unwrap();
        assert!(!legacy.is_approved);

        // Already revoked rows are left alone.
        let report = sync_with_registry(&registry(), &store).unwrap();
        assert!(report.revoked.is_empty());
    }

    #[test]
    fn revokes_internal_applications_now_registered_as_local() {
        let store = InMemoryStore::new();
        store.save_application(&Application::internal("api_client")).unwrap();

        let report = sync_with_registry(&registry(), &store).unwrap();
        assert_eq!(report.revoked, ["api_client"]);
        let app = store.find_internal_application("api_client").unwrap().unwrap();
        assert!(!app.is_approved);
    }
}
