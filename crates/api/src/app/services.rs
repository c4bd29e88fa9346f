//! Service wiring: stores, lifecycle service and the request authenticator.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use tether_infra::{
    ApplicationStore, InMemoryStore, InstallationStore, IntegrationAuthenticator,
    IntegrationService, PostgresStore, Settings, StoreError, StoreTokenValidator, TokenStore,
};
use tether_integrations::{InstallationFinder, Registry};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("storage setup failed: {0}")]
    Store(#[from] StoreError),
}

/// Everything handlers need, shared behind an `Arc`.
#[derive(Clone)]
pub struct AppServices {
    pub registry: Arc<Registry>,
    pub integrations: Arc<IntegrationService>,
    pub authenticator: IntegrationAuthenticator,
}

impl AppServices {
    /// Wire every service onto one store.
    pub fn from_store<S>(registry: Arc<Registry>, store: Arc<S>, target_label: &str) -> Self
    where
        S: ApplicationStore + InstallationStore + TokenStore + 'static,
    {
        let label = target_label.to_string();
        let integrations = IntegrationService::with_store(registry.clone(), store.clone())
            .with_target_label(label.clone());
        let validator = Arc::new(StoreTokenValidator::with_store(store.clone()));
        let authenticator = IntegrationAuthenticator::new(validator, registry.clone(), store)
            .with_target_label(label);

        Self {
            registry,
            integrations: Arc::new(integrations),
            authenticator,
        }
    }

    /// Installation lookups for integration routes.
    pub fn finder(&self) -> Arc<dyn InstallationFinder> {
        self.integrations.clone()
    }
}

/// Postgres stores when `DATABASE_URL` is set, in-memory stores otherwise.
pub async fn build_services(
    settings: &Settings,
    registry: Arc<Registry>,
) -> Result<AppServices, ServiceError> {
    match &settings.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url).await?;
            store.ensure_schema().await?;
            info!("using postgres stores");
            Ok(AppServices::from_store(
                registry,
                Arc::new(store),
                &settings.target_label,
            ))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory stores");
            Ok(AppServices::from_store(
                registry,
                InMemoryStore::arc(),
                &settings.target_label,
            ))
        }
    }
}
