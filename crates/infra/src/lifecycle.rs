//! Installation lifecycle: install, uninstall, internal applications and
//! internal-only tokens.

use std::borrow::Cow;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};

use tether_auth::{AccessToken, ScopeSet};
use tether_core::{
    Application, ApplicationId, ConfigMap, Installation, TargetId, ValidationError,
};
use tether_integrations::{
    BoundForm, Context, DEFAULT_TARGET_LABEL, FindError, FormBackend, FormError, Integration,
    IntegrationKey, InstallationFinder, InstallationLookup, InstallationQuery, Registry,
    RegistryError,
};

use crate::store::{
    ApplicationStore, InstallRequest, InstallationStore, StoreError, TokenStore,
};
use crate::sync::{SyncError, SyncReport, provision_internal_application, sync_with_registry};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InstallError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("integration {0} cannot be installed")]
    NotInstallable(String),

    #[error("integration {0} is local")]
    LocalIntegration(String),

    #[error("application {0} not found")]
    ApplicationNotFound(ApplicationId),

    #[error("installation not found")]
    NotFound,

    #[error(transparent)]
    Validation(ValidationError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for InstallError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(err) => InstallError::Validation(err),
            other => InstallError::Store(other),
        }
    }
}

/// Entry point for everything that changes installations.
#[derive(Clone)]
pub struct IntegrationService {
    registry: Arc<Registry>,
    applications: Arc<dyn ApplicationStore>,
    installations: Arc<dyn InstallationStore>,
    tokens: Arc<dyn TokenStore>,
    target_label: Cow<'static, str>,
}

impl IntegrationService {
    pub fn new(
        registry: Arc<Registry>,
        applications: Arc<dyn ApplicationStore>,
        installations: Arc<dyn InstallationStore>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self {
            registry,
            applications,
            installations,
            tokens,
            target_label: Cow::Borrowed(DEFAULT_TARGET_LABEL),
        }
    }

    /// Service backed by one store for all three tables.
    pub fn with_store<S>(registry: Arc<Registry>, store: Arc<S>) -> Self
    where
        S: ApplicationStore + InstallationStore + TokenStore + 'static,
    {
        Self::new(registry, store.clone(), store.clone(), store)
    }

    pub fn with_target_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.target_label = label.into();
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn applications(&self) -> &Arc<dyn ApplicationStore> {
        &self.applications
    }

    pub fn installations(&self) -> &Arc<dyn InstallationStore> {
        &self.installations
    }

    pub fn target_label(&self) -> &str {
        &self.target_label
    }

    pub fn application(&self, id: ApplicationId) -> Result<Application, InstallError> {
        self.applications
            .get_application(id)?
            .ok_or(InstallError::ApplicationNotFound(id))
    }

    /// Install `application` on `target`, reactivating a deleted row.
    ///
    /// Local applications may be active on one target only. The integration's
    /// config check runs inside the same store unit, so a rejected config
    /// leaves nothing behind; an accepted one is stored as cleaned.
    #[instrument(skip(self, application, config), fields(application_id = %application.id, target = %target), err)]
    pub fn install(
        &self,
        application: &Application,
        target: TargetId,
        config: Option<ConfigMap>,
    ) -> Result<Installation, InstallError> {
        let integration = self.registry.for_application(application, &[])?;
        if !integration.is_installable() {
            return Err(InstallError::NotInstallable(integration.name().to_string()));
        }

        let check = |installation: &Installation,
                     existing: &dyn InstallationQuery|
         -> Result<Option<ConfigMap>, ValidationError> {
            let ctx = self.context(installation.clone());
            integration.clean_config(&ctx, Some(existing))
        };
        let installation = self.installations.install(
            InstallRequest {
                application_id: application.id,
                target,
                config,
                exclusive: application.is_local_integration(),
            },
            &check,
        )?;

        info!(
            integration = integration.name(),
            installation_id = %installation.id,
            "integration installed"
        );
        Ok(installation)
    }

    /// Soft delete the (application, target) installation. Repeating it
    /// re-stamps the deletion time.
    #[instrument(skip(self, application), fields(application_id = %application.id, target = %target), err)]
    pub fn uninstall(
        &self,
        application: &Application,
        target: TargetId,
    ) -> Result<Installation, InstallError> {
        let installation = self
            .installations
            .soft_delete(application.id, target, Utc::now())
            .map_err(|err| match err {
                StoreError::NotFound => InstallError::NotFound,
                other => other.into(),
            })?;
        info!(installation_id = %installation.id, "integration uninstalled");
        Ok(installation)
    }

    pub fn delete(&self, installation: &Installation) -> Result<Installation, InstallError> {
        let application = self.application(installation.application_id)?;
        self.uninstall(&application, installation.target)
    }

    /// The global application of a non-local integration, created and
    /// approved on demand.
    pub fn get_by_internal_integration(
        &self,
        key: impl Into<IntegrationKey>,
    ) -> Result<Application, InstallError> {
        let integration = self.registry.get(key)?;
        if integration.is_local() {
            return Err(InstallError::LocalIntegration(integration.name().to_string()));
        }
        let (application, _) =
            provision_internal_application(self.applications.as_ref(), integration.name())?;
        Ok(application)
    }

    /// Internal-only token for `application`, reused while unexpired.
    #[instrument(skip(self, application), fields(application_id = %application.id), err)]
    pub fn create_internal_token(&self, application: &Application) -> Result<AccessToken, InstallError> {
        let integration = self.registry.for_application(application, &[])?;
        if application.is_local_integration() || integration.is_local() {
            return Err(InstallError::LocalIntegration(integration.name().to_string()));
        }

        let now = Utc::now();
        let scope: ScopeSet = integration.default_scopes().iter().collect();
        if let Some(existing) =
            self.tokens
                .find_internal_token(application.id, &scope.to_string(), now)?
        {
            return Ok(existing);
        }

        let token = AccessToken::internal(application.id, integration.default_scopes(), now);
        self.tokens.save_token(&token)?;
        info!(integration = integration.name(), "internal token issued");
        Ok(token)
    }

    pub fn sync_with_registry(&self) -> Result<SyncReport, SyncError> {
        sync_with_registry(&self.registry, self.applications.as_ref())
    }

    /// Config form of `integration` bound to `data`, prefilled from the
    /// installation of (application, target) when one exists.
    pub fn bound_form(
        &self,
        integration: impl Into<IntegrationKey>,
        application: Option<Application>,
        target: TargetId,
        data: ConfigMap,
    ) -> Result<Option<BoundForm>, FormError> {
        let integration = self.registry.get(integration)?;
        let Some(form) = integration.config_form() else {
            return Ok(None);
        };
        let mut bound = BoundForm::new(form, data).with_target_label(self.target_label.clone());
        bound.set_initial_values(target, &*integration, application, self)?;
        Ok(Some(bound))
    }

    fn context(&self, installation: Installation) -> Context {
        Context::new(installation).with_target_label(self.target_label.clone())
    }
}

impl FormBackend for IntegrationService {
    fn default_application(&self, integration: &dyn Integration) -> Result<Application, FormError> {
        self.get_by_internal_integration(integration.name())
            .map_err(|err| match err {
                InstallError::Registry(err) => FormError::Registry(err),
                other => FormError::Backend(other.to_string()),
            })
    }

    fn find_installation(
        &self,
        application_id: ApplicationId,
        target: TargetId,
    ) -> Result<Option<Installation>, FormError> {
        self.installations
            .get_installation(application_id, target)
            .map_err(|err| FormError::Backend(err.to_string()))
    }
}

impl InstallationFinder for IntegrationService {
    fn find_one(&self, lookup: &InstallationLookup) -> Result<(Installation, Application), FindError> {
        Ok(self.installations.get_one(lookup)?)
    }
}
