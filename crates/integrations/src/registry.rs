//! Runtime catalog of integration definitions.
//!
//! A [`Registry`] is populated once at startup and shared read-only
//! afterwards. Integrations are looked up by name or by concrete type and
//! filtered by locality and declared [`Capability`] tags.

use std::any::{TypeId, type_name};
use std::collections::{HashMap, HashSet};

use axum::Router;
use serde_json::Value;
use tracing::{debug, info};

use tether_core::Application;

use crate::capability::Capability;
use crate::catalog::Catalog;
use crate::error::RegistryError;
use crate::integration::{AsAny, Integration, IntegrationHandle};

/// Key to look an integration up by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationKey {
    Name(String),
    Type {
        type_id: TypeId,
        type_name: &'static str,
    },
}

impl IntegrationKey {
    pub fn name(name: impl Into<String>) -> Self {
        IntegrationKey::Name(name.into())
    }

    /// Key of the integration implemented by `I`.
    pub fn of<I: Integration + 'static>() -> Self {
        IntegrationKey::Type {
            type_id: TypeId::of::<I>(),
            type_name: type_name::<I>(),
        }
    }
}

impl core::fmt::Display for IntegrationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IntegrationKey::Name(name) => f.write_str(name),
            IntegrationKey::Type { type_name, .. } => f.write_str(type_name),
        }
    }
}

impl From<&str> for IntegrationKey {
    fn from(value: &str) -> Self {
        IntegrationKey::Name(value.to_string())
    }
}

impl From<String> for IntegrationKey {
    fn from(value: String) -> Self {
        IntegrationKey::Name(value)
    }
}

impl From<&IntegrationHandle> for IntegrationKey {
    fn from(value: &IntegrationHandle) -> Self {
        IntegrationKey::Name(value.name().to_string())
    }
}

/// Untyped input: only strings name an integration.
impl TryFrom<&Value> for IntegrationKey {
    type Error = RegistryError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(name) => Ok(IntegrationKey::Name(name.clone())),
            other => Err(RegistryError::InvalidKey(format!(
                "expected an integration name, got {other}"
            ))),
        }
    }
}

/// Registered integrations, in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    integrations: Vec<IntegrationHandle>,
    by_name: HashMap<String, usize>,
    by_type: HashMap<TypeId, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the catalog entries named by `ids`, in order.
    pub fn from_installed<S: AsRef<str>>(catalog: &Catalog, ids: &[S]) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for id in ids {
            let id = id.as_ref();
            let handle = catalog
                .build(id)
                .ok_or_else(|| RegistryError::UnknownIntegration(id.to_string()))?;
            registry.register_handle(handle)?;
        }
        Ok(registry)
    }

    pub fn register<I: Integration + 'static>(&mut self, integration: I) -> Result<IntegrationHandle, RegistryError> {
        self.register_handle(IntegrationHandle::new(integration))
    }

    pub fn register_handle(&mut self, handle: IntegrationHandle) -> Result<IntegrationHandle, RegistryError> {
        let name = handle.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateIntegration(name));
        }
        for cap in handle.capabilities() {
            cap.validate()?;
        }

        let index = self.integrations.len();
        let type_id = AsAny::as_any(&*handle).type_id();
        self.by_type.entry(type_id).or_insert(index);
        self.by_name.insert(name.clone(), index);
        self.integrations.push(handle.clone());

        info!(
            integration = %name,
            is_local = handle.is_local(),
            "integration registered"
        );
        Ok(handle)
    }

    /// The registered integration for `key`. Repeated calls return the same instance.
    pub fn get(&self, key: impl Into<IntegrationKey>) -> Result<IntegrationHandle, RegistryError> {
        let key = key.into();
        let index = match &key {
            IntegrationKey::Name(name) => self.by_name.get(name),
            IntegrationKey::Type { type_id, .. } => self.by_type.get(type_id),
        };
        index
            .map(|&i| self.integrations[i].clone())
            .ok_or_else(|| RegistryError::IntegrationUnavailable(key.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Integrations declaring every tag in `required`, optionally restricted
    /// to local (`Some(true)`) or non-local (`Some(false)`) ones.
    pub fn get_all(
        &self,
        required: &[Capability],
        is_local: Option<bool>,
    ) -> Result<HashSet<IntegrationHandle>, RegistryError> {
        for cap in required {
            cap.validate()?;
        }
        Ok(self
            .integrations
            .iter()
            .filter(|i| is_local.is_none_or(|local| i.is_local() == local))
            .filter(|i| declares_all(i, required))
            .cloned()
            .collect())
    }

    /// All integrations, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &IntegrationHandle> {
        self.integrations.iter()
    }

    pub fn len(&self) -> usize {
        self.integrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.integrations.is_empty()
    }

    /// One router with every integration's routes.
    ///
    /// Namespaced routes are nested at `/<base_path>/<name>`; legacy routes
    /// are merged at the root.
    pub fn get_urls(&self, base_path: &str) -> Router {
        let base = base_path.trim_matches('/');
        let mut router = Router::new();
        for integration in &self.integrations {
            if let Some(routes) = integration.routes() {
                let prefix = if base.is_empty() {
                    format!("/{}", integration.name())
                } else {
                    format!("/{base}/{}", integration.name())
                };
                debug!(integration = integration.name(), %prefix, "mounting integration routes");
                router = router.nest(&prefix, routes);
            }
            if let Some(legacy) = integration.legacy_routes() {
                debug!(integration = integration.name(), "mounting legacy routes");
                router = router.merge(legacy);
            }
        }
        router
    }

    /// The integration `application` is linked to, which must declare every
    /// tag in `required`.
    pub fn for_application(
        &self,
        application: &Application,
        required: &[Capability],
    ) -> Result<IntegrationHandle, RegistryError> {
        let name = application
            .integration_name()
            .ok_or(RegistryError::NotLinked)?;
        let handle = self.get(name)?;
        for cap in required {
            cap.validate()?;
            if !handle.capabilities().contains(cap) {
                return Err(RegistryError::MissingCapability {
                    integration: handle.name().to_string(),
                    capability: cap.to_string(),
                });
            }
        }
        Ok(handle)
    }

    /// Whether `application`'s integration is available and declares a form.
    pub fn has_config_form(&self, application: &Application) -> bool {
        self.for_application(application, &[])
            .map(|i| i.config_form().is_some())
            .unwrap_or(false)
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.integrations.clear();
        self.by_name.clear();
        self.by_type.clear();
    }
}

fn declares_all(integration: &IntegrationHandle, required: &[Capability]) -> bool {
    let declared = integration.capabilities();
    required.iter().all(|cap| declared.contains(cap))
}

/// Process-wide default registry.
///
/// Initialised once before serving traffic; [`reset`] exists for tests that
/// need to rebuild it.
pub mod global {
    use std::sync::{Arc, PoisonError, RwLock};

    use super::Registry;
    use crate::error::RegistryError;

    static DEFAULT: RwLock<Option<Arc<Registry>>> = RwLock::new(None);

    pub fn init(registry: Registry) -> Result<Arc<Registry>, RegistryError> {
        let mut slot = DEFAULT.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(RegistryError::AlreadyInitialized);
        }
        let registry = Arc::new(registry);
        *slot = Some(registry.clone());
        Ok(registry)
    }

    pub fn get() -> Result<Arc<Registry>, RegistryError> {
        DEFAULT
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(RegistryError::NotInitialized)
    }

    pub fn reset() {
        *DEFAULT.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
