//! Integration definitions.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use axum::Router;

use tether_auth::Scope;
use tether_core::{Application, ConfigMap, ValidationError};

use crate::capability::Capability;
use crate::client::{Client, client_config};
use crate::context::Context;
use crate::error::{IntegrationError, LookupError};
use crate::form::{ConfigForm, validate};
use crate::lookup::{InstallationLookup, InstallationQuery, LookupScope};
use crate::request::InboundRequest;

/// Access to the concrete type behind a trait object.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A named third-party or internal service the host can install on targets.
///
/// Local integrations are installed at most once per tenant-owned
/// application. Non-local (internal) integrations share one global
/// application across every target.
pub trait Integration: AsAny + Send + Sync + fmt::Debug {
    /// Unique, stable name.
    fn name(&self) -> &str;

    fn is_local(&self) -> bool;

    fn display_name(&self) -> &str {
        self.name()
    }

    /// Route namespace.
    fn namespace(&self) -> String {
        format!("integration-{}", self.name())
    }

    fn is_installable(&self) -> bool {
        true
    }

    fn is_uninstallable(&self) -> bool {
        false
    }

    /// Scopes granted to tokens minted for this integration, in order.
    fn default_scopes(&self) -> &[Scope] {
        &[]
    }

    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    fn config_form(&self) -> Option<Arc<dyn ConfigForm>> {
        None
    }

    /// Routes nested under `<base_path><name>`.
    fn routes(&self) -> Option<Router> {
        None
    }

    /// Routes mounted at the process root, unprefixed.
    fn legacy_routes(&self) -> Option<Router> {
        None
    }

    /// Build the outbound client from already merged settings.
    fn build_client(&self, config: ConfigMap) -> Result<Box<dyn Client>, IntegrationError> {
        let _ = config;
        Err(IntegrationError::NoClient(self.name().to_string()))
    }

    /// Config of the installation in `ctx`, empty when none is stored.
    fn get_config(&self, ctx: &Context) -> ConfigMap {
        ctx.config()
    }

    /// Validate the installation's config against the declared form.
    fn check_config(&self, ctx: &Context) -> Result<bool, ValidationError> {
        self.clean_config(ctx, None).map(|_| true)
    }

    /// Validated config as it should be stored: the declared fields after
    /// both stages. Without a form the stored config is returned as is.
    fn clean_config(
        &self,
        ctx: &Context,
        existing: Option<&dyn InstallationQuery>,
    ) -> Result<Option<ConfigMap>, ValidationError> {
        let Some(form) = self.config_form() else {
            return Ok(ctx.installation().config.clone());
        };
        let mut form_ctx = ctx.form_context();
        form_ctx.existing = existing;
        let mut cleaned = validate(form.as_ref(), &self.get_config(ctx), &form_ctx)?;
        let config = form
            .fields()
            .iter()
            .filter_map(|f| cleaned.remove(f.name).map(|v| (f.name.to_string(), v)))
            .collect();
        Ok(Some(config))
    }

    /// Client built from a copy of the installation config with `extra` applied.
    fn get_client(&self, ctx: &Context, extra: ConfigMap) -> Result<Box<dyn Client>, IntegrationError> {
        self.build_client(client_config(ctx, extra))
    }

    /// Filter on config values, scoped to this integration's applications.
    fn installation_lookup_from_config_values(&self, values: ConfigMap) -> InstallationLookup {
        let scope = if self.is_local() {
            LookupScope::Local(self.name().to_string())
        } else {
            LookupScope::Internal(self.name().to_string())
        };
        InstallationLookup {
            config_equals: values,
            ..InstallationLookup::new(scope)
        }
    }

    /// Filter selecting the installation a request was made for.
    ///
    /// Local integrations have one installation per application, so the
    /// application alone identifies it. Non-local integrations must override
    /// this to read the identifying value from the request.
    fn installation_lookup_from_request(
        &self,
        request: &InboundRequest,
        application: Option<&Application>,
    ) -> Result<InstallationLookup, LookupError> {
        let _ = request;
        if !self.is_local() {
            return Err(LookupError::NotImplemented(self.name().to_string()));
        }
        let application =
            application.ok_or_else(|| LookupError::MissingApplication(self.name().to_string()))?;
        Ok(InstallationLookup::new(LookupScope::Local(self.name().to_string()))
            .for_application(application.id))
    }
}

/// Shared handle to a registered integration.
///
/// Equality and hashing go by name only.
#[derive(Clone)]
pub struct IntegrationHandle(Arc<dyn Integration>);

impl IntegrationHandle {
    pub fn new<I: Integration + 'static>(integration: I) -> Self {
        Self(Arc::new(integration))
    }

    pub fn from_arc(integration: Arc<dyn Integration>) -> Self {
        Self(integration)
    }

    /// The concrete integration, if it is an `I`.
    pub fn downcast_ref<I: Integration + 'static>(&self) -> Option<&I> {
        AsAny::as_any(self.0.as_ref()).downcast_ref::<I>()
    }

    pub fn same_instance(&self, other: &IntegrationHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for IntegrationHandle {
    type Target = dyn Integration;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for IntegrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IntegrationHandle").field(&self.0.name()).finish()
    }
}

impl fmt::Display for IntegrationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.name())
    }
}

impl PartialEq for IntegrationHandle {
    fn eq(&self, other: &Self) -> bool {
        self.0.name() == other.0.name()
    }
}

impl Eq for IntegrationHandle {}

impl Hash for IntegrationHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::testing::GuardedForm;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method};
    use serde_json::json;
    use std::collections::HashSet;
    use tether_core::config::from_value;
    use tether_core::{Installation, TargetId};

    #[derive(Debug)]
    struct Sample {
        name: &'static str,
        local: bool,
        version: u32,
        form: Option<Arc<GuardedForm>>,
    }

    impl Sample {
        fn new(name: &'static str, local: bool) -> Self {
            Self { name, local, version: 0, form: None }
        }
    }

    impl Integration for Sample {
        fn name(&self) -> &str {
            self.name
        }

        fn is_local(&self) -> bool {
            self.local
        }

        fn config_form(&self) -> Option<Arc<dyn ConfigForm>> {
            self.form.clone().map(|f| f as Arc<dyn ConfigForm>)
        }
    }

    fn request() -> InboundRequest {
        InboundRequest::new(Method::GET, "/".parse().unwrap(), HeaderMap::new(), Bytes::new())
    }

    fn ctx(config: serde_json::Value) -> Context {
        Context::new(Installation::new(
            tether_core::ApplicationId::new(),
            TargetId::new(1),
            Some(from_value(config).unwrap()),
        ))
    }

    #[test]
    fn handles_compare_by_name_only() {
        let a = IntegrationHandle::new(Sample { version: 1, ..Sample::new("x", true) });
        let b = IntegrationHandle::new(Sample { version: 2, ..Sample::new("x", false) });
        let c = IntegrationHandle::new(Sample::new("y", true));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(!a.same_instance(&b));

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn defaults() {
        let x = Sample::new("x", true);
        assert_eq!(x.display_name(), "x");
        assert_eq!(x.namespace(), "integration-x");
        assert!(x.is_installable());
        assert!(!x.is_uninstallable());
        assert!(x.default_scopes().is_empty());
        assert!(x.routes().is_none());
        assert_eq!(
            x.get_client(&ctx(json!({})), ConfigMap::new()).unwrap_err(),
            IntegrationError::NoClient("x".into())
        );
    }

    #[test]
    fn check_config_without_form_is_always_true() {
        assert_eq!(Sample::new("x", true).check_config(&ctx(json!({"anything": 1}))), Ok(true));
    }

    #[test]
    fn check_config_surfaces_field_errors() {
        let with_form = Sample {
            form: Some(Arc::new(GuardedForm::new())),
            ..Sample::new("test_local_form", true)
        };
        assert_eq!(with_form.check_config(&ctx(json!({"extra_field": "fine"}))), Ok(true));
        let err = with_form
            .check_config(&ctx(json!({"extra_field": "forbidden"})))
            .unwrap_err();
        assert!(err.has_field("extra_field"));
    }

    #[test]
    fn clean_config_keeps_only_declared_fields() {
        let with_form = Sample {
            form: Some(Arc::new(GuardedForm::new())),
            ..Sample::new("test_local_form", true)
        };
        let cleaned = with_form
            .clean_config(&ctx(json!({"extra_field": "fine", "stray": 1})), None)
            .unwrap();
        assert_eq!(cleaned, Some(from_value(json!({"extra_field": "fine"})).unwrap()));

        let bare = Sample::new("x", true);
        let stored = bare.clean_config(&ctx(json!({"anything": 1})), None).unwrap();
        assert_eq!(stored, Some(from_value(json!({"anything": 1})).unwrap()));
    }

    #[test]
    fn config_value_lookup_is_scoped_by_locality() {
        let values = from_value(json!({"shop": "a"})).unwrap();
        let internal = Sample::new("i", false).installation_lookup_from_config_values(values.clone());
        assert_eq!(internal.scope, LookupScope::Internal("i".into()));
        assert_eq!(internal.config_equals, values);
        let local = Sample::new("l", true).installation_lookup_from_config_values(ConfigMap::new());
        assert_eq!(local.scope, LookupScope::Local("l".into()));
    }

    #[test]
    fn request_lookup_defaults() {
        let local = Sample::new("l", true);
        assert_eq!(
            local.installation_lookup_from_request(&request(), None),
            Err(LookupError::MissingApplication("l".into()))
        );
        let app = Application::local("Acme", "l");
        let lookup = local.installation_lookup_from_request(&request(), Some(&app)).unwrap();
        assert_eq!(lookup.application_id, Some(app.id));

        assert_eq!(
            Sample::new("i", false).installation_lookup_from_request(&request(), None),
            Err(LookupError::NotImplemented("i".into()))
        );
    }

    #[test]
    fn handles_downcast_to_concrete_type() {
        let handle = IntegrationHandle::new(Sample { version: 3, ..Sample::new("x", true) });
        assert_eq!(handle.downcast_ref::<Sample>().map(|s| s.version), Some(3));
    }
}
