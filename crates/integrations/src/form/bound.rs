use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Value;

use tether_core::{Application, ApplicationId, ConfigMap, Installation, TargetId, ValidationError};

use super::{ConfigForm, FormContext, validate};
use crate::context::DEFAULT_TARGET_LABEL;
use crate::error::FormError;
use crate::integration::Integration;

/// Storage the form needs to prefill itself.
pub trait FormBackend {
    /// The global application of a non-local integration, created on demand.
    fn default_application(&self, integration: &dyn Integration) -> Result<Application, FormError>;

    /// Installation row for (application, target), in any state.
    fn find_installation(
        &self,
        application_id: ApplicationId,
        target: TargetId,
    ) -> Result<Option<Installation>, FormError>;
}

/// A config form bound to raw input, validated on demand.
#[derive(Debug)]
pub struct BoundForm {
    form: Arc<dyn ConfigForm>,
    data: ConfigMap,
    target_label: Cow<'static, str>,
    target: Option<TargetId>,
    application: Option<Application>,
    installation: Option<Installation>,
    initial: ConfigMap,
    outcome: Option<Result<ConfigMap, ValidationError>>,
}

impl BoundForm {
    pub fn new(form: Arc<dyn ConfigForm>, data: ConfigMap) -> Self {
        Self {
            form,
            data,
            target_label: Cow::Borrowed(DEFAULT_TARGET_LABEL),
            target: None,
            application: None,
            installation: None,
            initial: ConfigMap::new(),
            outcome: None,
        }
    }

    pub fn with_target_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.target_label = label.into();
        self.outcome = None;
        self
    }

    /// Bind the target so it is injected into cleaned data.
    pub fn bind_target(&mut self, target: TargetId) {
        self.target = Some(target);
        self.outcome = None;
    }

    /// Runs both validation stages once; later calls reuse the outcome.
    pub fn clean(&mut self) -> Result<&ConfigMap, &ValidationError> {
        let outcome = self.outcome.get_or_insert_with(|| {
            let ctx = FormContext {
                target: self.target,
                target_label: &self.target_label,
                application: self.application.as_ref(),
                existing: None,
            };
            validate(self.form.as_ref(), &self.data, &ctx)
        });
        outcome.as_ref()
    }

    pub fn is_valid(&mut self) -> bool {
        self.clean().is_ok()
    }

    /// Cleaned data of the last successful validation.
    pub fn cleaned_data(&self) -> Option<&ConfigMap> {
        self.outcome.as_ref().and_then(|o| o.as_ref().ok())
    }

    pub fn errors(&self) -> Option<&ValidationError> {
        self.outcome.as_ref().and_then(|o| o.as_ref().err())
    }

    /// Bind target and application and prefill initial values from the
    /// existing installation, if any.
    ///
    /// Without an explicit application, non-local integrations fall back to
    /// their global application.
    pub fn set_initial_values(
        &mut self,
        target: TargetId,
        integration: &dyn Integration,
        application: Option<Application>,
        backend: &dyn FormBackend,
    ) -> Result<(), FormError> {
        let application = match application {
            Some(app) => {
                if app.integration_name() != Some(integration.name()) {
                    return Err(FormError::IntegrationMismatch {
                        expected: app.integration_name().unwrap_or("none").to_string(),
                        given: integration.name().to_string(),
                    });
                }
                Some(app)
            }
            None if !integration.is_local() => Some(backend.default_application(integration)?),
            None => None,
        };

        self.bind_target(target);
        self.installation = match &application {
            Some(app) => backend.find_installation(app.id, target)?,
            None => None,
        };
        self.application = application;

        self.initial.clear();
        if let Some(installation) = &self.installation {
            let config = installation.get_config();
            for field in self.form.fields() {
                if let Some(value) = config.get(field.name).or(field.initial.as_ref()) {
                    self.initial.insert(field.name.to_string(), value.clone());
                }
            }
        }
        Ok(())
    }

    /// Initial value shown for `field`: prefilled config, else the field default.
    pub fn initial(&self, field: &str) -> Option<&Value> {
        self.initial
            .get(field)
            .or_else(|| self.form.field(field).and_then(|f| f.initial.as_ref()))
    }

    /// All initial values, one entry per field that has one.
    pub fn initial_values(&self) -> ConfigMap {
        self.form
            .fields()
            .iter()
            .filter_map(|f| self.initial(f.name).map(|v| (f.name.to_string(), v.clone())))
            .collect()
    }

    pub fn application(&self) -> Option<&Application> {
        self.application.as_ref()
    }

    pub fn installation(&self) -> Option<&Installation> {
        self.installation.as_ref()
    }

    pub fn target(&self) -> Option<TargetId> {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::testing::GuardedForm;
    use crate::form::FieldSpec;
    use serde_json::json;
    use std::cell::Cell;
    use tether_core::config::from_value;

    #[derive(Debug)]
    struct Plain {
        name: &'static str,
        local: bool,
    }

    impl Integration for Plain {
        fn name(&self) -> &str {
            self.name
        }

        fn is_local(&self) -> bool {
            self.local
        }
    }

    #[derive(Debug, Default)]
    struct Backend {
        default_app: Option<Application>,
        installation: Option<Installation>,
        default_calls: Cell<u32>,
    }

    impl FormBackend for Backend {
        fn default_application(&self, _integration: &dyn Integration) -> Result<Application, FormError> {
            self.default_calls.set(self.default_calls.get() + 1);
            self.default_app
                .clone()
                .ok_or_else(|| FormError::Backend("no default".into()))
        }

        fn find_installation(
            &self,
            application_id: ApplicationId,
            target: TargetId,
        ) -> Result<Option<Installation>, FormError> {
            Ok(self
                .installation
                .clone()
                .filter(|i| i.application_id == application_id && i.target == target))
        }
    }

    fn bound(data: serde_json::Value) -> BoundForm {
        BoundForm::new(Arc::new(GuardedForm::new()), from_value(data).unwrap())
    }

    #[test]
    fn clean_is_memoised_and_exposes_results() {
        let mut form = bound(json!({"extra_field": "fine"}));
        assert!(form.is_valid());
        assert_eq!(form.cleaned_data().unwrap().get("extra_field"), Some(&json!("fine")));
        assert!(form.errors().is_none());

        let mut bad = bound(json!({"extra_field": "forbidden"}));
        assert!(!bad.is_valid());
        assert!(bad.errors().unwrap().has_field("extra_field"));
        assert!(bad.cleaned_data().is_none());
    }

    #[test]
    fn custom_target_label_is_used_for_injection() {
        let mut form = bound(json!({"extra_field": "fine"})).with_target_label("organisation_id");
        form.bind_target(TargetId::new(9));
        let data = form.clean().unwrap();
        assert_eq!(data.get("organisation_id"), Some(&json!(9)));
        assert!(data.get("target_id").is_none());
    }

    #[test]
    fn mismatched_application_is_rejected() {
        let integration = Plain { name: "shopify", local: false };
        let mut form = bound(json!({}));
        let err = form
            .set_initial_values(
                TargetId::new(1),
                &integration,
                Some(Application::internal("mixpanel")),
                &Backend::default(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            FormError::IntegrationMismatch {
                expected: "mixpanel".into(),
                given: "shopify".into()
            }
        );
    }

    #[test]
    fn non_local_integration_falls_back_to_default_application_and_prefills() {
        let app = Application::internal("shopify");
        let installation = Installation::new(
            app.id,
            TargetId::new(3),
            Some(from_value(json!({"extra_field": "stored"})).unwrap()),
        );
        let backend = Backend {
            default_app: Some(app.clone()),
            installation: Some(installation.clone()),
            ..Backend::default()
        };

        let mut form = bound(json!({}));
        form.set_initial_values(TargetId::new(3), &Plain { name: "shopify", local: false }, None, &backend)
            .unwrap();

        assert_eq!(backend.default_calls.get(), 1);
        assert_eq!(form.application(), Some(&app));
        assert_eq!(form.installation().map(|i| i.id), Some(installation.id));
        assert_eq!(form.initial("extra_field"), Some(&json!("stored")));
        assert_eq!(form.target(), Some(TargetId::new(3)));
    }

    #[test]
    fn local_integration_without_application_keeps_field_defaults() {
        #[derive(Debug)]
        struct Defaults(Vec<FieldSpec>);
        impl ConfigForm for Defaults {
            fn fields(&self) -> &[FieldSpec] {
                &self.0
            }
        }

        let backend = Backend::default();
        let mut form = BoundForm::new(
            Arc::new(Defaults(vec![FieldSpec::text("region").initial("eu")])),
            ConfigMap::new(),
        );
        form.set_initial_values(TargetId::new(1), &Plain { name: "api_client", local: true }, None, &backend)
            .unwrap();

        assert_eq!(backend.default_calls.get(), 0);
        assert!(form.application().is_none());
        assert_eq!(form.initial_values().get("region"), Some(&json!("eu")));
    }
}
