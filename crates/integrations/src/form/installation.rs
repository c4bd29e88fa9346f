use chrono::Utc;
use serde_json::Value;

use tether_core::{Application, ApplicationId, ConfigMap, Installation, TargetId, ValidationError};

use super::{FormContext, clean_fields, field::REQUIRED};
use crate::integration::Integration;

/// Key of the application in installation form data.
pub const APPLICATION_FIELD: &str = "application_id";

/// Installation form embedding an integration's config fields.
///
/// The parent fields (`application_id` and the target under its configured
/// label) and the config fields are cleaned together; the merged mapping is
/// then handed to the integration form's
/// [`clean_form_data`](super::ConfigForm::clean_form_data).
#[derive(Debug)]
pub struct InstallationForm<'a> {
    integration: &'a dyn Integration,
    target_label: &'a str,
}

/// Output of [`InstallationForm::clean`].
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedInstallation {
    pub application_id: ApplicationId,
    pub target: TargetId,
    pub data: ConfigMap,
}

impl<'a> InstallationForm<'a> {
    pub fn new(integration: &'a dyn Integration, target_label: &'a str) -> Self {
        Self {
            integration,
            target_label,
        }
    }

    /// Names of the config fields this form embeds.
    pub fn config_field_names(&self) -> Vec<&'static str> {
        self.integration
            .config_form()
            .map(|form| form.fields().iter().map(|f| f.name).collect())
            .unwrap_or_default()
    }

    pub fn clean(
        &self,
        raw: &ConfigMap,
        application: Option<&Application>,
    ) -> Result<CleanedInstallation, ValidationError> {
        let mut errors = ValidationError::new();

        let application_id = match raw.get(APPLICATION_FIELD) {
            None | Some(Value::Null) => {
                errors.add(APPLICATION_FIELD, REQUIRED);
                None
            }
            Some(value) => match value.as_str().and_then(|s| s.parse::<ApplicationId>().ok()) {
                Some(id) => Some(id),
                None => {
                    errors.add(APPLICATION_FIELD, "Enter a valid UUID.");
                    None
                }
            },
        };

        let target = match raw.get(self.target_label) {
            None | Some(Value::Null) => {
                errors.add(self.target_label, REQUIRED);
                None
            }
            Some(Value::Number(n)) => n.as_u64().map(TargetId::new),
            Some(Value::String(s)) => s.trim().parse::<TargetId>().ok(),
            Some(_) => None,
        };
        if target.is_none() && !errors.has_field(self.target_label) {
            errors.add(self.target_label, "Select a valid choice.");
        }

        let form = self.integration.config_form();
        let mut data = match &form {
            Some(form) => match clean_fields(form.fields(), raw) {
                Ok(data) => data,
                Err(field_errors) => {
                    errors.merge(field_errors);
                    ConfigMap::new()
                }
            },
            None => ConfigMap::new(),
        };

        let (Some(application_id), Some(target)) = (application_id, target) else {
            return Err(errors);
        };
        errors.into_result(())?;

        data.insert(APPLICATION_FIELD.to_string(), application_id.to_string().into());
        data.insert(self.target_label.to_string(), target.get().into());

        if let Some(form) = form {
            let ctx = FormContext {
                target: Some(target),
                target_label: self.target_label,
                application,
                existing: None,
            };
            data = form.clean_form_data(data, &ctx)?;
        }

        Ok(CleanedInstallation {
            application_id,
            target,
            data,
        })
    }

    /// The config fields of `cleaned`, without the parent fields.
    pub fn config(&self, cleaned: &CleanedInstallation) -> ConfigMap {
        self.config_field_names()
            .into_iter()
            .filter_map(|name| cleaned.data.get(name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }

    /// Write the config fields of `cleaned` into the installation, dropping
    /// every other key.
    pub fn save(&self, cleaned: &CleanedInstallation, installation: &mut Installation) {
        installation.config = Some(self.config(cleaned));
        installation.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::testing::GuardedForm;
    use crate::form::ConfigForm;
    use serde_json::json;
    use std::sync::Arc;
    use tether_core::config::from_value;

    #[derive(Debug)]
    struct WithForm(Arc<GuardedForm>);

    impl Integration for WithForm {
        fn name(&self) -> &str {
            "test_local_form"
        }

        fn is_local(&self) -> bool {
            true
        }

        fn config_form(&self) -> Option<Arc<dyn ConfigForm>> {
            Some(self.0.clone())
        }
    }

    fn integration() -> WithForm {
        WithForm(Arc::new(GuardedForm::new()))
    }

    #[test]
    fn parent_and_config_errors_are_reported_together() {
        let integration = integration();
        let form = InstallationForm::new(&integration, "organisation_id");
        let err = form
            .clean(&from_value(json!({"extra_field": "01234567890"})).unwrap(), None)
            .unwrap_err();
        assert!(err.has_field(APPLICATION_FIELD));
        assert!(err.has_field("organisation_id"));
        assert!(err.has_field("extra_field"));
    }

    #[test]
    fn form_stage_sees_parent_fields_and_can_reject() {
        let integration = integration();
        let form = InstallationForm::new(&integration, "target_id");
        let app = ApplicationId::new();
        let err = form
            .clean(
                &from_value(json!({"application_id": app.to_string(), "target_id": "4", "extra_field": "forbidden"}))
                    .unwrap(),
                None,
            )
            .unwrap_err();
        assert_eq!(err.messages_for("extra_field"), ["Value cannot be forbidden"]);
    }

    #[test]
    fn save_keeps_only_config_fields() {
        let integration = integration();
        let form = InstallationForm::new(&integration, "target_id");
        let app = ApplicationId::new();
        let cleaned = form
            .clean(
                &from_value(json!({"application_id": app.to_string(), "target_id": 4, "extra_field": "ok", "noise": true}))
                    .unwrap(),
                None,
            )
            .unwrap();
        assert_eq!(cleaned.target, TargetId::new(4));
        assert_eq!(cleaned.application_id, app);

        let mut installation = Installation::new(app, TargetId::new(4), None);
        form.save(&cleaned, &mut installation);
        assert_eq!(installation.config, Some(from_value(json!({"extra_field": "ok"})).unwrap()));
    }
}
