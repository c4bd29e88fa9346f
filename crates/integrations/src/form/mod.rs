//! Configuration form contract.
//!
//! Config is validated in two stages. The field stage cleans each declared
//! [`FieldSpec`] independently. The form stage hands the already cleaned
//! mapping to [`ConfigForm::clean_form_data`] for cross-field rules. Both
//! stages report field-keyed [`ValidationError`]s.

mod bound;
mod field;
mod installation;

use std::fmt;

use tether_core::{Application, ConfigMap, TargetId, ValidationError};

use crate::lookup::InstallationQuery;

pub use bound::{BoundForm, FormBackend};
pub use field::{FieldKind, FieldSpec};
pub use installation::{APPLICATION_FIELD, CleanedInstallation, InstallationForm};

/// What the form stage knows about where the config will live.
#[derive(Clone, Copy)]
pub struct FormContext<'a> {
    pub target: Option<TargetId>,
    /// Key under which the target appears in form data.
    pub target_label: &'a str,
    pub application: Option<&'a Application>,
    /// Other installations, when validating inside an install.
    pub existing: Option<&'a dyn InstallationQuery>,
}

impl fmt::Debug for FormContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormContext")
            .field("target", &self.target)
            .field("target_label", &self.target_label)
            .field("application", &self.application.map(|a| a.id))
            .field("existing", &self.existing.is_some())
            .finish()
    }
}

/// Integration-specific config schema.
pub trait ConfigForm: Send + Sync + fmt::Debug {
    fn fields(&self) -> &[FieldSpec];

    /// Cross-field rules over field-validated data.
    ///
    /// `data` holds at least every declared field that passed the field
    /// stage and usually, but not always, the target under
    /// `ctx.target_label`.
    fn clean_form_data(
        &self,
        data: ConfigMap,
        ctx: &FormContext<'_>,
    ) -> Result<ConfigMap, ValidationError> {
        let _ = ctx;
        Ok(data)
    }

    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }
}

/// Field stage: clean every field in `fields` from `raw`.
///
/// Keys of `raw` that no field declares are dropped.
pub fn clean_fields(fields: &[FieldSpec], raw: &ConfigMap) -> Result<ConfigMap, ValidationError> {
    let mut cleaned = ConfigMap::new();
    let mut errors = ValidationError::new();
    for field in fields {
        match field.clean(raw.get(field.name)) {
            Ok(Some(value)) => {
                cleaned.insert(field.name.to_string(), value);
            }
            Ok(None) => {}
            Err(message) => errors.add(field.name, message),
        }
    }
    errors.into_result(cleaned)
}

/// Both stages for a standalone form.
pub fn validate(
    form: &dyn ConfigForm,
    raw: &ConfigMap,
    ctx: &FormContext<'_>,
) -> Result<ConfigMap, ValidationError> {
    let mut data = clean_fields(form.fields(), raw)?;
    if let Some(target) = ctx.target {
        data.entry(ctx.target_label.to_string())
            .or_insert_with(|| target.get().into());
    }
    form.clean_form_data(data, ctx)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// `extra_field` (text, max 10) that must not contain "forbidden".
    #[derive(Debug, Default)]
    pub struct GuardedForm {
        fields: Vec<FieldSpec>,
    }

    impl GuardedForm {
        pub fn new() -> Self {
            Self {
                fields: vec![FieldSpec::text("extra_field").max_length(10)],
            }
        }
    }

    impl ConfigForm for GuardedForm {
        fn fields(&self) -> &[FieldSpec] {
            &self.fields
        }

        fn clean_form_data(
            &self,
            data: ConfigMap,
            _ctx: &FormContext<'_>,
        ) -> Result<ConfigMap, ValidationError> {
            match data.get("extra_field").and_then(|v| v.as_str()) {
                Some(value) if !value.contains("forbidden") => Ok(data),
                _ => Err(ValidationError::field("extra_field", "Value cannot be forbidden")),
            }
        }
    }
}
