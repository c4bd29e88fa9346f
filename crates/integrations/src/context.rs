use std::borrow::Cow;

use tether_core::{ConfigMap, Installation, TargetId};

use crate::form::FormContext;

/// Label under which the target key appears in form data unless the host
/// configures another one.
pub const DEFAULT_TARGET_LABEL: &str = "target_id";

/// Call-scoped view of one installation.
///
/// Built by the authentication resolver for inbound requests and by the
/// installation lifecycle for config checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    installation: Installation,
    target_label: Cow<'static, str>,
}

impl Context {
    pub fn new(installation: Installation) -> Self {
        Self {
            installation,
            target_label: Cow::Borrowed(DEFAULT_TARGET_LABEL),
        }
    }

    pub fn with_target_label(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.target_label = label.into();
        self
    }

    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    pub fn into_installation(self) -> Installation {
        self.installation
    }

    pub fn target(&self) -> TargetId {
        self.installation.target
    }

    pub fn target_label(&self) -> &str {
        &self.target_label
    }

    pub fn config(&self) -> ConfigMap {
        self.installation.get_config()
    }

    /// Form context with the installation's target bound.
    pub fn form_context(&self) -> FormContext<'_> {
        FormContext {
            target: Some(self.installation.target),
            target_label: &self.target_label,
            application: None,
            existing: None,
        }
    }
}
