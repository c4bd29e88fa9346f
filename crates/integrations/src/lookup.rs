use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use tether_core::config::contains_all;
use tether_core::{Application, ApplicationId, ConfigMap, Installation, IntegrationLink, TargetId};

use crate::error::FindError;

/// Which side of the application's integration link a lookup pins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "integration", rename_all = "snake_case")]
pub enum LookupScope {
    Local(String),
    Internal(String),
}

impl LookupScope {
    pub fn integration_name(&self) -> &str {
        match self {
            LookupScope::Local(name) | LookupScope::Internal(name) => name,
        }
    }

    fn admits(&self, application: &Application) -> bool {
        match (self, application.integration_link()) {
            (LookupScope::Local(name), Some(IntegrationLink::Local(linked))) => name == linked,
            (LookupScope::Internal(name), Some(IntegrationLink::Internal(linked))) => {
                name == linked
            }
            _ => false,
        }
    }
}

/// Filter that should select exactly one active installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationLookup {
    pub scope: LookupScope,
    /// Pin a single application (local integrations).
    pub application_id: Option<ApplicationId>,
    /// Config sub-keys that must be present with equal values.
    pub config_equals: ConfigMap,
}

impl InstallationLookup {
    pub fn new(scope: LookupScope) -> Self {
        Self {
            scope,
            application_id: None,
            config_equals: ConfigMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config_equals.insert(key.into(), value.into());
        self
    }

    pub fn for_application(mut self, application_id: ApplicationId) -> Self {
        self.application_id = Some(application_id);
        self
    }

    /// Whether `installation`, owned by `application`, is selected.
    ///
    /// Deleted installations never match.
    pub fn matches(&self, installation: &Installation, application: &Application) -> bool {
        installation.is_active()
            && installation.application_id == application.id
            && self.application_id.is_none_or(|id| id == application.id)
            && self.scope.admits(application)
            && contains_all(&installation.get_config(), &self.config_equals)
    }
}

/// Read side of the installation store, as integration routes need it.
pub trait InstallationFinder: Send + Sync {
    /// The single active installation selected by `lookup`, with its application.
    fn find_one(&self, lookup: &InstallationLookup) -> Result<(Installation, Application), FindError>;
}

impl<F> InstallationFinder for Arc<F>
where
    F: InstallationFinder + ?Sized,
{
    fn find_one(&self, lookup: &InstallationLookup) -> Result<(Installation, Application), FindError> {
        (**self).find_one(lookup)
    }
}

/// Installations visible to a config check while an install is in progress.
///
/// Stores answer from inside the install unit, so the answer is consistent
/// with the row being written.
pub trait InstallationQuery {
    /// Targets of the active installations selected by `lookup`.
    fn targets_matching(&self, lookup: &InstallationLookup) -> Vec<TargetId>;
}

/// Snapshot of (installation, application) rows.
impl InstallationQuery for Vec<(Installation, Application)> {
    fn targets_matching(&self, lookup: &InstallationLookup) -> Vec<TargetId> {
        self.iter()
            .filter(|(inst, app)| lookup.matches(inst, app))
            .map(|(inst, _)| inst.target)
            .collect()
    }
}
