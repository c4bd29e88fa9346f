//! Installation of an application on a target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConfigMap;
use crate::id::{ApplicationId, InstallationId, TargetId};

/// Lifecycle state of an installation row.
///
/// Rows are never physically removed; uninstalling only moves them to
/// `Deleted`. Reinstalling the same (application, target) pair moves the same
/// row back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InstallationState {
    Active,
    Deleted { deleted_at: DateTime<Utc> },
}

/// Binding of an application to a target with stored configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installation {
    pub id: InstallationId,
    pub application_id: ApplicationId,
    pub target: TargetId,
    pub config: Option<ConfigMap>,
    pub api_client_name: Option<String>,
    pub state: InstallationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Installation {
    /// A fresh, active installation.
    pub fn new(application_id: ApplicationId, target: TargetId, config: Option<ConfigMap>) -> Self {
        let now = Utc::now();
        Self {
            id: InstallationId::new(),
            application_id,
            target,
            config,
            api_client_name: None,
            state: InstallationState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stored configuration, or an empty map when none was stored.
    pub fn get_config(&self) -> ConfigMap {
        self.config.clone().unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, InstallationState::Active)
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            InstallationState::Active => None,
            InstallationState::Deleted { deleted_at } => Some(deleted_at),
        }
    }

    /// Soft delete. Calling it again re-stamps the deletion time.
    pub fn mark_deleted(&mut self, at: DateTime<Utc>) {
        self.state = InstallationState::Deleted { deleted_at: at };
        self.updated_at = at;
    }

    /// Reactivate in place with new configuration.
    pub fn reactivate(&mut self, config: Option<ConfigMap>, at: DateTime<Utc>) {
        self.config = config;
        self.state = InstallationState::Active;
        self.updated_at = at;
    }

    /// Marker for host records produced on behalf of this installation.
    pub fn external_data_source_lookup(&self) -> PerformedBy {
        PerformedBy {
            installation_id: self.id,
        }
    }
}

/// Attribution of a host record to the installation that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerformedBy {
    pub installation_id: InstallationId,
}

impl PerformedBy {
    pub fn matches(&self, installation: &Installation) -> bool {
        self.installation_id == installation.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn installation() -> Installation {
        Installation::new(ApplicationId::new(), TargetId::new(1), None)
    }

    #[test]
    fn missing_config_reads_as_empty() {
        assert!(installation().get_config().is_empty());
    }

    #[test]
    fn delete_and_reactivate_keep_identity() {
        let mut inst = installation();
        let id = inst.id;
        let t0 = Utc::now();

        inst.mark_deleted(t0);
        assert_eq!(inst.deleted_at(), Some(t0));
        assert!(!inst.is_active());

        let t1 = t0 + Duration::seconds(5);
        inst.mark_deleted(t1);
        assert_eq!(inst.deleted_at(), Some(t1));

        inst.reactivate(None, t1);
        assert!(inst.is_active());
        assert_eq!(inst.deleted_at(), None);
        assert_eq!(inst.id, id);
    }

    #[test]
    fn performed_by_points_at_installation() {
        let inst = installation();
        let marker = inst.external_data_source_lookup();
        assert!(marker.matches(&inst));
        assert!(!marker.matches(&installation()));
    }
}
