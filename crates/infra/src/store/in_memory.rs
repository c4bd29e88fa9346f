use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use tether_auth::AccessToken;
use tether_core::{Application, ApplicationId, Installation, TargetId, ValidationError};
use tether_integrations::{FindError, InstallationFinder, InstallationLookup, InstallationQuery};

use super::{
    ALREADY_INSTALLED, ApplicationStore, InstallCheck, InstallRequest, InstallationStore,
    StoreError, TokenStore,
};

#[derive(Debug, Default)]
struct State {
    applications: HashMap<ApplicationId, Application>,
    installations: HashMap<(ApplicationId, TargetId), Installation>,
    tokens: HashMap<String, AccessToken>,
}

/// Every installation but the one at `skip`, read through the held lock.
struct OtherInstallations<'a> {
    state: &'a State,
    skip: (ApplicationId, TargetId),
}

impl InstallationQuery for OtherInstallations<'_> {
    fn targets_matching(&self, lookup: &InstallationLookup) -> Vec<TargetId> {
        self.state
            .installations
            .iter()
            .filter(|(key, _)| **key != self.skip)
            .filter_map(|(_, inst)| {
                let app = self.state.applications.get(&inst.application_id)?;
                lookup.matches(inst, app).then_some(inst.target)
            })
            .collect()
    }
}

/// In-memory store for tests/dev.
///
/// One lock guards every table, so `install` is serialized against all
/// other writes.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }
}

impl ApplicationStore for InMemoryStore {
    fn get_application(&self, id: ApplicationId) -> Result<Option<Application>, StoreError> {
        Ok(self.read()?.applications.get(&id).cloned())
    }

    fn find_internal_application(&self, name: &str) -> Result<Option<Application>, StoreError> {
        Ok(self
            .read()?
            .applications
            .values()
            .find(|app| app.internal_integration_name() == Some(name))
            .cloned())
    }

    fn internal_applications(&self) -> Result<Vec<Application>, StoreError> {
        let state = self.read()?;
        let mut apps: Vec<_> = state
            .applications
            .values()
            .filter(|app| app.is_internal_integration())
            .cloned()
            .collect();
        apps.sort_by_key(|app| app.created_at);
        Ok(apps)
    }

    fn save_application(&self, application: &Application) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if let Some(name) = application.internal_integration_name() {
            let taken = state.applications.values().any(|other| {
                other.id != application.id && other.internal_integration_name() == Some(name)
            });
            if taken {
                return Err(StoreError::Conflict(format!(
                    "internal integration {name} already has an application"
                )));
            }
        }
        state.applications.insert(application.id, application.clone());
        Ok(())
    }
}

impl InstallationStore for InMemoryStore {
    fn install(
        &self,
        request: InstallRequest,
        check: InstallCheck<'_>,
    ) -> Result<Installation, StoreError> {
        let mut state = self.write()?;
        if !state.applications.contains_key(&request.application_id) {
            return Err(StoreError::NotFound);
        }

        if request.exclusive {
            let elsewhere = state.installations.values().any(|inst| {
                inst.application_id == request.application_id
                    && inst.target != request.target
                    && inst.is_active()
            });
            if elsewhere {
                return Err(ValidationError::non_field(ALREADY_INSTALLED).into());
            }
        }

        let key = (request.application_id, request.target);
        let now = Utc::now();
        let mut installation = match state.installations.get(&key) {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.reactivate(request.config, now);
                updated
            }
            None => Installation::new(request.application_id, request.target, request.config),
        };

        // Nothing is written until the check passes.
        let others = OtherInstallations {
            state: &*state,
            skip: key,
        };
        installation.config = check(&installation, &others)?;
        state.installations.insert(key, installation.clone());
        Ok(installation)
    }

    fn get_installation(
        &self,
        application_id: ApplicationId,
        target: TargetId,
    ) -> Result<Option<Installation>, StoreError> {
        Ok(self
            .read()?
            .installations
            .get(&(application_id, target))
            .cloned())
    }

    fn soft_delete(
        &self,
        application_id: ApplicationId,
        target: TargetId,
        at: DateTime<Utc>,
    ) -> Result<Installation, StoreError> {
        let mut state = self.write()?;
        let installation = state
            .installations
            .get_mut(&(application_id, target))
            .ok_or(StoreError::NotFound)?;
        installation.mark_deleted(at);
        Ok(installation.clone())
    }

    fn find_installations(
        &self,
        lookup: &InstallationLookup,
    ) -> Result<Vec<(Installation, Application)>, StoreError> {
        let state = self.read()?;
        let mut found: Vec<_> = state
            .installations
            .values()
            .filter_map(|inst| {
                let app = state.applications.get(&inst.application_id)?;
                lookup
                    .matches(inst, app)
                    .then(|| (inst.clone(), app.clone()))
            })
            .collect();
        found.sort_by_key(|(inst, _)| inst.created_at);
        Ok(found)
    }
}

impl TokenStore for InMemoryStore {
    fn get_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError> {
        Ok(self.read()?.tokens.get(token).cloned())
    }

    fn find_internal_token(
        &self,
        application_id: ApplicationId,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>, StoreError> {
        Ok(self
            .read()?
            .tokens
            .values()
            .find(|t| {
                t.is_internal_only
                    && t.application_id == application_id
                    && t.scope == scope
                    && !t.is_expired(now)
            })
            .cloned())
    }

    fn save_token(&self, token: &AccessToken) -> Result<(), StoreError> {
        self.write()?
            .tokens
            .insert(token.token.clone(), token.clone());
        Ok(())
    }
}

impl InstallationFinder for InMemoryStore {
    fn find_one(&self, lookup: &InstallationLookup) -> Result<(Installation, Application), FindError> {
        Ok(self.get_one(lookup)?)
    }
}
