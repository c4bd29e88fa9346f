//! Storage contract for applications, installations and access tokens.
//!
//! The traits are synchronous; adapters that talk to async drivers bridge
//! through the ambient tokio runtime (see [`postgres`]).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use tether_auth::AccessToken;
use tether_core::{
    Application, ApplicationId, ConfigMap, DomainError, Installation, TargetId, ValidationError,
};
use tether_integrations::{FindError, InstallationLookup, InstallationQuery};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Message of the validation error raised when a local application is
/// installed on a second target.
pub const ALREADY_INSTALLED: &str = "Cannot install this local application to more than one target";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("expected exactly one row, found {0}")]
    Multiple(usize),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(err) => StoreError::Validation(err),
            other => StoreError::Storage(other.to_string()),
        }
    }
}

impl From<StoreError> for FindError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => FindError::NotFound,
            StoreError::Multiple(n) => FindError::Multiple(n),
            other => FindError::Backend(other.to_string()),
        }
    }
}

/// Upsert of one (application, target) installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub application_id: ApplicationId,
    pub target: TargetId,
    pub config: Option<ConfigMap>,
    /// Refuse when the application is actively installed on another target.
    pub exclusive: bool,
}

/// Check run on the staged row before the install is committed; returns the
/// config to persist.
///
/// The query answers for every other (application, target) row as seen from
/// inside the install unit.
pub type InstallCheck<'a> = &'a dyn Fn(
    &Installation,
    &dyn InstallationQuery,
) -> Result<Option<ConfigMap>, ValidationError>;

pub trait ApplicationStore: Send + Sync {
    fn get_application(&self, id: ApplicationId) -> Result<Option<Application>, StoreError>;

    /// The application linked to the internal integration `name`.
    fn find_internal_application(&self, name: &str) -> Result<Option<Application>, StoreError>;

    /// Every application linked to an internal integration.
    fn internal_applications(&self) -> Result<Vec<Application>, StoreError>;

    /// Insert or replace by id. Fails with `Conflict` when another
    /// application already holds the same internal integration name.
    fn save_application(&self, application: &Application) -> Result<(), StoreError>;
}

pub trait InstallationStore: Send + Sync {
    /// Atomically: the exclusivity check, the upsert (reactivating a deleted
    /// row in place) and `check`, whose config is what gets stored. Nothing
    /// is persisted when any step fails.
    fn install(
        &self,
        request: InstallRequest,
        check: InstallCheck<'_>,
    ) -> Result<Installation, StoreError>;

    /// Row for (application, target), in any state.
    fn get_installation(
        &self,
        application_id: ApplicationId,
        target: TargetId,
    ) -> Result<Option<Installation>, StoreError>;

    /// Mark the row deleted at `at`; `NotFound` when there is no row.
    fn soft_delete(
        &self,
        application_id: ApplicationId,
        target: TargetId,
        at: DateTime<Utc>,
    ) -> Result<Installation, StoreError>;

    /// Active installations selected by `lookup`, with their applications.
    fn find_installations(
        &self,
        lookup: &InstallationLookup,
    ) -> Result<Vec<(Installation, Application)>, StoreError>;

    fn get_one(&self, lookup: &InstallationLookup) -> Result<(Installation, Application), StoreError> {
        let mut found = self.find_installations(lookup)?;
        match found.len() {
            0 => Err(StoreError::NotFound),
            1 => Ok(found.remove(0)),
            n => Err(StoreError::Multiple(n)),
        }
    }
}

pub trait TokenStore: Send + Sync {
    fn get_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError>;

    /// An unexpired internal-only token of `application_id` with exactly `scope`.
    fn find_internal_token(
        &self,
        application_id: ApplicationId,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>, StoreError>;

    fn save_token(&self, token: &AccessToken) -> Result<(), StoreError>;
}

impl<S> ApplicationStore for Arc<S>
where
    S: ApplicationStore + ?Sized,
{
    fn get_application(&self, id: ApplicationId) -> Result<Option<Application>, StoreError> {
        (**self).get_application(id)
    }

    fn find_internal_application(&self, name: &str) -> Result<Option<Application>, StoreError> {
        (**self).find_internal_application(name)
    }

    fn internal_applications(&self) -> Result<Vec<Application>, StoreError> {
        (**self).internal_applications()
    }

    fn save_application(&self, application: &Application) -> Result<(), StoreError> {
        (**self).save_application(application)
    }
}

impl<S> InstallationStore for Arc<S>
where
    S: InstallationStore + ?Sized,
{
    fn install(
        &self,
        request: InstallRequest,
        check: InstallCheck<'_>,
    ) -> Result<Installation, StoreError> {
        (**self).install(request, check)
    }

    fn get_installation(
        &self,
        application_id: ApplicationId,
        target: TargetId,
    ) -> Result<Option<Installation>, StoreError> {
        (**self).get_installation(application_id, target)
    }

    fn soft_delete(
        &self,
        application_id: ApplicationId,
        target: TargetId,
        at: DateTime<Utc>,
    ) -> Result<Installation, StoreError> {
        (**self).soft_delete(application_id, target, at)
    }

    fn find_installations(
        &self,
        lookup: &InstallationLookup,
    ) -> Result<Vec<(Installation, Application)>, StoreError> {
        (**self).find_installations(lookup)
    }
}

impl<S> TokenStore for Arc<S>
where
    S: TokenStore + ?Sized,
{
    fn get_token(&self, token: &str) -> Result<Option<AccessToken>, StoreError> {
        (**self).get_token(token)
    }

    fn find_internal_token(
        &self,
        application_id: ApplicationId,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessToken>, StoreError> {
        (**self).find_internal_token(application_id, scope, now)
    }

    fn save_token(&self, token: &AccessToken) -> Result<(), StoreError> {
        (**self).save_token(token)
    }
}
