//! Infrastructure layer: storage adapters, installation lifecycle, request
//! authentication, registry sync and process settings.

pub mod config;
pub mod lifecycle;
pub mod resolver;
pub mod store;
pub mod sync;
pub mod validator;

pub use config::{ConfigError, Settings};
pub use lifecycle::{InstallError, IntegrationService};
pub use resolver::{AuthError, Authentication, IntegrationAuthenticator};
pub use store::{
    ApplicationStore, InMemoryStore, InstallRequest, InstallationStore, PostgresStore, StoreError,
    TokenStore,
};
pub use sync::{SyncError, SyncReport, sync_with_registry};
pub use validator::StoreTokenValidator;
