//! `tether-core` — domain building blocks for the integrations layer.
//!
//! This crate contains **pure domain** primitives (no storage, no HTTP): the
//! OAuth2 `Application` entity extended with integration links, the
//! soft-deletable `Installation`, configuration maps and field-keyed
//! validation errors.

pub mod application;
pub mod config;
pub mod error;
pub mod id;
pub mod installation;
pub mod validation;

pub use application::{Application, ClientType, GrantType, IntegrationLink};
pub use config::ConfigMap;
pub use error::{DomainError, DomainResult};
pub use id::{ApplicationId, InstallationId, TargetId};
pub use installation::{Installation, InstallationState, PerformedBy};
pub use validation::{NON_FIELD_ERRORS, ValidationError};
