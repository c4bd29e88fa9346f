//! `tether-integrations` — pluggable integrations on top of the OAuth2 provider.
//!
//! - [`Integration`]: a named definition with config schema, routes, client
//!   factory and request-to-installation lookup
//! - [`Registry`]: runtime catalog, populated once at startup
//! - [`form`]: two-stage config validation
//! - [`builtin`]: the integrations shipped with the crate
//!
//! Storage lives in `tether-infra`; this crate only describes what
//! integrations need from it ([`InstallationFinder`], [`form::FormBackend`]).

pub mod builtin;
pub mod capability;
pub mod catalog;
pub mod client;
pub mod context;
pub mod error;
pub mod form;
pub mod integration;
pub mod lookup;
pub mod registry;
pub mod request;

pub use capability::Capability;
pub use catalog::Catalog;
pub use client::Client;
pub use context::{Context, DEFAULT_TARGET_LABEL};
pub use error::{FindError, FormError, IntegrationError, LookupError, RegistryError};
pub use form::{BoundForm, ConfigForm, FieldSpec, FormBackend, FormContext, InstallationForm};
pub use integration::{Integration, IntegrationHandle};
pub use lookup::{InstallationFinder, InstallationLookup, InstallationQuery, LookupScope};
pub use registry::{IntegrationKey, Registry};
pub use request::InboundRequest;
