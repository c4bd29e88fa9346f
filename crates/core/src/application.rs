//! OAuth2 application entity extended with integration links.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};
use crate::id::ApplicationId;

/// OAuth2 client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    #[default]
    Confidential,
    Public,
}

impl ClientType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientType::Confidential => "confidential",
            ClientType::Public => "public",
        }
    }
}

/// OAuth2 authorization grant type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GrantType {
    #[default]
    AuthorizationCode,
    Implicit,
    Password,
    ClientCredentials,
}

impl GrantType {
    pub fn as_str(self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization-code",
            GrantType::Implicit => "implicit",
            GrantType::Password => "password",
            GrantType::ClientCredentials => "client-credentials",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorization-code" => Some(GrantType::AuthorizationCode),
            "implicit" => Some(GrantType::Implicit),
            "password" => Some(GrantType::Password),
            "client-credentials" => Some(GrantType::ClientCredentials),
            _ => None,
        }
    }
}

/// Which integration an application belongs to, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationLink<'a> {
    /// Sole global application of a non-local integration.
    Internal(&'a str),
    /// One tenant-specific application of a local integration.
    Local(&'a str),
}

impl<'a> IntegrationLink<'a> {
    pub fn name(self) -> &'a str {
        match self {
            IntegrationLink::Internal(name) | IntegrationLink::Local(name) => name,
        }
    }
}

/// An OAuth2 client application.
///
/// # Invariants
/// - At most one of `internal_integration_name` / `local_integration_name` is set.
///   The fields are private so every constructor enforces this.
/// - `internal_integration_name` is unique across applications (enforced by stores).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
    pub client_id: String,
    pub client_type: ClientType,
    pub authorization_grant_type: GrantType,
    /// Space separated list of allowed redirect URIs.
    pub redirect_uris: String,
    /// Space separated list of scopes this application may request.
    pub allowed_scopes: Option<String>,
    pub is_approved: bool,
    internal_integration_name: Option<String>,
    local_integration_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Application {
    /// A plain application not linked to any integration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ApplicationId::new(),
            name: name.into(),
            client_id: Uuid::now_v7().simple().to_string(),
            client_type: ClientType::Confidential,
            authorization_grant_type: GrantType::ClientCredentials,
            redirect_uris: String::new(),
            allowed_scopes: None,
            is_approved: false,
            internal_integration_name: None,
            local_integration_name: None,
            created_at: Utc::now(),
        }
    }

    /// The global, approved application representing a non-local integration.
    pub fn internal(integration_name: impl Into<String>) -> Self {
        let integration_name = integration_name.into();
        let mut app = Self::new(format!("{integration_name} (Internal)"));
        app.is_approved = true;
        app.internal_integration_name = Some(integration_name);
        app
    }

    /// A tenant-specific application of a local integration.
    pub fn local(name: impl Into<String>, integration_name: impl Into<String>) -> Self {
        let mut app = Self::new(name);
        app.local_integration_name = Some(integration_name.into());
        app
    }

    /// Replace both integration links at once (storage rehydration, admin edits).
    pub fn with_integration_names(
        mut self,
        internal_integration_name: Option<String>,
        local_integration_name: Option<String>,
    ) -> DomainResult<Self> {
        if let (Some(internal), Some(local)) = (&internal_integration_name, &local_integration_name) {
            return Err(DomainError::ConflictingLinks {
                internal: internal.clone(),
                local: local.clone(),
            });
        }
        self.internal_integration_name = internal_integration_name;
        self.local_integration_name = local_integration_name;
        Ok(self)
    }

    pub fn internal_integration_name(&self) -> Option<&str> {
        self.internal_integration_name.as_deref()
    }

    pub fn local_integration_name(&self) -> Option<&str> {
        self.local_integration_name.as_deref()
    }

    pub fn integration_link(&self) -> Option<IntegrationLink<'_>> {
        match (&self.internal_integration_name, &self.local_integration_name) {
            (Some(name), _) => Some(IntegrationLink::Internal(name)),
            (None, Some(name)) => Some(IntegrationLink::Local(name)),
            (None, None) => None,
        }
    }

    pub fn integration_name(&self) -> Option<&str> {
        self.integration_link().map(IntegrationLink::name)
    }

    pub fn is_internal_integration(&self) -> bool {
        self.internal_integration_name.is_some()
    }

    pub fn is_local_integration(&self) -> bool {
        self.local_integration_name.is_some()
    }

    /// Whether the application may be used to authenticate requests.
    pub fn is_usable(&self) -> bool {
        self.is_approved
    }

    pub fn status_text(&self) -> &'static str {
        if self.is_approved { "Live" } else { "Pending approval" }
    }

    /// The client credentials grant is always allowed, on top of the
    /// application's own grant type.
    pub fn allows_grant_type(&self, grant_types: &[GrantType]) -> bool {
        grant_types.iter().any(|g| {
            *g == self.authorization_grant_type || *g == GrantType::ClientCredentials
        })
    }

    /// Distinct URI schemes found in `redirect_uris`.
    pub fn allowed_schemes(&self) -> Vec<String> {
        let schemes: BTreeSet<String> = self
            .redirect_uris
            .split_whitespace()
            .filter_map(uri_scheme)
            .map(str::to_ascii_lowercase)
            .collect();
        schemes.into_iter().collect()
    }

    /// Subset of `all_scopes` (name → description) granted by `allowed_scopes`.
    pub fn valid_scopes_access(
        &self,
        all_scopes: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let allowed: BTreeSet<&str> = self
            .allowed_scopes
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default();
        all_scopes
            .iter()
            .filter(|(name, _)| allowed.contains(name.as_str()))
            .map(|(name, desc)| (name.clone(), desc.clone()))
            .collect()
    }
}

fn uri_scheme(uri: &str) -> Option<&str> {
    let (scheme, _) = uri.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    chars
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .then_some(scheme)
}
