use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Tag an integration declares to advertise a behaviour it implements.
///
/// Registry filters and authentication resolvers select integrations by the
/// tags they declare, never by their concrete type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(Cow<'static, str>);

/// Answers OAuth2 bearer requests on behalf of tenant API clients.
pub const API_CLIENT: Capability = Capability::from_static("api_client");

/// Receives signed webhooks from the third party.
pub const WEBHOOKS: Capability = Capability::from_static("webhooks");

/// Provides an outbound client.
pub const OUTBOUND_CLIENT: Capability = Capability::from_static("outbound_client");

impl Capability {
    /// Tag known at compile time. Checked when handed to the registry.
    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    /// Tag from untrusted input.
    pub fn parse(tag: impl Into<Cow<'static, str>>) -> Result<Self, RegistryError> {
        let cap = Self(tag.into());
        cap.validate()?;
        Ok(cap)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty, `[a-z0-9_.:-]` only.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let ok = !self.0.is_empty()
            && self.0.bytes().all(|b| {
                b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'.' | b':' | b'-')
            });
        if ok {
            Ok(())
        } else {
            Err(RegistryError::InvalidCapability(self.0.to_string()))
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tags_are_well_formed() {
        for cap in [API_CLIENT, WEBHOOKS, OUTBOUND_CLIENT] {
            assert!(cap.validate().is_ok(), "{cap}");
        }
    }

    #[test]
    fn rejects_malformed_tags() {
        for bad in ["", "Webhooks", "has space", "emoji✓"] {
            assert_eq!(
                Capability::parse(bad.to_string()),
                Err(RegistryError::InvalidCapability(bad.to_string()))
            );
        }
        assert!(Capability::parse("shop.v2:read-write").is_ok());
    }
}
