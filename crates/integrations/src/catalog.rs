use std::collections::BTreeMap;

use crate::builtin::{ApiClientIntegration, MixpanelIntegration, ShopifyIntegration};
use crate::integration::IntegrationHandle;

pub type Constructor = fn() -> IntegrationHandle;

/// Integrations that can be enabled by identifier at startup.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<&'static str, Constructor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the integrations shipped in [`crate::builtin`].
    pub fn builtin() -> Self {
        Self::new()
            .with(
                "tether_integrations::builtin::api_client::ApiClientIntegration",
                || IntegrationHandle::new(ApiClientIntegration),
            )
            .with(
                "tether_integrations::builtin::shopify::ShopifyIntegration",
                || IntegrationHandle::new(ShopifyIntegration::default()),
            )
            .with(
                "tether_integrations::builtin::mixpanel::MixpanelIntegration",
                || IntegrationHandle::new(MixpanelIntegration::default()),
            )
    }

    pub fn with(mut self, id: &'static str, constructor: Constructor) -> Self {
        self.entries.insert(id, constructor);
        self
    }

    pub fn build(&self, id: &str) -> Option<IntegrationHandle> {
        self.entries.get(id).map(|ctor| ctor())
    }

    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::registry::Registry;

    #[test]
    fn installs_in_list_order() {
        let ids = [
            "tether_integrations::builtin::shopify::ShopifyIntegration",
            "tether_integrations::builtin::api_client::ApiClientIntegration",
        ];
        let registry = Registry::from_installed(&Catalog::builtin(), &ids).unwrap();
        let names: Vec<_> = registry.iter().map(|i| i.name().to_string()).collect();
        assert_eq!(names, ["shopify", "api_client"]);
    }

    #[test]
    fn unknown_identifier_aborts() {
        let err = Registry::from_installed(&Catalog::builtin(), &["crate::Nope"]).unwrap_err();
        assert_eq!(err, RegistryError::UnknownIntegration("crate::Nope".into()));
    }

    #[test]
    fn duplicate_name_aborts() {
        let catalog = Catalog::builtin().with("custom::Shopify", || {
            IntegrationHandle::new(ShopifyIntegration::default())
        });
        let err = Registry::from_installed(
            &catalog,
            &["tether_integrations::builtin::shopify::ShopifyIntegration", "custom::Shopify"],
        )
        .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateIntegration("shopify".into()));
    }
}
