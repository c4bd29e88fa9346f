use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use tether_core::ConfigMap;
use tether_core::config::merged;

use crate::context::Context;
use crate::error::IntegrationError;
use crate::integration::AsAny;

/// Outbound client of an integration.
///
/// Callers that know the concrete integration downcast the boxed client.
pub trait Client: AsAny + Send + Sync + fmt::Debug {}

impl dyn Client {
    pub fn downcast_ref<C: Client + 'static>(&self) -> Option<&C> {
        AsAny::as_any(self).downcast_ref::<C>()
    }
}

/// Client arguments: a copy of the installation's config with `extra` on top.
pub fn client_config(ctx: &Context, extra: ConfigMap) -> ConfigMap {
    merged(&ctx.config(), extra)
}

/// Deserialize typed client settings from a config map.
pub fn from_config<C: DeserializeOwned>(config: ConfigMap) -> Result<C, IntegrationError> {
    serde_json::from_value(Value::Object(config))
        .map_err(|e| IntegrationError::InvalidClientConfig(e.to_string()))
}
