use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tether_core::ConfigMap;

use crate::capability::{Capability, OUTBOUND_CLIENT};
use crate::client::{Client, from_config};
use crate::error::IntegrationError;
use crate::form::{ConfigForm, FieldSpec};
use crate::integration::Integration;

pub const NAME: &str = "mixpanel";
pub const TOKEN_FIELD: &str = "mixpanel_token";

pub const PURCHASE_EVENT: &str = "new_purchase";

#[derive(Debug)]
pub struct MixpanelConfigForm {
    fields: Vec<FieldSpec>,
}

impl ConfigForm for MixpanelConfigForm {
    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }
}

/// Product analytics. Internal: our own Mixpanel project receives events for
/// every target, each with its own project token.
#[derive(Debug, Clone)]
pub struct MixpanelIntegration {
    form: Arc<MixpanelConfigForm>,
}

impl Default for MixpanelIntegration {
    fn default() -> Self {
        Self {
            form: Arc::new(MixpanelConfigForm {
                fields: vec![FieldSpec::text(TOKEN_FIELD)],
            }),
        }
    }
}

impl Integration for MixpanelIntegration {
    fn name(&self) -> &str {
        NAME
    }

    fn display_name(&self) -> &str {
        "Mixpanel"
    }

    fn is_local(&self) -> bool {
        false
    }

    fn capabilities(&self) -> &[Capability] {
        const CAPS: &[Capability] = &[OUTBOUND_CLIENT];
        CAPS
    }

    fn config_form(&self) -> Option<Arc<dyn ConfigForm>> {
        Some(self.form.clone())
    }

    fn build_client(&self, config: ConfigMap) -> Result<Box<dyn Client>, IntegrationError> {
        Ok(Box::new(MixpanelClient::from_settings(from_config(config)?)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MixpanelSettings {
    pub mixpanel_token: String,
}

/// Builds Mixpanel `/track` events; delivery is left to the caller's transport.
#[derive(Debug, Clone)]
pub struct MixpanelClient {
    token: String,
}

impl Client for MixpanelClient {}

/// One `/track` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackEvent {
    pub event: String,
    pub properties: Value,
}

impl MixpanelClient {
    pub fn from_settings(settings: MixpanelSettings) -> Self {
        Self {
            token: settings.mixpanel_token,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn track(&self, distinct_id: &str, event: &str, mut properties: ConfigMap, at: DateTime<Utc>) -> TrackEvent {
        properties.insert("token".into(), self.token.clone().into());
        properties.insert("distinct_id".into(), distinct_id.into());
        properties.insert("time".into(), at.timestamp().into());
        TrackEvent {
            event: event.to_string(),
            properties: Value::Object(properties),
        }
    }

    pub fn register_purchase(
        &self,
        user_id: &str,
        amount: i64,
        currency: &str,
        source_integration: &str,
    ) -> TrackEvent {
        let mut properties = ConfigMap::new();
        properties.insert("amount".into(), amount.into());
        properties.insert("currency".into(), currency.into());
        properties.insert("source_integration".into(), source_integration.into());
        self.track(user_id, PURCHASE_EVENT, properties, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use serde_json::json;
    use tether_core::config::from_value;
    use tether_core::{Application, Installation, TargetId};

    fn ctx(config: Value) -> Context {
        Context::new(Installation::new(
            Application::internal(NAME).id,
            TargetId::new(2),
            Some(from_value(config).unwrap()),
        ))
    }

    #[test]
    fn client_uses_installation_token_with_overrides() {
        let mixpanel = MixpanelIntegration::default();
        let client = mixpanel
            .get_client(&ctx(json!({TOKEN_FIELD: "stored"})), ConfigMap::new())
            .unwrap();
        assert_eq!(client.downcast_ref::<MixpanelClient>().unwrap().token(), "stored");

        let overrides = from_value(json!({TOKEN_FIELD: "override"})).unwrap();
        let client = mixpanel.get_client(&ctx(json!({TOKEN_FIELD: "stored"})), overrides).unwrap();
        assert_eq!(client.downcast_ref::<MixpanelClient>().unwrap().token(), "override");
    }

    #[test]
    fn client_needs_a_token() {
        let err = MixpanelIntegration::default()
            .get_client(&ctx(json!({})), ConfigMap::new())
            .unwrap_err();
        assert!(matches!(err, IntegrationError::InvalidClientConfig(_)));
    }

    #[test]
    fn purchase_event_payload() {
        let client = MixpanelClient::from_settings(MixpanelSettings {
            mixpanel_token: "tok".into(),
        });
        let event = client.register_purchase("42", 1999, "EUR", "shopify");
        assert_eq!(event.event, PURCHASE_EVENT);
        assert_eq!(event.properties["token"], "tok");
        assert_eq!(event.properties["distinct_id"], "42");
        assert_eq!(event.properties["amount"], 1999);
        assert_eq!(event.properties["source_integration"], "shopify");
    }
}
