//! Integrations shipped with the crate.

pub mod api_client;
pub mod mixpanel;
pub mod shopify;

pub use api_client::ApiClientIntegration;
pub use mixpanel::{MixpanelClient, MixpanelIntegration};
pub use shopify::ShopifyIntegration;
