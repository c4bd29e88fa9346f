use crate::capability::{API_CLIENT, Capability};
use crate::integration::Integration;

pub const NAME: &str = "api_client";

/// Tenant-owned OAuth2 client calling the public API.
///
/// Local: each tenant creates its own application, installed on exactly one
/// target. Requests are mapped to that installation through the token's
/// application alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApiClientIntegration;

impl Integration for ApiClientIntegration {
    fn name(&self) -> &str {
        NAME
    }

    fn display_name(&self) -> &str {
        "API client"
    }

    fn is_local(&self) -> bool {
        true
    }

    fn is_uninstallable(&self) -> bool {
        true
    }

    fn capabilities(&self) -> &[Capability] {
        const CAPS: &[Capability] = &[API_CLIENT];
        CAPS
    }
}
