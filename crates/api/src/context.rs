use tether_auth::{AccessToken, Subject};
use tether_integrations::Context;

/// Who a request was authenticated as.
///
/// Inserted as a request extension by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAuth {
    /// Internal-only token: trusted server-to-server call, no installation.
    Anonymous,
    /// Token of an integration's application, resolved to one installation.
    Installation {
        subject: Subject,
        token: AccessToken,
        context: Context,
    },
}

impl RequestAuth {
    pub fn installation(&self) -> Option<&Context> {
        match self {
            RequestAuth::Anonymous => None,
            RequestAuth::Installation { context, .. } => Some(context),
        }
    }
}
