use thiserror::Error;

use crate::{AccessToken, Scope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing scope '{0}'")]
    MissingScope(String),
}

/// Require that `token` was granted every scope in `required`.
///
/// Reports the first missing scope in `required` order.
pub fn require_scopes(token: &AccessToken, required: &[Scope]) -> Result<(), AuthzError> {
    let granted = token.scopes();
    match required.iter().find(|s| !granted.contains(s.as_str())) {
        Some(missing) => Err(AuthzError::MissingScope(missing.to_string())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tether_core::ApplicationId;

    fn token(scope: &str) -> AccessToken {
        let mut token = AccessToken::internal(ApplicationId::new(), std::iter::empty(), Utc::now());
        token.scope = scope.to_string();
        token
    }

    #[test]
    fn all_required_scopes_present() {
        let t = token("read write");
        assert_eq!(
            require_scopes(&t, &[Scope::from_static("write"), Scope::from_static("read")]),
            Ok(())
        );
        assert_eq!(require_scopes(&t, &[]), Ok(()));
    }

    #[test]
    fn reports_first_missing_scope() {
        let t = token("read");
        let err = require_scopes(
            &t,
            &[Scope::from_static("read"), Scope::from_static("admin"), Scope::from_static("x")],
        )
        .unwrap_err();
        assert_eq!(err, AuthzError::MissingScope("admin".into()));
    }
}
