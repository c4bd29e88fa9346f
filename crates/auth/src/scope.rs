use std::borrow::Cow;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// OAuth2 scope identifier.
///
/// Scopes are opaque strings at this layer (e.g. `"purchase:shopify:write"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(Cow<'static, str>);

impl Scope {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Scope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Set of scopes as carried by a token (space separated on the wire).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn parse(scope: &str) -> Self {
        Self(scope.split_whitespace().map(str::to_string).collect())
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn contains_all<'a>(&self, required: impl IntoIterator<Item = &'a Scope>) -> bool {
        required.into_iter().all(|s| self.contains(s.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl core::fmt::Display for ScopeSet {
    /// Sorted, space separated.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope)?;
            first = false;
        }
        Ok(())
    }
}

impl<'a> FromIterator<&'a Scope> for ScopeSet {
    fn from_iter<T: IntoIterator<Item = &'a Scope>>(iter: T) -> Self {
        Self(iter.into_iter().map(|s| s.as_str().to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ignores_extra_whitespace() {
        let set = ScopeSet::parse("  read   write:orders ");
        assert!(set.contains("read"));
        assert!(set.contains("write:orders"));
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn display_is_sorted() {
        let scopes = [Scope::from_static("webhook:write"), Scope::from_static("purchase:write")];
        let set: ScopeSet = scopes.iter().collect();
        assert_eq!(set.to_string(), "purchase:write webhook:write");
    }
}
