//! Field-keyed validation errors.
//!
//! Validation failures are always reported against the field that caused
//! them so callers (HTTP handlers, admin tooling) can surface them next to the
//! offending input. Errors that are not tied to a single field are recorded
//! under [`NON_FIELD_ERRORS`].

use std::collections::BTreeMap;

use serde::Serialize;

/// Key used for errors that are not attached to one field.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// A set of validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationError {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single error attached to `field`.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.add(field, message);
        err
    }

    /// Single error not attached to any field.
    pub fn non_field(message: impl Into<String>) -> Self {
        Self::field(NON_FIELD_ERRORS, message)
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Fold another error set into this one, keeping message order per field.
    pub fn merge(&mut self, other: ValidationError) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// All messages keyed by field.
    pub fn message_dict(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    pub fn messages_for(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// `Ok(value)` when no errors were collected.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationError> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl core::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("validation failed")?;
        let mut sep = ": ";
        for (field, messages) in &self.errors {
            for message in messages {
                write!(f, "{sep}{field}: {message}")?;
                sep = "; ";
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_messages_per_field() {
        let mut err = ValidationError::field("shop", "required");
        err.merge(ValidationError::field("shop", "too long"));
        err.merge(ValidationError::non_field("broken"));

        assert_eq!(err.messages_for("shop"), ["required", "too long"]);
        assert_eq!(err.messages_for(NON_FIELD_ERRORS), ["broken"]);
        assert!(err.messages_for("other").is_empty());
    }

    #[test]
    fn display_lists_every_message() {
        let err = ValidationError::field("extra_field", "Value cannot be forbidden");
        assert_eq!(
            err.to_string(),
            "validation failed: extra_field: Value cannot be forbidden"
        );
    }

    #[test]
    fn into_result_is_ok_only_when_empty() {
        assert_eq!(ValidationError::new().into_result(1), Ok(1));
        assert!(ValidationError::non_field("x").into_result(1).is_err());
    }
}
