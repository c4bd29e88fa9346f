use serde::Serialize;
use serde_json::Value;

pub(crate) const REQUIRED: &str = "This field is required.";

/// Value type of a config field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    /// Trimmed string.
    Text { max_length: Option<usize> },
    Integer,
    Boolean,
    /// Any JSON value; strings are parsed as JSON documents.
    Json,
}

/// Declaration of one config field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub initial: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_text: Option<&'static str>,
}

impl FieldSpec {
    fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            initial: None,
            help_text: None,
        }
    }

    pub fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text { max_length: None })
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn json(name: &'static str) -> Self {
        Self::new(name, FieldKind::Json)
    }

    /// Only meaningful for text fields.
    pub fn max_length(mut self, max: usize) -> Self {
        if let FieldKind::Text { max_length } = &mut self.kind {
            *max_length = Some(max);
        }
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn initial(mut self, value: impl Into<Value>) -> Self {
        self.initial = Some(value.into());
        self
    }

    pub fn help_text(mut self, text: &'static str) -> Self {
        self.help_text = Some(text);
        self
    }

    /// Clean one raw input value.
    ///
    /// `Ok(None)` means the optional field was left empty and is omitted from
    /// cleaned data.
    pub fn clean(&self, raw: Option<&Value>) -> Result<Option<Value>, String> {
        let raw = match raw {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() && !matches!(self.kind, FieldKind::Json) => None,
            Some(v) => Some(v),
        };
        let Some(raw) = raw else {
            return if self.required {
                Err(REQUIRED.to_string())
            } else {
                Ok(None)
            };
        };

        match &self.kind {
            FieldKind::Text { max_length } => {
                let text = match raw {
                    Value::String(s) => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return Err("Enter a valid value.".to_string()),
                };
                let len = text.chars().count();
                match max_length {
                    Some(max) if len > *max => Err(format!(
                        "Ensure this value has at most {max} characters (it has {len})."
                    )),
                    _ => Ok(Some(Value::String(text))),
                }
            }
            FieldKind::Integer => {
                let parsed = match raw {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                parsed
                    .map(|n| Some(Value::from(n)))
                    .ok_or_else(|| "Enter a whole number.".to_string())
            }
            FieldKind::Boolean => {
                let parsed = match raw {
                    Value::Bool(b) => Some(*b),
                    Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                        "true" | "on" | "1" => Some(true),
                        "false" | "off" | "0" => Some(false),
                        _ => None,
                    },
                    Value::Number(n) => match n.as_i64() {
                        Some(1) => Some(true),
                        Some(0) => Some(false),
                        _ => None,
                    },
                    _ => None,
                };
                parsed
                    .map(|b| Some(Value::Bool(b)))
                    .ok_or_else(|| "Enter a valid boolean.".to_string())
            }
            FieldKind::Json => match raw {
                Value::String(s) => {
                    if s.trim().is_empty() {
                        return if self.required {
                            Err(REQUIRED.to_string())
                        } else {
                            Ok(None)
                        };
                    }
                    serde_json::from_str(s)
                        .map(Some)
                        .map_err(|_| "Enter a valid JSON.".to_string())
                }
                other => Ok(Some(other.clone())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_is_trimmed_and_bounded() {
        let field = FieldSpec::text("extra_field").max_length(10);
        assert_eq!(field.clean(Some(&json!("  ok  "))), Ok(Some(json!("ok"))));
        assert_eq!(
            field.clean(Some(&json!("0123456789x"))),
            Err("Ensure this value has at most 10 characters (it has 11).".into())
        );
        assert_eq!(field.clean(Some(&json!(42))), Ok(Some(json!("42"))));
    }

    #[test]
    fn required_and_optional_empties() {
        let required = FieldSpec::text("a");
        let optional = FieldSpec::text("a").optional();
        for empty in [None, Some(json!(null)), Some(json!("   "))] {
            assert_eq!(required.clean(empty.as_ref()), Err(REQUIRED.into()));
            assert_eq!(optional.clean(empty.as_ref()), Ok(None));
        }
    }

    #[test]
    fn integers_and_booleans_coerce_strings() {
        assert_eq!(FieldSpec::integer("n").clean(Some(&json!(" 12 "))), Ok(Some(json!(12))));
        assert!(FieldSpec::integer("n").clean(Some(&json!("1.5"))).is_err());
        assert_eq!(FieldSpec::boolean("b").clean(Some(&json!("on"))), Ok(Some(json!(true))));
        assert_eq!(FieldSpec::boolean("b").clean(Some(&json!(0))), Ok(Some(json!(false))));
        assert!(FieldSpec::boolean("b").clean(Some(&json!("maybe"))).is_err());
    }

    #[test]
    fn json_fields_parse_strings() {
        let field = FieldSpec::json("j");
        assert_eq!(field.clean(Some(&json!("{\"a\": 1}"))), Ok(Some(json!({"a": 1}))));
        assert_eq!(field.clean(Some(&json!([1, 2]))), Ok(Some(json!([1, 2]))));
        assert_eq!(field.clean(Some(&json!("{"))), Err("Enter a valid JSON.".into()));
    }
}
