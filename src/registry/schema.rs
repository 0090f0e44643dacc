//! Settings-schema descriptors.
//!
//! Re-expresses the source's ad-hoc per-capability settings form as a
//! typed field list the API can validate raw JSON against before any task
//! is enqueued, per the redesign notes.

use std::collections::HashMap;

use serde_json::Value;

/// The shape a single settings field may take.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Bool,
    Int { min: Option<i64>, max: Option<i64> },
    Float { min: Option<f64>, max: Option<f64> },
    String,
    Enum(Vec<&'static str>),
}

/// One field in a capability's settings schema.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub optional: bool,
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            optional: false,
            default: None,
        }
    }

    pub fn optional_with_default(name: &'static str, kind: FieldKind, default: Value) -> Self {
        Self {
            name,
            kind,
            optional: true,
            default: Some(default),
        }
    }
}

/// The full settings schema for one capability.
#[derive(Debug, Clone, Default)]
pub struct SettingsSchema {
    pub fields: Vec<FieldSpec>,
}

impl SettingsSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Validate `raw` against this schema, returning a map of field name to
    /// error messages on failure. An empty settings object validates
    /// successfully against a schema with no required fields.
    pub fn validate(&self, raw: &Value) -> Result<Value, HashMap<String, Vec<String>>> {
        let mut errors: HashMap<String, Vec<String>> = HashMap::new();
        let object = raw.as_object().cloned().unwrap_or_default();
        let mut resolved = serde_json::Map::new();

        for field in &self.fields {
            match object.get(field.name) {
                Some(value) => match validate_field(field, value) {
                    Ok(()) => {
                        resolved.insert(field.name.to_string(), value.clone());
                    }
                    Err(message) => {
                        errors.entry(field.name.to_string()).or_default().push(message);
                    }
                },
                None => {
                    if field.optional {
                        if let Some(default) = &field.default {
                            resolved.insert(field.name.to_string(), default.clone());
                        }
                    } else {
                        errors
                            .entry(field.name.to_string())
                            .or_default()
                            .push("field is required".to_string());
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(Value::Object(resolved))
        } else {
            Err(errors)
        }
    }
}

fn validate_field(field: &FieldSpec, value: &Value) -> Result<(), String> {
    match &field.kind {
        FieldKind::Bool => {
            if value.is_boolean() {
                Ok(())
            } else {
                Err("expected a boolean".to_string())
            }
        }
        FieldKind::Int { min, max } => {
            let n = value
                .as_i64()
                .ok_or_else(|| "expected an integer".to_string())?;
            if let Some(min) = min {
                if n < *min {
                    return Err(format!("must be >= {min}"));
                }
            }
            if let Some(max) = max {
                if n > *max {
                    return Err(format!("must be <= {max}"));
                }
            }
            Ok(())
        }
        FieldKind::Float { min, max } => {
            let n = value
                .as_f64()
                .ok_or_else(|| "expected a number".to_string())?;
            if let Some(min) = min {
                if n < *min {
                    return Err(format!("must be >= {min}"));
                }
            }
            if let Some(max) = max {
                if n > *max {
                    return Err(format!("must be <= {max}"));
                }
            }
            Ok(())
        }
        FieldKind::String => {
            if value.is_string() {
                Ok(())
            } else {
                Err("expected a string".to_string())
            }
        }
        FieldKind::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.contains(&s) => Ok(()),
            _ => Err(format!("must be one of {allowed:?}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_field_is_an_error() {
        let schema = SettingsSchema::new(vec![FieldSpec::required("width", FieldKind::Int {
            min: Some(1),
            max: None,
        })]);
        let errors = schema.validate(&json!({})).unwrap_err();
        assert!(errors.contains_key("width"));
    }

    #[test]
    fn optional_field_falls_back_to_default() {
        let schema = SettingsSchema::new(vec![FieldSpec::optional_with_default(
            "quality",
            FieldKind::Int {
                min: Some(0),
                max: Some(100),
            },
            json!(80),
        )]);
        let resolved = schema.validate(&json!({})).unwrap();
        assert_eq!(resolved["quality"], json!(80));
    }

    #[test]
    fn enum_field_rejects_unknown_value() {
        let schema = SettingsSchema::new(vec![FieldSpec::required(
            "image_format",
            FieldKind::Enum(vec!["GIF", "JPEG", "PNG", "WEBP"]),
        )]);
        let errors = schema
            .validate(&json!({"image_format": "BMP"}))
            .unwrap_err();
        assert!(errors.contains_key("image_format"));
    }
}
