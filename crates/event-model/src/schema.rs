//! Schema-tagged payload validation.
//!
//! Replaces reflective, generic record serialization with a registry keyed by
//! `event_type`: each event type declares its field shape up front, and ingress
//! rejects anything the registry doesn't recognize (see [`SchemaRegistry::validate`]).

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

/// The field types a schema can declare. Monetary values are carried as decimal
/// strings (never floats) to avoid rounding drift across services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Int,
    Long,
    Bool,
    Decimal,
    Array(Box<FieldType>),
    Record(Vec<(&'static str, FieldType)>),
}

#[derive(Debug, Clone)]
pub struct Schema {
    pub event_type: &'static str,
    pub fields: Vec<(&'static str, FieldType)>,
}

impl Schema {
    pub fn new(event_type: &'static str, fields: Vec<(&'static str, FieldType)>) -> Self {
        Self { event_type, fields }
    }

    fn validate_value(field: &str, expected: &FieldType, value: Option<&Value>) -> Result<(), SchemaError> {
        let value = match value {
            Some(v) => v,
            None => {
                return Err(SchemaError::MissingField {
                    field: field.to_string(),
                })
            }
        };

        let matches = match expected {
            FieldType::String => value.is_string(),
            FieldType::Int | FieldType::Long => value.is_i64() || value.is_u64(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Decimal => value
                .as_str()
                .is_some_and(|s| s.parse::<bigdecimal::BigDecimal>().is_ok()),
            FieldType::Array(inner) => match value.as_array() {
                Some(items) => {
                    return items
                        .iter()
                        .enumerate()
                        .try_for_each(|(i, item)| {
                            Self::validate_value(&format!("{field}[{i}]"), inner, Some(item))
                        });
                }
                None => false,
            },
            FieldType::Record(inner_fields) => match value.as_object() {
                Some(obj) => {
                    return inner_fields.iter().try_for_each(|(name, ty)| {
                        Self::validate_value(&format!("{field}.{name}"), ty, obj.get(*name))
                    });
                }
                None => false,
            },
        };

        if matches {
            Ok(())
        } else {
            Err(SchemaError::TypeMismatch {
                field: field.to_string(),
                expected: format!("{expected:?}"),
            })
        }
    }

    pub fn validate(&self, payload: &Value) -> Result<(), SchemaError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| SchemaError::NotAnObject {
                event_type: self.event_type.to_string(),
            })?;

        for (field, ty) in &self.fields {
            Self::validate_value(field, ty, obj.get(*field))?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unknown event type: {event_type}")]
    UnknownEventType { event_type: String },
    #[error("payload for {event_type} is not a JSON object")]
    NotAnObject { event_type: String },
    #[error("missing required field: {field}")]
    MissingField { field: String },
    #[error("field {field} does not match expected type {expected}")]
    TypeMismatch { field: String, expected: String },
}

/// Registry of named schemas keyed by `event_type`. Ingress rejects anything not
/// registered (§9 "generic serialization via reflective records" redesign flag).
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<&'static str, Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: Schema) -> &mut Self {
        self.schemas.insert(schema.event_type, schema);
        self
    }

    pub fn get(&self, event_type: &str) -> Option<&Schema> {
        self.schemas.get(event_type)
    }

    /// Validate a payload against its registered schema. Unknown event types are
    /// rejected at ingress rather than silently accepted.
    pub fn validate(&self, event_type: &str, payload: &Value) -> Result<(), SchemaError> {
        let schema = self
            .get(event_type)
            .ok_or_else(|| SchemaError::UnknownEventType {
                event_type: event_type.to_string(),
            })?;
        schema.validate(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.register(Schema::new(
            "OrderCreated",
            vec![
                ("customerId", FieldType::String),
                (
                    "lineItems",
                    FieldType::Array(Box::new(FieldType::Record(vec![
                        ("productId", FieldType::String),
                        ("quantity", FieldType::Int),
                        ("unitPrice", FieldType::Decimal),
                    ]))),
                ),
            ],
        ));
        registry
    }

    #[test]
    fn accepts_well_formed_payload() {
        let registry = registry();
        let payload = serde_json::json!({
            "customerId": "c1",
            "lineItems": [{"productId": "p1", "quantity": 2, "unitPrice": "10.00"}]
        });
        assert!(registry.validate("OrderCreated", &payload).is_ok());
    }

    #[test]
    fn rejects_unknown_event_type() {
        let registry = registry();
        let err = registry
            .validate("SomethingElse", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownEventType { .. }));
    }

    #[test]
    fn rejects_bad_decimal() {
        let registry = registry();
        let payload = serde_json::json!({
            "customerId": "c1",
            "lineItems": [{"productId": "p1", "quantity": 2, "unitPrice": "not-a-number"}]
        });
        assert!(registry.validate("OrderCreated", &payload).is_err());
    }
}
