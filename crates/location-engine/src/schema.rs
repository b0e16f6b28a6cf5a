//! Declared property types used to coerce filter values.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use edr_protocol::QueryParameterError;

use crate::error::{EngineError, EngineResult};

/// Properties every record carries regardless of schema.
pub const BUILTIN_PROPERTIES: [&str; 3] = ["id", "name", "elevation"];

/// Type of a filterable property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
}

/// Property names and types a source exposes for filtering and sorting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    fields: BTreeMap<String, FieldType>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field.
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(name.into(), field_type);
        self
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Whether records can be sorted on this property.
    pub fn is_sortable(&self, name: &str) -> bool {
        BUILTIN_PROPERTIES.contains(&name) || self.contains(name)
    }

    /// Declared field names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Convert a raw filter value to the field's declared type.
    pub fn coerce(&self, name: &str, raw: &str) -> EngineResult<Value> {
        let field_type = self.field_type(name).ok_or_else(|| {
            EngineError::Query(QueryParameterError::invalid(
                "properties",
                format!("Unknown property '{}'", name),
            ))
        })?;

        let raw = raw.trim();
        let value = match field_type {
            FieldType::String => Value::String(raw.to_string()),
            FieldType::Integer => raw.parse::<i64>().map(Value::from).map_err(|_| {
                QueryParameterError::invalid(
                    "properties",
                    format!("Property '{}' expects an integer, got '{}'", name, raw),
                )
            })?,
            FieldType::Number => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::from)
                .ok_or_else(|| {
                    QueryParameterError::invalid(
                        "properties",
                        format!("Property '{}' expects a number, got '{}'", name, raw),
                    )
                })?,
        };
        Ok(value)
    }
}

/// Whether a rendered property value equals a coerced filter value.
///
/// Numbers compare numerically, including numeric strings served by
/// upstreams that stringify their numbers.
pub fn values_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::String(a), Value::Number(b)) => {
            a.trim().parse::<f64>().ok() == b.as_f64()
        }
        _ => actual == expected,
    }
}
