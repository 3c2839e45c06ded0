//! Dynamic property values carried by model instances.
//!
//! A [`Value`] is the in-memory form of a single model property. It sits between the
//! two external representations: [`serde_json::Value`] on the wire and [`Bson`] in the
//! store. Nested models are held as [`Value::Model`] so a property declared as a nested
//! model is always an instance of its class, never a bare object.
//!
//! The conversions in this module are *raw*: they know nothing about field metadata.
//! The JSON and DB marshallers walk nested models themselves and only fall back to these
//! conversions for leaf values.

use std::collections::BTreeMap;

use bson::{Bson, Document, oid::ObjectId};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use crate::instance::ModelInstance;

/// A single property value of a model instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value (all integer widths are widened to `i64`).
    Int(i64),
    /// Floating point value.
    Double(f64),
    /// String value.
    String(String),
    /// Point in time.
    DateTime(DateTime<Utc>),
    /// Store-native object identifier.
    ObjectId(ObjectId),
    /// Ordered list of values, possibly of nested models.
    Array(Vec<Value>),
    /// Untyped key/value map, kept verbatim.
    Object(BTreeMap<String, Value>),
    /// Nested model instance.
    Model(Box<ModelInstance>),
    /// Store-native value with no dedicated variant (binary, decimal128, regex, ...).
    Opaque(Bson),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness as used by flag-based privacy rules.
    ///
    /// `null`, `false`, `0`, `0.0`, `NaN` and the empty string are falsy, everything else
    /// is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            Value::Double(value) => *value != 0.0 && !value.is_nan(),
            Value::String(value) => !value.is_empty(),
            _ => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::DateTime(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&ModelInstance> {
        match self {
            Value::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_model_mut(&mut self) -> Option<&mut ModelInstance> {
        match self {
            Value::Model(model) => Some(model),
            _ => None,
        }
    }

    /// Converts a JSON value into a raw [`Value`].
    ///
    /// Objects become [`Value::Object`]; no model instantiation happens here.
    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(value) => Value::Bool(*value),
            JsonValue::Number(number) => match number.as_i64() {
                Some(value) => Value::Int(value),
                None => Value::Double(number.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(value) => Value::String(value.clone()),
            JsonValue::Array(values) => Value::Array(values.iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Converts this value into JSON.
    ///
    /// Datetimes are rendered as RFC 3339 strings with millisecond precision and object
    /// identifiers as their hex string. Nested models are rendered from their raw property
    /// bag; use the JSON marshaller to honour field metadata.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(value) => JsonValue::Bool(*value),
            Value::Int(value) => JsonValue::Number(Number::from(*value)),
            Value::Double(value) => Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(value) => JsonValue::String(value.clone()),
            Value::DateTime(value) => {
                JsonValue::String(value.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::ObjectId(value) => JsonValue::String(value.to_hex()),
            Value::Array(values) => JsonValue::Array(values.iter().map(Value::to_json).collect()),
            Value::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect::<JsonMap<_, _>>(),
            ),
            Value::Model(model) => {
                let mut map = model
                    .properties()
                    .map(|(key, value)| (key.to_string(), value.to_json()))
                    .collect::<JsonMap<_, _>>();

                if let Some(id) = model.id() {
                    map.insert(crate::identifier::ID_FIELD.to_string(), id.to_json());
                }

                JsonValue::Object(map)
            }
            Value::Opaque(bson) => serde_json::to_value(bson).unwrap_or(JsonValue::Null),
        }
    }

    /// Converts a BSON value into a raw [`Value`].
    pub fn from_bson(bson: &Bson) -> Value {
        match bson {
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::Boolean(value) => Value::Bool(*value),
            Bson::Int32(value) => Value::Int(i64::from(*value)),
            Bson::Int64(value) => Value::Int(*value),
            Bson::Double(value) => Value::Double(*value),
            Bson::String(value) => Value::String(value.clone()),
            Bson::DateTime(value) => Value::DateTime(value.to_chrono()),
            Bson::ObjectId(value) => Value::ObjectId(*value),
            Bson::Array(values) => Value::Array(values.iter().map(Value::from_bson).collect()),
            Bson::Document(doc) => Value::Object(
                doc.iter()
                    .map(|(key, value)| (key.clone(), Value::from_bson(value)))
                    .collect(),
            ),
            other => Value::Opaque(other.clone()),
        }
    }

    /// Converts this value into BSON.
    ///
    /// Integers that fit in 32 bits are stored as `Int32`. Nested models are rendered from
    /// their raw property bag; use the DB marshaller to honour field metadata.
    pub fn to_bson(&self) -> Bson {
        match self {
            Value::Null => Bson::Null,
            Value::Bool(value) => Bson::Boolean(*value),
            Value::Int(value) => match i32::try_from(*value) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(*value),
            },
            Value::Double(value) => Bson::Double(*value),
            Value::String(value) => Bson::String(value.clone()),
            Value::DateTime(value) => Bson::DateTime(bson::DateTime::from_chrono(*value)),
            Value::ObjectId(value) => Bson::ObjectId(*value),
            Value::Array(values) => Bson::Array(values.iter().map(Value::to_bson).collect()),
            Value::Object(map) => Bson::Document(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_bson()))
                    .collect::<Document>(),
            ),
            Value::Model(model) => {
                let mut doc = Document::new();

                if let Some(id) = model.id() {
                    doc.insert(crate::identifier::NATIVE_ID_FIELD, id.to_bson());
                }
                for (key, value) in model.properties() {
                    doc.insert(key, value.to_bson());
                }

                Bson::Document(doc)
            }
            Value::Opaque(bson) => bson.clone(),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Value::ObjectId(value)
    }
}

impl From<ModelInstance> for Value {
    fn from(value: ModelInstance) -> Self {
        Value::Model(Box::new(value))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<&JsonValue> for Value {
    fn from(json: &JsonValue) -> Self {
        Value::from_json(json)
    }
}

impl From<&Bson> for Value {
    fn from(bson: &Bson) -> Self {
        Value::from_bson(bson)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_falsy_values() {
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn test_json_numbers() {
        assert_eq!(Value::from_json(&json!(3)), Value::Int(3));
        assert_eq!(Value::from_json(&json!(3.5)), Value::Double(3.5));
        assert_eq!(Value::Int(7).to_json(), json!(7));
    }

    #[test]
    fn test_bson_integer_width() {
        assert_eq!(Value::Int(12).to_bson(), Bson::Int32(12));
        assert_eq!(Value::Int(i64::MAX).to_bson(), Bson::Int64(i64::MAX));
        assert_eq!(Value::from_bson(&Bson::Int32(12)), Value::Int(12));
    }

    #[test]
    fn test_datetime_round_trips_through_bson() {
        let now = bson::DateTime::now().to_chrono();
        let value = Value::DateTime(now);

        assert_eq!(Value::from_bson(&value.to_bson()), value);
    }

    #[test]
    fn test_object_id_renders_as_hex() {
        let oid = ObjectId::new();

        assert_eq!(Value::ObjectId(oid).to_json(), json!(oid.to_hex()));
    }

    #[test]
    fn test_opaque_values_pass_through() {
        let decimal = Bson::Timestamp(bson::Timestamp { time: 1, increment: 2 });

        assert_eq!(Value::from_bson(&decimal).to_bson(), decimal);
    }
}
