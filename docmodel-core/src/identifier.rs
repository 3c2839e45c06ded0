//! Model identifiers.
//!
//! An instance identifier has two faces: the store-native [`ObjectId`] kept under
//! [`NATIVE_ID_FIELD`], and the display/transfer string exposed under [`ID_FIELD`].
//! [`Identifier`] stores a single value and derives both views from it, so they can
//! never disagree.

use std::fmt;

use bson::{Bson, oid::ObjectId};
use serde_json::Value as JsonValue;

use crate::value::Value;

/// Display/transfer name of the identifier property.
pub const ID_FIELD: &str = "id";

/// Key the store uses for its native identifier.
pub const NATIVE_ID_FIELD: &str = "_id";

/// Returns `true` when `name` is either face of the identifier.
pub fn is_id_field(name: &str) -> bool {
    name == ID_FIELD || name == NATIVE_ID_FIELD
}

/// Returns `true` when `value` satisfies the store's identifier format (24 hex characters).
pub fn is_valid_object_id(value: &str) -> bool {
    value.len() == 24 && ObjectId::parse_str(value).is_ok()
}

/// The identifier of a model instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Identifier {
    /// A store-native object identifier.
    Native(ObjectId),
    /// Any other identifier value the store handed back (strings that are not valid object
    /// ids, integers, ...).
    Other(Value),
}

impl Identifier {
    /// Generates a fresh native identifier.
    pub fn generate() -> Self {
        Identifier::Native(ObjectId::new())
    }

    /// Parses a display string, materializing the native form when the string is a valid
    /// object id.
    pub fn parse(value: &str) -> Self {
        match ObjectId::parse_str(value) {
            Ok(oid) if value.len() == 24 => Identifier::Native(oid),
            _ => Identifier::Other(Value::String(value.to_string())),
        }
    }

    /// Builds an identifier from a property value. `null` yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::ObjectId(oid) => Some(Identifier::Native(*oid)),
            Value::String(value) => Some(Identifier::parse(value)),
            other => Some(Identifier::Other(other.clone())),
        }
    }

    /// Builds an identifier from a raw store value. `null` yields `None`.
    pub fn from_bson(bson: &Bson) -> Option<Self> {
        Identifier::from_value(&Value::from_bson(bson))
    }

    /// Builds an identifier from a raw JSON value. `null` yields `None`.
    pub fn from_json(json: &JsonValue) -> Option<Self> {
        Identifier::from_value(&Value::from_json(json))
    }

    /// Returns the native object id, if this identifier has one.
    pub fn as_object_id(&self) -> Option<&ObjectId> {
        match self {
            Identifier::Native(oid) => Some(oid),
            Identifier::Other(_) => None,
        }
    }

    /// Returns `true` when the identifier is held in its native form.
    pub fn is_native(&self) -> bool {
        matches!(self, Identifier::Native(_))
    }

    /// Returns the property value form of the identifier.
    pub fn to_value(&self) -> Value {
        match self {
            Identifier::Native(oid) => Value::ObjectId(*oid),
            Identifier::Other(value) => value.clone(),
        }
    }

    pub fn to_bson(&self) -> Bson {
        match self {
            Identifier::Native(oid) => Bson::ObjectId(*oid),
            Identifier::Other(value) => value.to_bson(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Identifier::Native(oid) => JsonValue::String(oid.to_hex()),
            Identifier::Other(value) => value.to_json(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Native(oid) => write!(f, "{}", oid.to_hex()),
            Identifier::Other(Value::String(value)) => write!(f, "{value}"),
            Identifier::Other(value) => write!(f, "{}", value.to_json()),
        }
    }
}

impl From<ObjectId> for Identifier {
    fn from(oid: ObjectId) -> Self {
        Identifier::Native(oid)
    }
}

impl From<&ObjectId> for Identifier {
    fn from(oid: &ObjectId) -> Self {
        Identifier::Native(*oid)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Identifier::parse(value)
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Identifier::parse(&value)
    }
}

impl From<&Identifier> for Identifier {
    fn from(value: &Identifier) -> Self {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_materializes_native_form() {
        let oid = ObjectId::new();

        assert_eq!(Identifier::parse(&oid.to_hex()), Identifier::Native(oid));
        assert_eq!(
            Identifier::parse("not-an-object-id"),
            Identifier::Other(Value::from("not-an-object-id"))
        );
    }

    #[test]
    fn test_display_matches_native() {
        let oid = ObjectId::new();
        let id = Identifier::from(oid);

        assert_eq!(id.to_string(), oid.to_hex());
        assert_eq!(Identifier::parse(&id.to_string()), id);
    }

    #[test]
    fn test_null_is_not_an_identifier() {
        assert!(Identifier::from_bson(&Bson::Null).is_none());
        assert!(Identifier::from_value(&Value::Int(4)).is_some());
    }

    #[test]
    fn test_object_id_validity() {
        assert!(is_valid_object_id(&ObjectId::new().to_hex()));
        assert!(!is_valid_object_id("123"));
        assert!(!is_valid_object_id("zzzzzzzzzzzzzzzzzzzzzzzz"));
    }
}
