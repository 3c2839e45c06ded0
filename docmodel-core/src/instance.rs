//! Model instances.
//!
//! A [`ModelInstance`] is a property bag bound to its [`ModelClass`]. The identifier is
//! kept apart from the other properties: assigning `"id"` or `"_id"` through
//! [`ModelInstance::set`] updates the one [`Identifier`], and both names read it back.

use std::{collections::BTreeMap, fmt};

use bson::{Document, oid::ObjectId};
use serde_json::Value as JsonValue;

use crate::{
    class::ModelClass,
    db,
    identifier::{Identifier, is_id_field},
    json,
    value::Value,
};

/// An instance of a model class.
#[derive(Clone)]
pub struct ModelInstance {
    class: ModelClass,
    id: Option<Identifier>,
    properties: BTreeMap<String, Value>,
}

impl ModelInstance {
    /// Constructs an instance of `class` carrying the declared defaults.
    pub fn new(class: &ModelClass) -> Self {
        class.instantiate()
    }

    pub(crate) fn empty(class: ModelClass) -> Self {
        Self {
            class,
            id: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn class(&self) -> &ModelClass {
        &self.class
    }

    pub fn model_name(&self) -> &str {
        self.class.name()
    }

    pub fn id(&self) -> Option<&Identifier> {
        self.id.as_ref()
    }

    /// Returns the native identifier, if the instance has one.
    pub fn object_id(&self) -> Option<&ObjectId> {
        self.id.as_ref().and_then(Identifier::as_object_id)
    }

    /// Returns the display form of the identifier.
    pub fn id_string(&self) -> Option<String> {
        self.id.as_ref().map(ToString::to_string)
    }

    pub fn set_id(&mut self, id: impl Into<Identifier>) {
        self.id = Some(id.into());
    }

    /// Sets the identifier from its display form.
    pub fn set_id_string(&mut self, id: &str) {
        self.id = Some(Identifier::parse(id));
    }

    pub fn clear_id(&mut self) -> Option<Identifier> {
        self.id.take()
    }

    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.properties.get_mut(name)
    }

    /// Assigns a property. Assigning either identifier name sets the identifier; assigning
    /// `null` to it clears the identifier.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();

        if is_id_field(name) {
            self.id = Identifier::from_value(&value);
            return;
        }

        self.properties.insert(name.to_string(), value);
    }

    /// Builder-style [`ModelInstance::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn unset(&mut self, name: &str) -> Option<Value> {
        if is_id_field(name) {
            return self.id.take().map(|id| id.to_value());
        }

        self.properties.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        if is_id_field(name) {
            return self.id.is_some();
        }

        self.properties.contains_key(name)
    }

    /// Iterates over every property except the identifier, in name order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn get_model(&self, name: &str) -> Option<&ModelInstance> {
        self.get(name).and_then(Value::as_model)
    }

    pub fn get_model_mut(&mut self, name: &str) -> Option<&mut ModelInstance> {
        self.get_mut(name).and_then(Value::as_model_mut)
    }

    /// Returns the nested instances held by an array property, skipping other elements.
    pub fn get_models(&self, name: &str) -> Vec<&ModelInstance> {
        self.get(name)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_model).collect())
            .unwrap_or_default()
    }

    /// Renders the JSON representation for `context`.
    pub fn to_json(&self, context: &str) -> JsonValue {
        json::to_json(self, context)
    }

    /// Renders the database document.
    pub fn to_db(&self) -> Document {
        db::to_db(self)
    }
}

impl PartialEq for ModelInstance {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.id == other.id && self.properties == other.properties
    }
}

impl fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.class.name())
            .field("id", &self.id)
            .field("properties", &self.properties)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class() -> ModelClass {
        ModelClass::builder("InstanceSubject").build().unwrap()
    }

    #[test]
    fn test_identifier_names_share_one_value() {
        let oid = ObjectId::new();
        let mut instance = class().instantiate();

        instance.set("_id", oid);
        assert_eq!(instance.object_id(), Some(&oid));
        assert_eq!(instance.id_string(), Some(oid.to_hex()));
        assert!(instance.contains("id"));
        assert_eq!(instance.properties().count(), 0);

        instance.set("id", Value::Null);
        assert!(!instance.has_id());
    }

    #[test]
    fn test_display_string_materializes_native_id() {
        let oid = ObjectId::new();
        let mut instance = class().instantiate();

        instance.set_id_string(&oid.to_hex());
        assert_eq!(instance.object_id(), Some(&oid));

        instance.set_id_string("not-an-object-id");
        assert!(instance.object_id().is_none());
        assert_eq!(instance.id_string().as_deref(), Some("not-an-object-id"));
    }

    #[test]
    fn test_nested_accessors() {
        let class = class();
        let instance = class
            .instantiate()
            .with("child", class.instantiate().with("name", "a"))
            .with(
                "children",
                Value::Array(vec![class.instantiate().into(), Value::from(3)]),
            );

        assert_eq!(instance.get_model("child").and_then(|c| c.get_str("name")), Some("a"));
        assert_eq!(instance.get_models("children").len(), 1);
    }
}
