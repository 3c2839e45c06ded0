//! JSON marshalling.
//!
//! Outbound, [`to_json`] walks the declared properties of an instance and emits every
//! property that has a JSON mapping in the requested context (or the wildcard context)
//! and is not private there. Nested models are rendered with their own class's mappings.
//! The accumulated object is then passed through the class's formatters.
//!
//! Inbound, [`from_json`] is driven by the keys of the input object. A key with no JSON
//! mapping is only kept when the fresh instance already holds a property of that name
//! (a declared default), when it is an identifier key, or when the enclosing field is
//! promiscuous.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::{
    class::{ModelClass, Nested},
    error::OdmResult,
    identifier::{ID_FIELD, is_id_field},
    instance::ModelInstance,
    metadata::ResolvedField,
    schema::PropertyKind,
    value::Value,
};

/// A JSON object under construction.
pub type JsonObject = JsonMap<String, JsonValue>;

/// A whole-object post-processor run after the fields of an instance have been rendered.
pub type Formatter = Arc<dyn Fn(&ModelInstance, JsonObject, &str) -> JsonObject + Send + Sync>;

/// Renders the JSON representation of `instance` for `context`.
pub fn to_json(instance: &ModelInstance, context: &str) -> JsonValue {
    JsonValue::Object(to_json_object(instance, context))
}

fn to_json_object(instance: &ModelInstance, context: &str) -> JsonObject {
    let class = instance.class();
    let fields = class.fields().json();
    let privacy = class.privacy();
    let mut object = JsonObject::new();

    if let Some(id) = instance.id() {
        if !privacy.is_private(instance, ID_FIELD, context) {
            let resolved = fields.for_property(ID_FIELD, context);
            let value = resolved.apply_format(id.to_value(), context);

            object.insert(
                resolved.external().unwrap_or(ID_FIELD).to_string(),
                render(&value, context),
            );
        }
    }

    for property in class.properties() {
        let name = property.name();
        let Some(value) = instance.get(name) else {
            continue;
        };

        let resolved = fields.for_property(name, context);
        let Some(external) = resolved.external() else {
            continue;
        };

        if privacy.is_private(instance, name, context) {
            continue;
        }

        let value = resolved.apply_format(value.clone(), context);
        object.insert(external.to_string(), render(&value, context));
    }

    class
        .formatters_for(context)
        .iter()
        .fold(object, |object, formatter| formatter(instance, object, context))
}

fn render(value: &Value, context: &str) -> JsonValue {
    match value {
        Value::Model(model) => to_json(model, context),
        Value::Array(items) => JsonValue::Array(items.iter().map(|item| render(item, context)).collect()),
        Value::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), render(value, context)))
                .collect(),
        ),
        other => other.to_json(),
    }
}

/// Builds an instance of `class` from a JSON object.
///
/// Returns `Ok(None)` when `json` is not an object.
///
/// # Errors
///
/// Returns [`OdmError::InvalidModelReference`](crate::error::OdmError::InvalidModelReference)
/// when a nested model reference cannot be resolved.
pub fn from_json(class: &ModelClass, json: &JsonValue, context: &str) -> OdmResult<Option<ModelInstance>> {
    let JsonValue::Object(object) = json else {
        return Ok(None);
    };

    let mut instance = class.instantiate();
    apply(&mut instance, object, context, false)?;

    Ok(Some(instance))
}

/// Builds one instance per object element of a JSON array. Non-array input yields an
/// empty vector.
pub fn from_json_array(class: &ModelClass, json: &JsonValue, context: &str) -> OdmResult<Vec<ModelInstance>> {
    let JsonValue::Array(items) = json else {
        return Ok(Vec::new());
    };

    let mut instances = Vec::with_capacity(items.len());
    for item in items {
        if let Some(instance) = from_json(class, item, context)? {
            instances.push(instance);
        }
    }

    Ok(instances)
}

fn apply(instance: &mut ModelInstance, object: &JsonObject, context: &str, promiscuous: bool) -> OdmResult<()> {
    let class = instance.class().clone();
    let fields = class.fields().json();

    for (key, raw) in object {
        let resolved = fields.for_external(key, context);

        let property = match resolved.property() {
            Some(property) => property.to_string(),
            None if is_id_field(key) || promiscuous || instance.contains(key) => key.clone(),
            None => {
                tracing::trace!(model = class.name(), key, context, "dropping unmapped JSON key");
                continue;
            }
        };

        if is_id_field(&property) {
            let value = resolved.apply_parse(Value::from_json(raw), context);
            instance.set(ID_FIELD, value);
            continue;
        }

        let value = decode(&class, &property, &resolved, raw, context)?;
        instance.set(&property, resolved.apply_parse(value, context));
    }

    Ok(())
}

fn decode(
    class: &ModelClass,
    property: &str,
    resolved: &ResolvedField<'_>,
    raw: &JsonValue,
    context: &str,
) -> OdmResult<Value> {
    let promiscuous = resolved.promiscuous();

    let value = match (class.nested(property, resolved.model())?, raw) {
        (Some(Nested::One(target)), JsonValue::Object(object)) => {
            let mut child = target.instantiate();
            apply(&mut child, object, context, promiscuous)?;
            Value::from(child)
        }
        (Some(Nested::Many(target)), JsonValue::Array(items)) => {
            let mut children = Vec::with_capacity(items.len());
            for item in items {
                if let JsonValue::Object(object) = item {
                    let mut child = target.instantiate();
                    apply(&mut child, object, context, promiscuous)?;
                    children.push(Value::from(child));
                }
            }
            Value::Array(children)
        }
        (None, JsonValue::String(text)) if !promiscuous && is_date(class, property) => {
            match DateTime::parse_from_rfc3339(text) {
                Ok(parsed) => Value::DateTime(parsed.with_timezone(&Utc)),
                Err(_) => Value::String(text.clone()),
            }
        }
        (_, other) => Value::from_json(other),
    };

    Ok(value)
}

fn is_date(class: &ModelClass, property: &str) -> bool {
    class
        .property(property)
        .is_some_and(|property| matches!(property.property_kind(), PropertyKind::Date))
}

impl ModelClass {
    /// See [`from_json`].
    pub fn from_json(&self, json: &JsonValue, context: &str) -> OdmResult<Option<ModelInstance>> {
        from_json(self, json, context)
    }

    /// See [`from_json_array`].
    pub fn from_json_array(&self, json: &JsonValue, context: &str) -> OdmResult<Vec<ModelInstance>> {
        from_json_array(self, json, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{DEFAULT_CONTEXT, FieldOptions, WILDCARD_CONTEXT},
        privacy::Privacy,
        schema::Property,
    };
    use bson::oid::ObjectId;
    use serde_json::json;

    fn person() -> ModelClass {
        ModelClass::builder("JsonPerson")
            .json("firstName", FieldOptions::named("fn"))
            .json("firstName", FieldOptions::named("fn1").context("ctx1"))
            .json("lastName", FieldOptions::new())
            .json("password", FieldOptions::new())
            .privacy("password", Privacy::Private)
            .build()
            .unwrap()
    }

    #[test]
    fn test_context_names_do_not_leak() {
        let instance = person()
            .instantiate()
            .with("firstName", "Ada")
            .with("lastName", "Lovelace");

        assert_eq!(
            instance.to_json(DEFAULT_CONTEXT),
            json!({ "fn": "Ada", "lastName": "Lovelace" })
        );
        assert_eq!(instance.to_json("ctx1"), json!({ "fn1": "Ada" }));
    }

    #[test]
    fn test_private_fields_are_elided() {
        let instance = person().instantiate().with("password", "hunter2");

        assert_eq!(instance.to_json(DEFAULT_CONTEXT), json!({}));
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let class = person();
        let instance = class
            .instantiate()
            .with("firstName", "Ada")
            .with("lastName", "Lovelace");

        let parsed = class
            .from_json(&instance.to_json(DEFAULT_CONTEXT), DEFAULT_CONTEXT)
            .unwrap()
            .unwrap();
        assert_eq!(parsed, instance);
    }

    #[test]
    fn test_unmapped_keys_only_fill_existing_properties() {
        let class = ModelClass::builder("JsonDefaults")
            .property(Property::new("status").default_value("new"))
            .build()
            .unwrap();

        let instance = class
            .from_json(&json!({ "status": "done", "other": 1 }), DEFAULT_CONTEXT)
            .unwrap()
            .unwrap();

        assert_eq!(instance.get_str("status"), Some("done"));
        assert!(!instance.contains("other"));
    }

    #[test]
    fn test_identifier_string_becomes_native() {
        let oid = ObjectId::new();
        let instance = person()
            .from_json(&json!({ "id": oid.to_hex() }), DEFAULT_CONTEXT)
            .unwrap()
            .unwrap();

        assert_eq!(instance.object_id(), Some(&oid));
        assert_eq!(instance.to_json(DEFAULT_CONTEXT), json!({ "id": oid.to_hex() }));
    }

    #[test]
    fn test_non_object_input_yields_nothing() {
        let class = person();

        assert!(class.from_json(&json!(null), DEFAULT_CONTEXT).unwrap().is_none());
        assert!(class.from_json(&json!([1, 2]), DEFAULT_CONTEXT).unwrap().is_none());
        assert!(class.from_json_array(&json!({}), DEFAULT_CONTEXT).unwrap().is_empty());
    }

    #[test]
    fn test_nested_models_are_instantiated() {
        let tag = ModelClass::builder("JsonTag")
            .json("label", FieldOptions::named("l"))
            .build()
            .unwrap();
        let post = ModelClass::builder("JsonPost")
            .property(Property::models("tags", &tag))
            .json("tags", FieldOptions::new())
            .build()
            .unwrap();

        let instance = post
            .from_json(&json!({ "tags": [{ "l": "a" }, 3, { "l": "b" }] }), DEFAULT_CONTEXT)
            .unwrap()
            .unwrap();

        let tags = instance.get_models("tags");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[1].get_str("label"), Some("b"));
        assert_eq!(
            instance.to_json(DEFAULT_CONTEXT),
            json!({ "tags": [{ "l": "a" }, { "l": "b" }] })
        );
    }

    #[test]
    fn test_promiscuous_field_keeps_unmapped_nested_keys() {
        let inner = ModelClass::builder("JsonLoose").build().unwrap();
        let outer = ModelClass::builder("JsonOuter")
            .property(Property::model("extra", &inner))
            .json("extra", FieldOptions::new().promiscuous(true))
            .build()
            .unwrap();

        let instance = outer
            .from_json(&json!({ "extra": { "anything": true } }), DEFAULT_CONTEXT)
            .unwrap()
            .unwrap();

        assert_eq!(
            instance.get_model("extra").and_then(|extra| extra.get("anything")),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_date_properties_parse_rfc3339() {
        let class = ModelClass::builder("JsonDated")
            .property(Property::date("at"))
            .json("at", FieldOptions::new())
            .build()
            .unwrap();

        let instance = class
            .from_json(&json!({ "at": "2024-05-01T10:00:00.000Z" }), DEFAULT_CONTEXT)
            .unwrap()
            .unwrap();

        assert!(instance.get("at").and_then(Value::as_datetime).is_some());
        assert_eq!(
            instance.to_json(DEFAULT_CONTEXT),
            json!({ "at": "2024-05-01T10:00:00.000Z" })
        );
    }

    #[test]
    fn test_formatters_run_context_then_wildcard() {
        let class = ModelClass::builder("JsonFormatted")
            .json("name", FieldOptions::new())
            .formatter_in(WILDCARD_CONTEXT, |_, mut object, _| {
                let before = object
                    .get("order")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string();
                object.insert("order".into(), json!(format!("{before}-wild")));
                object
            })
            .formatter(|_, mut object, context| {
                object.insert("order".into(), json!(context));
                object
            })
            .build()
            .unwrap();

        let instance = class.instantiate().with("name", "n");
        assert_eq!(
            instance.to_json(DEFAULT_CONTEXT),
            json!({ "name": "n", "order": "default-wild" })
        );
    }
}
