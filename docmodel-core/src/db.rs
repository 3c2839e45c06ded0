//! Database document marshalling.
//!
//! In chaste mode only properties with a DB mapping are written and read. In promiscuous
//! mode every property is written (under its mapped name when it has one) and every
//! document key without a mapping is read back under its own name.
//!
//! The identifier is always stored under [`NATIVE_ID_FIELD`] and never under its display
//! name. Nested instances only carry an identifier when one was explicitly assigned.

use bson::{Bson, Document};

use crate::{
    class::{ModelClass, Nested},
    error::OdmResult,
    identifier::{ID_FIELD, Identifier, NATIVE_ID_FIELD, is_id_field},
    instance::ModelInstance,
    metadata::{DEFAULT_CONTEXT, ResolvedField},
    value::Value,
};

/// Options for [`from_db`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FromDbOptions {
    /// Remove every property whose field is absent from the source document, including
    /// defaults. Used when the document was read through a projection.
    pub strict: bool,
}

impl FromDbOptions {
    pub fn strict() -> Self {
        Self { strict: true }
    }
}

/// Renders the database document of `instance`.
pub fn to_db(instance: &ModelInstance) -> Document {
    render_instance(instance, instance.class().is_promiscuous())
}

/// Renders `instance`, writing properties without a DB mapping under their own name when
/// `promiscuous` is set. Nested instances are promiscuous when their own class is, or when
/// the field holding them is marked promiscuous.
fn render_instance(instance: &ModelInstance, promiscuous: bool) -> Document {
    let class = instance.class();
    let fields = class.fields().db();
    let mut document = Document::new();

    if let Some(id) = instance.id() {
        document.insert(NATIVE_ID_FIELD, id.to_bson());
    }

    let declared = class
        .properties()
        .iter()
        .filter_map(|property| {
            instance
                .get(property.name())
                .map(|value| (property.name(), value))
        });
    let undeclared = instance
        .properties()
        .filter(|(name, _)| promiscuous && class.property(name).is_none());

    for (name, value) in declared.chain(undeclared) {
        let resolved = fields.for_property(name, DEFAULT_CONTEXT);
        let external = match resolved.external() {
            Some(external) => external,
            None if promiscuous => name,
            None => continue,
        };

        let value = resolved.apply_format(value.clone(), DEFAULT_CONTEXT);
        document.insert(external, render(&value, resolved.promiscuous()));
    }

    document
}

fn render(value: &Value, loose: bool) -> Bson {
    match value {
        Value::Model(model) => {
            Bson::Document(render_instance(model, loose || model.class().is_promiscuous()))
        }
        Value::Array(items) => Bson::Array(items.iter().map(|item| render(item, loose)).collect()),
        Value::Object(map) => Bson::Document(
            map.iter()
                .map(|(key, value)| (key.clone(), render(value, loose)))
                .collect(),
        ),
        other => other.to_bson(),
    }
}

/// Builds an instance of `class` from a database document.
///
/// Keys holding `null` leave the property at its declared default, and a nested document
/// is merged onto the default nested instance instead of replacing it.
///
/// # Errors
///
/// Returns [`OdmError::InvalidModelReference`](crate::error::OdmError::InvalidModelReference)
/// when a nested model reference cannot be resolved.
pub fn from_db(class: &ModelClass, document: &Document, options: FromDbOptions) -> OdmResult<ModelInstance> {
    let mut instance = class.instantiate();
    apply(&mut instance, document, class.is_promiscuous())?;

    if options.strict {
        let pruned = prune(&mut instance, document);
        tracing::trace!(model = class.name(), pruned, "pruned properties absent from projection");
    }

    Ok(instance)
}

/// [`from_db`] for an arbitrary store value. Anything but a document yields `None`.
pub fn from_db_bson(class: &ModelClass, bson: &Bson, options: FromDbOptions) -> OdmResult<Option<ModelInstance>> {
    match bson {
        Bson::Document(document) => from_db(class, document, options).map(Some),
        _ => Ok(None),
    }
}

/// [`from_db`] mapped over an array. Anything but an array yields an empty vector and
/// non-document elements are skipped.
pub fn from_db_array(class: &ModelClass, bson: &Bson, options: FromDbOptions) -> OdmResult<Vec<ModelInstance>> {
    let Bson::Array(items) = bson else {
        return Ok(Vec::new());
    };

    let mut instances = Vec::with_capacity(items.len());
    for item in items {
        if let Some(instance) = from_db_bson(class, item, options)? {
            instances.push(instance);
        }
    }

    Ok(instances)
}

fn apply(instance: &mut ModelInstance, document: &Document, promiscuous: bool) -> OdmResult<()> {
    let class = instance.class().clone();
    let fields = class.fields().db();

    for (key, raw) in document {
        if key == NATIVE_ID_FIELD {
            if let Some(id) = Identifier::from_bson(raw) {
                instance.set_id(id);
            }
            continue;
        }

        let resolved = fields.for_external(key, DEFAULT_CONTEXT);
        let property = match resolved.property() {
            Some(property) => property.to_string(),
            // The identifier is only ever read from the native key
            None if key == ID_FIELD => continue,
            None if promiscuous => key.clone(),
            None => continue,
        };

        if matches!(raw, Bson::Null | Bson::Undefined) {
            continue;
        }

        let existing = instance.get(&property).cloned();
        let value = decode(&class, &property, &resolved, raw, existing, false)?;
        instance.set(&property, resolved.apply_parse(value, DEFAULT_CONTEXT));
    }

    Ok(())
}

/// Decodes one document value. A nested document is merged onto `existing` when it holds
/// an instance of the declared class; `strict` prunes freshly decoded nested instances.
fn decode(
    class: &ModelClass,
    property: &str,
    resolved: &ResolvedField<'_>,
    raw: &Bson,
    existing: Option<Value>,
    strict: bool,
) -> OdmResult<Value> {
    let loose = resolved.promiscuous();

    let value = match (class.nested(property, resolved.model())?, raw) {
        (Some(Nested::One(target)), Bson::Document(document)) => {
            let mut child = match existing {
                Some(Value::Model(model)) if model.class() == &target => *model,
                _ => target.instantiate(),
            };
            apply(&mut child, document, loose || target.is_promiscuous())?;
            if strict {
                prune(&mut child, document);
            }
            Value::from(child)
        }
        (Some(Nested::Many(target)), Bson::Array(items)) => {
            let mut children = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Bson::Document(document) => {
                        let mut child = target.instantiate();
                        apply(&mut child, document, loose || target.is_promiscuous())?;
                        if strict {
                            prune(&mut child, document);
                        }
                        children.push(Value::from(child));
                    }
                    other => children.push(Value::from_bson(other)),
                }
            }
            Value::Array(children)
        }
        (_, other) => Value::from_bson(other),
    };

    Ok(value)
}

/// Removes every property whose field is absent from `document`, recursing into nested
/// instances. The identifier survives only when the document carries one. Returns the
/// number of properties removed.
fn prune(instance: &mut ModelInstance, document: &Document) -> usize {
    let mut pruned = 0;

    if !document.contains_key(NATIVE_ID_FIELD) {
        instance.clear_id();
    }

    let class = instance.class().clone();
    let fields = class.fields().db();
    let names = instance
        .properties()
        .map(|(name, _)| name.to_string())
        .collect::<Vec<_>>();

    for name in names {
        let resolved = fields.for_property(&name, DEFAULT_CONTEXT);
        let external = resolved.external().unwrap_or(&name);

        let Some(field) = document.get(external) else {
            instance.unset(&name);
            pruned += 1;
            continue;
        };

        match (field, instance.get_mut(&name)) {
            (Bson::Document(nested), Some(Value::Model(child))) => {
                pruned += prune(child, nested);
            }
            (Bson::Array(items), Some(Value::Array(values))) => {
                for (value, item) in values.iter_mut().zip(items) {
                    if let (Value::Model(child), Bson::Document(nested)) = (value, item) {
                        pruned += prune(child, nested);
                    }
                }
            }
            _ => {}
        }
    }

    pruned
}

/// Merges a persisted change-set back onto a live instance.
///
/// Keys resolve through DB mappings and fall back to their own name. Dotted keys such as
/// `"address.street"` or `"items.0.name"` are applied inside the nested value they point
/// at. Properties the change-set does not name are left untouched.
pub fn apply_change_set(instance: &mut ModelInstance, change_set: &Document) -> OdmResult<()> {
    for (key, raw) in change_set {
        if key == NATIVE_ID_FIELD {
            continue;
        }

        match key.split_once('.') {
            Some((head, rest)) => apply_path(instance, head, rest, raw)?,
            None => {
                let class = instance.class().clone();
                let resolved = class.fields().db().for_external(key, DEFAULT_CONTEXT);
                let property = match resolved.property() {
                    Some(property) => property.to_string(),
                    None if is_id_field(key) => continue,
                    None => key.clone(),
                };

                let value = match raw {
                    Bson::Null | Bson::Undefined => Value::Null,
                    other => decode(&class, &property, &resolved, other, None, true)?,
                };
                instance.set(&property, resolved.apply_parse(value, DEFAULT_CONTEXT));
            }
        }
    }

    Ok(())
}

fn apply_path(instance: &mut ModelInstance, head: &str, rest: &str, raw: &Bson) -> OdmResult<()> {
    let property = instance
        .class()
        .fields()
        .db()
        .for_external(head, DEFAULT_CONTEXT)
        .property()
        .unwrap_or(head)
        .to_string();

    if !instance.contains(&property) {
        tracing::trace!(model = instance.model_name(), property, "change-set path has no target");
        return Ok(());
    }

    match instance.get_mut(&property) {
        Some(target) => set_path(target, rest, raw),
        None => Ok(()),
    }
}

fn set_path(target: &mut Value, path: &str, raw: &Bson) -> OdmResult<()> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    match target {
        Value::Model(child) => {
            let mut change_set = Document::new();
            change_set.insert(path, raw.clone());
            apply_change_set(child, &change_set)?;
        }
        Value::Array(items) => {
            if let Some(item) = head.parse::<usize>().ok().and_then(|index| items.get_mut(index)) {
                match rest {
                    Some(rest) => set_path(item, rest, raw)?,
                    None => *item = Value::from_bson(raw),
                }
            }
        }
        Value::Object(map) => match rest {
            Some(rest) => {
                if let Some(item) = map.get_mut(head) {
                    set_path(item, rest, raw)?;
                }
            }
            None => {
                map.insert(head.to_string(), Value::from_bson(raw));
            }
        },
        _ => {}
    }

    Ok(())
}

impl ModelClass {
    /// See [`from_db`].
    pub fn from_db(&self, document: &Document, options: FromDbOptions) -> OdmResult<ModelInstance> {
        from_db(self, document, options)
    }

    /// See [`from_db_array`].
    pub fn from_db_array(&self, bson: &Bson, options: FromDbOptions) -> OdmResult<Vec<ModelInstance>> {
        from_db_array(self, bson, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        class::DbConfig,
        metadata::FieldOptions,
        schema::Property,
    };
    use bson::{doc, oid::ObjectId};

    fn address() -> ModelClass {
        ModelClass::builder("DbAddress")
            .db("street", FieldOptions::named("s"))
            .db("city", FieldOptions::new())
            .build()
            .unwrap()
    }

    #[test]
    fn test_chaste_and_promiscuous_reads() {
        let chaste = ModelClass::builder("DbChaste")
            .db("mapped", FieldOptions::new())
            .build()
            .unwrap();
        let promiscuous = ModelClass::builder("DbPromiscuous")
            .db_config(DbConfig::new("things").promiscuous(true))
            .db("mapped", FieldOptions::new())
            .build()
            .unwrap();
        let document = doc! { "mapped": 1, "unmapped": 2 };

        let read = chaste.from_db(&document, FromDbOptions::default()).unwrap();
        assert_eq!(read.get("mapped"), Some(&Value::Int(1)));
        assert!(!read.contains("unmapped"));

        let read = promiscuous.from_db(&document, FromDbOptions::default()).unwrap();
        assert_eq!(read.get("mapped"), Some(&Value::Int(1)));
        assert_eq!(read.get("unmapped"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_writes_use_mapped_names_and_keep_falsy_values() {
        let class = ModelClass::builder("DbWrite")
            .db("count", FieldOptions::named("c"))
            .db("enabled", FieldOptions::new())
            .db("label", FieldOptions::new())
            .property(Property::new("transient"))
            .build()
            .unwrap();
        let instance = class
            .instantiate()
            .with("count", 0)
            .with("enabled", false)
            .with("label", "")
            .with("transient", "x");

        assert_eq!(
            instance.to_db(),
            doc! { "c": 0, "enabled": false, "label": "" }
        );
    }

    #[test]
    fn test_identifier_is_stored_natively_only() {
        let oid = ObjectId::new();
        let class = ModelClass::builder("DbIdentified").build().unwrap();
        let instance = class.instantiate().with("id", oid.to_hex());

        assert_eq!(instance.to_db(), doc! { "_id": oid });
    }

    #[test]
    fn test_nested_default_survives_empty_document() {
        let address = address();
        let default_street = address.clone();
        let person = ModelClass::builder("DbResident")
            .property(
                Property::model("addr", &address)
                    .default_with(move || default_street.instantiate().with("street", "X").into()),
            )
            .db("addr", FieldOptions::new())
            .build()
            .unwrap();

        let empty = person.from_db(&doc! {}, FromDbOptions::default()).unwrap();
        assert_eq!(empty.get_model("addr").and_then(|a| a.get_str("street")), Some("X"));

        let partial = person
            .from_db(&doc! { "addr": { "city": "Y" } }, FromDbOptions::default())
            .unwrap();
        let addr = partial.get_model("addr").unwrap();
        assert_eq!(addr.get_str("street"), Some("X"));
        assert_eq!(addr.get_str("city"), Some("Y"));
        assert!(!addr.has_id());
    }

    #[test]
    fn test_strict_mode_prunes_projected_out_fields() {
        let class = ModelClass::builder("DbStrict")
            .property(Property::new("b").default_value("fallback"))
            .db("a", FieldOptions::new())
            .db("b", FieldOptions::new())
            .build()
            .unwrap();
        let oid = ObjectId::new();

        let read = class
            .from_db(&doc! { "_id": oid, "a": 1 }, FromDbOptions::strict())
            .unwrap();
        assert_eq!(read.get("a"), Some(&Value::Int(1)));
        assert!(!read.contains("b"));
        assert_eq!(read.object_id(), Some(&oid));

        let lenient = class
            .from_db(&doc! { "a": 1 }, FromDbOptions::default())
            .unwrap();
        assert_eq!(lenient.get_str("b"), Some("fallback"));
    }

    #[test]
    fn test_non_document_input() {
        let class = address();

        assert!(from_db_bson(&class, &Bson::Int32(1), FromDbOptions::default()).unwrap().is_none());
        assert!(class.from_db_array(&Bson::Null, FromDbOptions::default()).unwrap().is_empty());
        assert_eq!(
            class
                .from_db_array(&Bson::Array(vec![doc! { "s": "a" }.into(), Bson::Int32(2)]), FromDbOptions::default())
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_change_set_merges_without_touching_other_fields() {
        let address = address();
        let person = ModelClass::builder("DbChanged")
            .db("firstName", FieldOptions::named("fn"))
            .db("lastName", FieldOptions::named("ln"))
            .property(Property::model("addr", &address))
            .db("addr", FieldOptions::new())
            .build()
            .unwrap();
        let mut instance = person
            .instantiate()
            .with("firstName", "Ada")
            .with("lastName", "Lovelace")
            .with("addr", address.instantiate().with("street", "Old").with("city", "London"));

        apply_change_set(
            &mut instance,
            &doc! { "fn": "Grace", "addr.s": "New", "nickname": "amazing" },
        )
        .unwrap();

        assert_eq!(instance.get_str("firstName"), Some("Grace"));
        assert_eq!(instance.get_str("lastName"), Some("Lovelace"));
        assert_eq!(instance.get_str("nickname"), Some("amazing"));
        let addr = instance.get_model("addr").unwrap();
        assert_eq!(addr.get_str("street"), Some("New"));
        assert_eq!(addr.get_str("city"), Some("London"));
    }

    #[test]
    fn test_promiscuous_field_writes_back_unmapped_nested_keys() {
        let meta = ModelClass::builder("DbLooseMeta")
            .db("kind", FieldOptions::new())
            .build()
            .unwrap();
        let asset = ModelClass::builder("DbLooseAsset")
            .property(Property::model("extra", &meta))
            .db("extra", FieldOptions::new().promiscuous(true))
            .build()
            .unwrap();
        let document = doc! { "extra": { "kind": "image", "anything": true } };

        let read = asset.from_db(&document, FromDbOptions::default()).unwrap();
        assert_eq!(read.to_db(), document);
    }

    #[test]
    fn test_mapped_id_field_is_a_plain_property() {
        let oid = ObjectId::new();
        let class = ModelClass::builder("DbMappedId")
            .db("code", FieldOptions::named("id"))
            .build()
            .unwrap();

        let read = class
            .from_db(&doc! { "_id": oid, "id": "A-1" }, FromDbOptions::default())
            .unwrap();
        assert_eq!(read.object_id(), Some(&oid));
        assert_eq!(read.get_str("code"), Some("A-1"));
        assert_eq!(read.to_db(), doc! { "_id": oid, "id": "A-1" });

        // Without a mapping the display key is never taken as the identifier
        let unmapped = ModelClass::builder("DbUnmappedId")
            .db_config(DbConfig::new("unmapped").promiscuous(true))
            .build()
            .unwrap();
        let read = unmapped
            .from_db(&doc! { "id": oid.to_hex() }, FromDbOptions::default())
            .unwrap();
        assert!(!read.has_id());
    }
}
