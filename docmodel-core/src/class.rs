//! Model classes: the static definition of a model.
//!
//! A [`ModelClass`] bundles everything declared about a model when it is defined: its
//! properties, field mappings for JSON and the database, privacy rules, lifecycle hooks,
//! JSON formatters and persistence configuration. It is built once through
//! [`ModelClassBuilder`] and is immutable afterwards, except for the store binding
//! attached when the class is registered with an [`Odm`](crate::odm::Odm).
//!
//! Every class gets a random [`ClassId`] at build time. Registries key classes by this
//! identity rather than by name, so two classes that happen to share a name never clash.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! let address = ModelClass::builder("Address")
//!     .field("street", FieldOptions::new())
//!     .build()?;
//!
//! let user = ModelClass::builder("User")
//!     .db_config(DbConfig::new("users"))
//!     .field("firstName", FieldOptions::new())
//!     .db("lastName", FieldOptions::named("ln"))
//!     .json("lastName", FieldOptions::named("surname"))
//!     .property(Property::model("address", &address))
//!     .field("address", FieldOptions::new())
//!     .privacy("password", Privacy::Private)
//!     .build()?;
//! ```

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock, Weak},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{OdmError, OdmResult},
    hooks::{HookEvent, HookRegistry, LifecycleHook},
    identifier::is_id_field,
    instance::ModelInstance,
    json::{Formatter, JsonObject},
    metadata::{DEFAULT_CONTEXT, FieldMetadata, FieldOptions, Representation, WILDCARD_CONTEXT},
    odm::Binding,
    privacy::{Privacy, PrivacyRules},
    query::Collation,
    schema::{self, ModelRef, Property, PropertyKind},
};

/// Name of the store a model persists to when none is configured.
pub const DEFAULT_STORE: &str = "default";

fn default_store() -> String {
    DEFAULT_STORE.to_string()
}

/// Opaque identity of a model class, unique per built class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(Uuid);

impl ClassId {
    fn generate() -> Self {
        ClassId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistence configuration of a model class.
///
/// Derives `Deserialize` so persistence targets can be loaded from configuration files:
///
/// ```ignore
/// let config: DbConfig = serde_json::from_str(r#"{ "collection": "users", "store": "main" }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbConfig {
    /// Collection the documents live in.
    pub collection: String,
    /// Name of the store (connection) within the application container.
    #[serde(default = "default_store")]
    pub store: String,
    /// Whether properties without a DB mapping are persisted under their own name.
    #[serde(default)]
    pub promiscuous: bool,
    /// Collation applied to queries when none is given.
    #[serde(default)]
    pub collation: Option<Collation>,
}

impl DbConfig {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            store: default_store(),
            promiscuous: false,
            collation: None,
        }
    }

    pub fn store(mut self, store: impl Into<String>) -> Self {
        self.store = store.into();
        self
    }

    pub fn promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    pub fn collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }
}

/// A resolved nested model declaration.
#[derive(Debug, Clone)]
pub(crate) enum Nested {
    One(ModelClass),
    Many(ModelClass),
}

pub(crate) struct ClassInner {
    id: ClassId,
    name: String,
    properties: Vec<Property>,
    fields: FieldMetadata,
    privacy: PrivacyRules,
    hooks: HookRegistry,
    formatters: Vec<(String, Formatter)>,
    db: Option<DbConfig>,
    promiscuous: bool,
    binding: RwLock<Option<Arc<Binding>>>,
}

/// A built model class. Cheap to clone; clones share the same definition.
#[derive(Clone)]
pub struct ModelClass {
    inner: Arc<ClassInner>,
}

impl ModelClass {
    /// Starts the definition of a new model class.
    pub fn builder(name: impl Into<String>) -> ModelClassBuilder {
        ModelClassBuilder::new(name)
    }

    pub fn id(&self) -> ClassId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Declared properties in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.inner.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.inner
            .properties
            .iter()
            .find(|property| property.name() == name)
    }

    pub fn fields(&self) -> &FieldMetadata {
        &self.inner.fields
    }

    pub fn privacy(&self) -> &PrivacyRules {
        &self.inner.privacy
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.inner.hooks
    }

    /// Formatters that apply to `context`, exact context first in declaration order, then
    /// wildcard formatters in declaration order.
    pub fn formatters_for(&self, context: &str) -> Vec<Formatter> {
        let matching = |wanted: &str| -> Vec<Formatter> {
            self.inner
                .formatters
                .iter()
                .filter(|(formatter_context, _)| formatter_context == wanted)
                .map(|(_, formatter)| formatter.clone())
                .collect()
        };

        let mut formatters = matching(context);
        if context != WILDCARD_CONTEXT {
            formatters.extend(matching(WILDCARD_CONTEXT));
        }

        formatters
    }

    pub fn db_config(&self) -> Option<&DbConfig> {
        self.inner.db.as_ref()
    }

    /// Whether properties without a DB mapping are persisted and loaded by their own name.
    pub fn is_promiscuous(&self) -> bool {
        self.inner.promiscuous
    }

    /// Constructs a new instance carrying every declared default.
    pub fn instantiate(&self) -> ModelInstance {
        let mut instance = ModelInstance::empty(self.clone());

        for property in self.properties() {
            if let Some(value) = property.default() {
                instance.set(property.name(), value);
            }
        }

        instance
    }

    /// Resolves the nested model declared for `property`, if any.
    ///
    /// A model reference on a field entry overrides the property kind; array-ness always
    /// comes from the property kind.
    pub(crate) fn nested(
        &self,
        property: &str,
        entry_model: Option<&ModelRef>,
    ) -> OdmResult<Option<Nested>> {
        let kind = self.property(property).map(Property::property_kind);
        let reference = entry_model.or_else(|| kind.and_then(PropertyKind::model_ref));

        let Some(reference) = reference else {
            return Ok(None);
        };

        let class = reference.resolve(self.name(), property)?;

        Ok(Some(match kind {
            Some(PropertyKind::Models(_)) => Nested::Many(class),
            _ => Nested::One(class),
        }))
    }

    pub(crate) fn bind(&self, binding: Arc<Binding>) {
        *self
            .inner
            .binding
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(binding);
    }

    pub(crate) fn binding(&self) -> Option<Arc<Binding>> {
        self.inner
            .binding
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the class has been registered with an application container.
    pub fn is_registered(&self) -> bool {
        self.binding().is_some()
    }

    pub(crate) fn downgrade(&self) -> Weak<ClassInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ClassInner>) -> Option<ModelClass> {
        weak.upgrade().map(|inner| ModelClass { inner })
    }
}

impl PartialEq for ModelClass {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ModelClass {}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClass")
            .field("name", &self.inner.name)
            .field("id", &self.inner.id)
            .finish()
    }
}

/// Builder for [`ModelClass`].
///
/// Declaration errors (conflicting field names, privacy rules naming unknown predicates)
/// are collected and reported together by [`ModelClassBuilder::build`].
pub struct ModelClassBuilder {
    name: String,
    properties: Vec<Property>,
    fields: FieldMetadata,
    privacy: PrivacyRules,
    hooks: HookRegistry,
    formatters: Vec<(String, Formatter)>,
    db: Option<DbConfig>,
    promiscuous: bool,
    errors: Vec<String>,
}

impl ModelClassBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            fields: FieldMetadata::default(),
            privacy: PrivacyRules::new(),
            hooks: HookRegistry::new(),
            formatters: Vec::new(),
            db: None,
            promiscuous: false,
            errors: Vec::new(),
        }
    }

    /// Inherits every declaration of `parent`. Declarations made on this builder take
    /// precedence, and inherited hooks and formatters run before the class's own.
    pub fn extends(mut self, parent: &ModelClass) -> Self {
        for property in parent.properties() {
            self.declare(property.clone());
        }

        self.fields.inherit(parent.fields());
        self.privacy.inherit(parent.privacy());
        self.hooks.inherit(parent.hooks());

        let mut formatters = parent.inner.formatters.clone();
        formatters.append(&mut self.formatters);
        self.formatters = formatters;

        if self.db.is_none() {
            self.db = parent.db_config().cloned();
        }
        self.promiscuous |= parent.is_promiscuous();

        self
    }

    /// Declares a property, replacing an earlier declaration of the same name in place.
    pub fn property(mut self, property: Property) -> Self {
        self.declare(property);
        self
    }

    fn declare(&mut self, property: Property) {
        match self
            .properties
            .iter_mut()
            .find(|existing| existing.name() == property.name())
        {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    fn ensure_declared(&mut self, name: &str) {
        if !is_id_field(name) && !self.properties.iter().any(|p| p.name() == name) {
            self.properties.push(Property::new(name));
        }
    }

    fn map(mut self, representation: Representation, property: &str, options: FieldOptions) -> Self {
        self.ensure_declared(property);

        if let Err(err) = self.fields.register(representation, property, options) {
            self.errors.push(format!("{representation} mapping: {err}"));
        }

        self
    }

    /// Maps a property to the JSON representation, declaring it if needed.
    pub fn json(self, property: &str, options: FieldOptions) -> Self {
        self.map(Representation::Json, property, options)
    }

    /// Maps a property to the database representation, declaring it if needed.
    pub fn db(self, property: &str, options: FieldOptions) -> Self {
        self.map(Representation::Db, property, options)
    }

    /// Maps a property to both representations with the same options.
    pub fn field(self, property: &str, options: FieldOptions) -> Self {
        self.json(property, options.clone()).db(property, options)
    }

    /// Sets the privacy rule of a property in the default context.
    pub fn privacy(mut self, property: &str, rule: Privacy) -> Self {
        self.privacy.register(property, None, rule);
        self
    }

    /// Sets the privacy rule of a property in `context`.
    pub fn privacy_in(mut self, property: &str, context: &str, rule: Privacy) -> Self {
        self.privacy.register(property, Some(context), rule);
        self
    }

    /// Registers a named predicate for [`Privacy::Predicate`] rules.
    pub fn predicate<F>(mut self, name: &str, predicate: F) -> Self
    where
        F: Fn(&ModelInstance, &str) -> bool + Send + Sync + 'static,
    {
        self.privacy.register_predicate(name, predicate);
        self
    }

    fn hook(mut self, event: HookEvent, context: &str, hook: impl LifecycleHook + 'static) -> Self {
        self.hooks.register(event, context, Arc::new(hook));
        self
    }

    pub fn before_create(self, hook: impl LifecycleHook + 'static) -> Self {
        self.hook(HookEvent::BeforeCreate, DEFAULT_CONTEXT, hook)
    }

    pub fn before_create_in(self, context: &str, hook: impl LifecycleHook + 'static) -> Self {
        self.hook(HookEvent::BeforeCreate, context, hook)
    }

    pub fn before_save(self, hook: impl LifecycleHook + 'static) -> Self {
        self.hook(HookEvent::BeforeSave, DEFAULT_CONTEXT, hook)
    }

    pub fn before_save_in(self, context: &str, hook: impl LifecycleHook + 'static) -> Self {
        self.hook(HookEvent::BeforeSave, context, hook)
    }

    /// Adds a JSON formatter for the default context.
    pub fn formatter<F>(self, formatter: F) -> Self
    where
        F: Fn(&ModelInstance, JsonObject, &str) -> JsonObject + Send + Sync + 'static,
    {
        self.formatter_in(DEFAULT_CONTEXT, formatter)
    }

    /// Adds a JSON formatter for `context`.
    pub fn formatter_in<F>(mut self, context: &str, formatter: F) -> Self
    where
        F: Fn(&ModelInstance, JsonObject, &str) -> JsonObject + Send + Sync + 'static,
    {
        self.formatters
            .push((context.to_string(), Arc::new(formatter)));
        self
    }

    /// Sets the persistence configuration. The configuration's promiscuous flag becomes the
    /// class's DB mode.
    pub fn db_config(mut self, config: DbConfig) -> Self {
        self.promiscuous = config.promiscuous;
        self.db = Some(config);
        self
    }

    /// Sets the DB mode without a persistence target, for classes only ever embedded.
    pub fn promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        if let Some(config) = self.db.as_mut() {
            config.promiscuous = promiscuous;
        }
        self
    }

    /// Finishes the definition.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::Configuration`] listing every declaration error.
    pub fn build(mut self) -> OdmResult<ModelClass> {
        for (property, predicate) in self.privacy.unknown_predicates() {
            self.errors.push(format!(
                "privacy rule for {property} names unknown predicate {predicate}"
            ));
        }

        if !self.errors.is_empty() {
            return Err(OdmError::Configuration(format!(
                "model {}: {}",
                self.name,
                self.errors.join("; ")
            )));
        }

        let class = ModelClass {
            inner: Arc::new(ClassInner {
                id: ClassId::generate(),
                name: self.name,
                properties: self.properties,
                fields: self.fields,
                privacy: self.privacy,
                hooks: self.hooks,
                formatters: self.formatters,
                db: self.db,
                promiscuous: self.promiscuous,
                binding: RwLock::new(None),
            }),
        };

        schema::catalog_insert(&class);
        tracing::trace!(model = class.name(), id = %class.id(), "model class built");

        Ok(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_identity_is_unique_per_class() {
        let a = ModelClass::builder("Same").build().unwrap();
        let b = ModelClass::builder("Same").build().unwrap();

        assert_eq!(a.name(), b.name());
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_field_mapping_declares_property() {
        let class = ModelClass::builder("Declared")
            .json("firstName", FieldOptions::named("fn"))
            .db("id", FieldOptions::new())
            .build()
            .unwrap();

        assert!(class.property("firstName").is_some());
        assert!(class.property("id").is_none());
    }

    #[test]
    fn test_conflicting_external_names_fail_the_build() {
        let err = ModelClass::builder("Conflict")
            .db("a", FieldOptions::named("x"))
            .db("b", FieldOptions::named("x"))
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("Conflict"));
    }

    #[test]
    fn test_unknown_predicate_fails_the_build() {
        let err = ModelClass::builder("Predicates")
            .privacy("email", Privacy::Predicate("hideEmail".into()))
            .build()
            .unwrap_err();

        assert!(err.to_string().contains("hideEmail"));
    }

    #[test]
    fn test_instantiate_applies_defaults() {
        let class = ModelClass::builder("Defaults")
            .property(Property::new("count").default_value(5))
            .property(Property::new("name"))
            .build()
            .unwrap();
        let instance = class.instantiate();

        assert_eq!(instance.get("count"), Some(&Value::Int(5)));
        assert!(!instance.contains("name"));
    }

    #[test]
    fn test_extends_inherits_declarations() {
        let parent = ModelClass::builder("Parent")
            .db_config(DbConfig::new("people"))
            .db("name", FieldOptions::named("n"))
            .privacy("secret", Privacy::Private)
            .build()
            .unwrap();
        let child = ModelClass::builder("Child")
            .extends(&parent)
            .db("age", FieldOptions::named("a"))
            .build()
            .unwrap();

        assert_eq!(child.db_config().map(|c| c.collection.as_str()), Some("people"));
        assert_eq!(
            child.fields().db().for_property("name", DEFAULT_CONTEXT).external(),
            Some("n")
        );
        assert!(child.property("age").is_some());
        assert_eq!(
            child.privacy().rule_for("secret", DEFAULT_CONTEXT),
            Some(&Privacy::Private)
        );
        assert_ne!(child.id(), parent.id());
    }

    #[test]
    fn test_db_config_deserializes_with_defaults() {
        let config: DbConfig = serde_json::from_str(r#"{ "collection": "users" }"#).unwrap();

        assert_eq!(config, DbConfig::new("users"));
    }
}
