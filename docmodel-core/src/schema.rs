//! Declared properties of a model class.
//!
//! The schema is an explicit list of typed properties computed once when the class is
//! built. Every property is tagged as a plain value, a date, a single nested model or an
//! array of nested models, and the marshallers walk this list instead of enumerating
//! unknown keys.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, OnceLock, PoisonError, RwLock, Weak},
};

use crate::{
    class::{ClassInner, ModelClass},
    error::{OdmError, OdmResult},
    value::Value,
};

/// Produces the default value of a property for a freshly constructed instance.
pub type DefaultFn = Arc<dyn Fn() -> Value + Send + Sync>;

/// A reference to a nested model class.
///
/// Self-referential and mutually recursive models cannot hold a built class at
/// definition time, so a reference may also be deferred behind a function or a class
/// name resolved from the process-wide catalog on first use.
#[derive(Clone)]
pub enum ModelRef {
    /// A class that is already built.
    Class(ModelClass),
    /// A function returning the class, called on every resolution.
    Deferred(fn() -> ModelClass),
    /// A class name looked up in the catalog of built classes.
    Named(String),
}

impl ModelRef {
    /// Resolves the reference, reporting `model.property` on failure.
    pub fn resolve(&self, model: &str, property: &str) -> OdmResult<ModelClass> {
        match self {
            ModelRef::Class(class) => Ok(class.clone()),
            ModelRef::Deferred(resolve) => Ok(resolve()),
            ModelRef::Named(name) => lookup(name).map_err(|reason| {
                OdmError::InvalidModelReference {
                    model: model.to_string(),
                    property: property.to_string(),
                    reason,
                }
            }),
        }
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelRef::Class(class) => write!(f, "Class({})", class.name()),
            ModelRef::Deferred(_) => write!(f, "Deferred"),
            ModelRef::Named(name) => write!(f, "Named({name})"),
        }
    }
}

impl From<ModelClass> for ModelRef {
    fn from(class: ModelClass) -> Self {
        ModelRef::Class(class)
    }
}

impl From<&ModelClass> for ModelRef {
    fn from(class: &ModelClass) -> Self {
        ModelRef::Class(class.clone())
    }
}

impl From<fn() -> ModelClass> for ModelRef {
    fn from(resolve: fn() -> ModelClass) -> Self {
        ModelRef::Deferred(resolve)
    }
}

impl From<&str> for ModelRef {
    fn from(name: &str) -> Self {
        ModelRef::Named(name.to_string())
    }
}

/// Shape of a declared property.
#[derive(Debug, Clone)]
pub enum PropertyKind {
    /// Primitive, array or untyped object value.
    Value,
    /// A point in time; RFC 3339 strings are parsed on the way in.
    Date,
    /// A single nested model.
    Model(ModelRef),
    /// An array of nested models.
    Models(ModelRef),
}

impl PropertyKind {
    pub fn model_ref(&self) -> Option<&ModelRef> {
        match self {
            PropertyKind::Model(model) | PropertyKind::Models(model) => Some(model),
            _ => None,
        }
    }

    pub fn is_nested(&self) -> bool {
        self.model_ref().is_some()
    }
}

/// A declared property of a model class.
#[derive(Clone)]
pub struct Property {
    name: String,
    kind: PropertyKind,
    default: Option<DefaultFn>,
}

impl Property {
    /// Declares a plain value property.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Value,
            default: None,
        }
    }

    /// Declares a date property.
    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name).kind(PropertyKind::Date)
    }

    /// Declares a property holding one nested model.
    pub fn model(name: impl Into<String>, model: impl Into<ModelRef>) -> Self {
        Self::new(name).kind(PropertyKind::Model(model.into()))
    }

    /// Declares a property holding an array of nested models.
    pub fn models(name: impl Into<String>, model: impl Into<ModelRef>) -> Self {
        Self::new(name).kind(PropertyKind::Models(model.into()))
    }

    pub fn kind(mut self, kind: PropertyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets a default value copied into every new instance.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.default = Some(Arc::new(move || value.clone()));
        self
    }

    /// Sets a function producing the default value of every new instance.
    pub fn default_with<F>(mut self, default: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(default));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property_kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn default(&self) -> Option<Value> {
        self.default.as_ref().map(|default| default())
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("default", &self.default.is_some())
            .finish()
    }
}

type Catalog = RwLock<HashMap<String, Vec<Weak<ClassInner>>>>;

fn catalog() -> &'static Catalog {
    static CATALOG: OnceLock<Catalog> = OnceLock::new();
    CATALOG.get_or_init(Default::default)
}

/// Records a built class so [`ModelRef::Named`] references can find it.
pub(crate) fn catalog_insert(class: &ModelClass) {
    let mut catalog = catalog()
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    let entries = catalog.entry(class.name().to_string()).or_default();

    entries.retain(|entry| entry.strong_count() > 0);
    entries.push(class.downgrade());
}

/// Finds a live class by name. Missing and ambiguous names are reported as the reason.
pub fn lookup(name: &str) -> Result<ModelClass, String> {
    let catalog = catalog()
        .read()
        .unwrap_or_else(PoisonError::into_inner);
    let mut live = catalog
        .get(name)
        .map(|entries| {
            entries
                .iter()
                .filter_map(ModelClass::upgrade)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    match live.len() {
        0 => Err(format!("no model class named {name} has been defined")),
        1 => Ok(live.remove(0)),
        count => Err(format!("{count} model classes are named {name}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_value_is_copied() {
        let property = Property::new("count").default_value(3);

        assert_eq!(property.default(), Some(Value::Int(3)));
        assert_eq!(property.default(), Some(Value::Int(3)));
    }

    #[test]
    fn test_unknown_name_is_a_configuration_error() {
        let reference = ModelRef::from("NoSuchModelAnywhere");
        let err = reference.resolve("Parent", "child").unwrap_err();

        match err {
            OdmError::InvalidModelReference { model, property, .. } => {
                assert_eq!(model, "Parent");
                assert_eq!(property, "child");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_named_reference_resolves_built_class() {
        let class = ModelClass::builder("SchemaLookupTarget").build().unwrap();
        let resolved = ModelRef::from("SchemaLookupTarget")
            .resolve("Parent", "child")
            .unwrap();

        assert_eq!(resolved.id(), class.id());
    }
}
