//! Field metadata registry.
//!
//! Each model class owns one [`FieldRegistry`] per [`Representation`]. An entry maps a
//! property to its external field name for one context, and optionally carries a nested
//! model reference, a promiscuous flag and value transforms.
//!
//! Entries are indexed twice, by property name (for outbound mapping) and by external
//! name (for inbound mapping), both keyed `"<name>:<context>"`. Wildcard entries live
//! under `"<name>:*"` and always apply in addition to the more specific context.
//!
//! The registry is append-only: it is filled while a class is being built and never
//! modified afterwards.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{schema::ModelRef, value::Value};

/// Name of the context used when none is given.
pub const DEFAULT_CONTEXT: &str = "default";

/// Context whose entries apply to every context.
pub const WILDCARD_CONTEXT: &str = "*";

/// A value transform applied while mapping a field. Receives the value and the context
/// the marshaller is running in.
pub type Transform = Arc<dyn Fn(Value, &str) -> Value + Send + Sync>;

/// The external representations a property can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    /// Public JSON form.
    Json,
    /// Database document form.
    Db,
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Json => write!(f, "json"),
            Representation::Db => write!(f, "db"),
        }
    }
}

fn key(name: &str, context: &str) -> String {
    format!("{name}:{context}")
}

/// Declaration options for one field mapping.
///
/// # Example
///
/// ```ignore
/// use docmodel::metadata::FieldOptions;
///
/// let options = FieldOptions::named("fn1")
///     .context("ctx1")
///     .parse(|value, _| value);
/// ```
#[derive(Clone, Default)]
pub struct FieldOptions {
    name: Option<String>,
    context: Option<String>,
    model: Option<ModelRef>,
    promiscuous: bool,
    parse: Option<Transform>,
    format: Option<Transform>,
}

impl FieldOptions {
    /// Options that map the property under its own name in the default context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that map the property under `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new().name(name)
    }

    /// Sets the external field name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Scopes the entry to a context. Use [`WILDCARD_CONTEXT`] for all contexts.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Scopes the entry to the wildcard context.
    pub fn wildcard(self) -> Self {
        self.context(WILDCARD_CONTEXT)
    }

    /// Declares the nested model class this field holds, overriding the property kind.
    pub fn model(mut self, model: impl Into<ModelRef>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Keeps nested keys that have no mapping on the nested class.
    pub fn promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    /// Transform applied to inbound values before they are assigned to the instance.
    pub fn parse<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value, &str) -> Value + Send + Sync + 'static,
    {
        self.parse = Some(Arc::new(transform));
        self
    }

    /// Transform applied to outbound values before they are written to the external form.
    pub fn format<F>(mut self, transform: F) -> Self
    where
        F: Fn(Value, &str) -> Value + Send + Sync + 'static,
    {
        self.format = Some(Arc::new(transform));
        self
    }
}

/// One registered field mapping.
#[derive(Clone)]
pub struct FieldEntry {
    /// Internal property name.
    pub property: String,
    /// External field name.
    pub external: String,
    /// Context the entry applies to.
    pub context: String,
    /// Nested model class, overriding the property kind.
    pub model: Option<ModelRef>,
    /// Whether unmapped nested keys are kept.
    pub promiscuous: bool,
    pub parse: Option<Transform>,
    pub format: Option<Transform>,
}

impl FieldEntry {
    fn new(property: &str, options: FieldOptions) -> Self {
        Self {
            property: property.to_string(),
            external: options.name.unwrap_or_else(|| property.to_string()),
            context: options
                .context
                .unwrap_or_else(|| DEFAULT_CONTEXT.to_string()),
            model: options.model,
            promiscuous: options.promiscuous,
            parse: options.parse,
            format: options.format,
        }
    }
}

impl fmt::Debug for FieldEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldEntry")
            .field("property", &self.property)
            .field("external", &self.external)
            .field("context", &self.context)
            .field("model", &self.model)
            .field("promiscuous", &self.promiscuous)
            .field("parse", &self.parse.is_some())
            .field("format", &self.format.is_some())
            .finish()
    }
}

/// The entries that apply to one lookup: the exact-context entry and the wildcard entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolvedField<'a> {
    pub specific: Option<&'a FieldEntry>,
    pub wildcard: Option<&'a FieldEntry>,
}

impl<'a> ResolvedField<'a> {
    pub fn is_mapped(&self) -> bool {
        self.specific.is_some() || self.wildcard.is_some()
    }

    /// The authoritative entry: the exact-context one when present, otherwise the wildcard.
    pub fn primary(&self) -> Option<&'a FieldEntry> {
        self.specific.or(self.wildcard)
    }

    pub fn property(&self) -> Option<&'a str> {
        self.primary().map(|entry| entry.property.as_str())
    }

    pub fn external(&self) -> Option<&'a str> {
        self.primary().map(|entry| entry.external.as_str())
    }

    pub fn model(&self) -> Option<&'a ModelRef> {
        self.specific
            .and_then(|entry| entry.model.as_ref())
            .or_else(|| self.wildcard.and_then(|entry| entry.model.as_ref()))
    }

    pub fn promiscuous(&self) -> bool {
        self.specific.is_some_and(|entry| entry.promiscuous)
            || self.wildcard.is_some_and(|entry| entry.promiscuous)
    }

    /// Runs the inbound transforms, exact context first, then wildcard.
    pub fn apply_parse(&self, value: Value, context: &str) -> Value {
        [self.specific, self.wildcard]
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.parse.as_ref())
            .fold(value, |value, transform| transform(value, context))
    }

    /// Runs the outbound transforms, exact context first, then wildcard.
    pub fn apply_format(&self, value: Value, context: &str) -> Value {
        [self.specific, self.wildcard]
            .into_iter()
            .flatten()
            .filter_map(|entry| entry.format.as_ref())
            .fold(value, |value, transform| transform(value, context))
    }
}

/// Field mappings of one class for one representation.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    by_property: HashMap<String, FieldEntry>,
    by_external: HashMap<String, FieldEntry>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mapping for `property`.
    ///
    /// A later registration for the same property and context replaces the earlier one.
    /// Two different properties mapping to the same external name in the same context is
    /// an error, returned as a message for the class builder to report.
    pub fn register(&mut self, property: &str, options: FieldOptions) -> Result<(), String> {
        let entry = FieldEntry::new(property, options);
        let external_key = key(&entry.external, &entry.context);

        if let Some(existing) = self.by_external.get(&external_key) {
            if existing.property != entry.property {
                return Err(format!(
                    "properties {} and {} both map to field {} in context {}",
                    existing.property, entry.property, entry.external, entry.context
                ));
            }
        }

        let property_key = key(&entry.property, &entry.context);

        if let Some(replaced) = self.by_property.remove(&property_key) {
            self.by_external
                .remove(&key(&replaced.external, &replaced.context));
        }

        self.by_external.insert(external_key, entry.clone());
        self.by_property.insert(property_key, entry);

        Ok(())
    }

    /// Looks up the entries for an internal property name.
    pub fn for_property(&self, property: &str, context: &str) -> ResolvedField<'_> {
        self.resolve(&self.by_property, property, context)
    }

    /// Looks up the entries for an external field name.
    pub fn for_external(&self, external: &str, context: &str) -> ResolvedField<'_> {
        self.resolve(&self.by_external, external, context)
    }

    fn resolve<'a>(
        &'a self,
        index: &'a HashMap<String, FieldEntry>,
        name: &str,
        context: &str,
    ) -> ResolvedField<'a> {
        let wildcard = index.get(&key(name, WILDCARD_CONTEXT));

        if context == WILDCARD_CONTEXT {
            return ResolvedField { specific: wildcard, wildcard: None };
        }

        ResolvedField {
            specific: index.get(&key(name, context)),
            wildcard,
        }
    }

    /// Returns `true` if `property` has any entry, in any context.
    pub fn has_property(&self, property: &str) -> bool {
        self.by_property
            .values()
            .any(|entry| entry.property == property)
    }

    pub fn entries(&self) -> impl Iterator<Item = &FieldEntry> {
        self.by_property.values()
    }

    pub fn len(&self) -> usize {
        self.by_property.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_property.is_empty()
    }
}

/// All field mappings of one class.
#[derive(Debug, Clone, Default)]
pub struct FieldMetadata {
    json: FieldRegistry,
    db: FieldRegistry,
}

impl FieldMetadata {
    pub fn json(&self) -> &FieldRegistry {
        &self.json
    }

    pub fn db(&self) -> &FieldRegistry {
        &self.db
    }

    pub fn get(&self, representation: Representation) -> &FieldRegistry {
        match representation {
            Representation::Json => &self.json,
            Representation::Db => &self.db,
        }
    }

    pub(crate) fn register(
        &mut self,
        representation: Representation,
        property: &str,
        options: FieldOptions,
    ) -> Result<(), String> {
        match representation {
            Representation::Json => self.json.register(property, options),
            Representation::Db => self.db.register(property, options),
        }
    }

    /// Copies every entry of `other` into `self`, keeping `other`'s entries on conflict.
    pub(crate) fn inherit(&mut self, other: &FieldMetadata) {
        for (registry, parent) in [(&mut self.json, &other.json), (&mut self.db, &other.db)] {
            for entry in parent.entries() {
                registry
                    .by_external
                    .insert(key(&entry.external, &entry.context), entry.clone());
                registry
                    .by_property
                    .insert(key(&entry.property, &entry.context), entry.clone());
            }
        }
    }
}
