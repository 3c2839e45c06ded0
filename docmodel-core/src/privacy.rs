//! Context-scoped field visibility for JSON output.
//!
//! A property can be declared private for a context, public for a context, or private
//! depending on a named predicate or on the truthiness of another property. Rules are
//! only consulted when producing JSON; database documents are never filtered.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    instance::ModelInstance,
    metadata::{DEFAULT_CONTEXT, WILDCARD_CONTEXT},
};

/// A named predicate deciding whether a field is private for an instance in a context.
pub type Predicate = Arc<dyn Fn(&ModelInstance, &str) -> bool + Send + Sync>;

/// A visibility rule for one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Privacy {
    /// Always elided.
    Private,
    /// Always emitted.
    Public,
    /// Elided when the named predicate registered on the class returns `true`.
    Predicate(String),
    /// Elided when the named property of the instance is truthy.
    Flag(String),
}

/// The privacy rules and predicates of one class.
#[derive(Clone, Default)]
pub struct PrivacyRules {
    rules: HashMap<String, Privacy>,
    predicates: HashMap<String, Predicate>,
}

fn key(property: &str, context: &str) -> String {
    format!("{property}:{context}")
}

impl PrivacyRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule for a property in a context. A later rule for the same pair
    /// replaces the earlier one.
    pub fn register(&mut self, property: &str, context: Option<&str>, rule: Privacy) {
        self.rules
            .insert(key(property, context.unwrap_or(DEFAULT_CONTEXT)), rule);
    }

    /// Registers a named predicate usable from [`Privacy::Predicate`] rules.
    pub fn register_predicate<F>(&mut self, name: &str, predicate: F)
    where
        F: Fn(&ModelInstance, &str) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(name.to_string(), Arc::new(predicate));
    }

    /// Returns the rule that governs `property` in `context`: the exact-context rule,
    /// otherwise the wildcard rule.
    pub fn rule_for(&self, property: &str, context: &str) -> Option<&Privacy> {
        self.rules
            .get(&key(property, context))
            .or_else(|| self.rules.get(&key(property, WILDCARD_CONTEXT)))
    }

    /// Decides whether `property` must be elided from the JSON of `instance` in `context`.
    ///
    /// A predicate that is not registered leaves the field visible; [`Self::unknown_predicates`]
    /// is checked when the class is built so this cannot happen for a built class.
    pub fn is_private(&self, instance: &ModelInstance, property: &str, context: &str) -> bool {
        match self.rule_for(property, context) {
            None | Some(Privacy::Public) => false,
            Some(Privacy::Private) => true,
            Some(Privacy::Predicate(name)) => self
                .predicates
                .get(name)
                .is_some_and(|predicate| predicate(instance, context)),
            Some(Privacy::Flag(name)) => instance
                .get(name)
                .is_some_and(|value| value.is_truthy()),
        }
    }

    /// Names of predicates referenced by a rule but never registered.
    pub fn unknown_predicates(&self) -> Vec<(String, String)> {
        let mut unknown = self
            .rules
            .iter()
            .filter_map(|(rule_key, rule)| match rule {
                Privacy::Predicate(name) if !self.predicates.contains_key(name) => Some((
                    rule_key
                        .split_once(':')
                        .map(|(property, _)| property)
                        .unwrap_or(rule_key)
                        .to_string(),
                    name.clone(),
                )),
                _ => None,
            })
            .collect::<Vec<_>>();
        unknown.sort();
        unknown
    }

    /// Copies the rules and predicates of `other` into `self`.
    pub(crate) fn inherit(&mut self, other: &PrivacyRules) {
        self.rules
            .extend(other.rules.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.predicates
            .extend(other.predicates.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

impl fmt::Debug for PrivacyRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivacyRules")
            .field("rules", &self.rules)
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .finish()
    }
}
