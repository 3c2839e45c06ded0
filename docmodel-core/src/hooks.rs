//! Lifecycle hooks fired before persistence.
//!
//! Hooks are registered per class, per [`HookEvent`] and per context. Invoking an event
//! runs the hooks registered under the requested context in registration order, then
//! the hooks registered under the wildcard context, then recurses depth-first into every
//! nested model (single or array) the instance holds, whether the property kind or a field
//! mapping declared it.
//!
//! Each hook receives the instance of its own class, a read-only view of the outermost
//! instance the event was fired on, and the context.
//!
//! Every hook is awaited before the next one starts, so a later hook observes the
//! mutations of an earlier one and a failure leaves a deterministic set of instances
//! touched. The first failing hook aborts the whole invocation.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::hooks::hook_fn;
//!
//! let class = ModelClass::builder("User")
//!     .before_create(hook_fn(|user, _root, _context| Box::pin(async move {
//!         user.set("createdBy", "system");
//!         Ok(())
//!     })))
//!     .build()?;
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{
    error::OdmResult,
    instance::ModelInstance,
    metadata::WILDCARD_CONTEXT,
    value::Value,
};

/// The persistence events hooks can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    /// Fired by `create` before the document is built and inserted.
    BeforeCreate,
    /// Fired by `save` before the update is issued.
    BeforeSave,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookEvent::BeforeCreate => write!(f, "beforeCreate"),
            HookEvent::BeforeSave => write!(f, "beforeSave"),
        }
    }
}

/// An asynchronous callback run before an instance is persisted.
///
/// The hook receives the instance of the class it was declared on (a nested instance when
/// the event propagates into sub-documents), the outermost instance and the context the
/// operation runs in. While the outermost instance's own hooks run, `root` is a snapshot
/// taken just before the hook; nested hooks see it as it stood once its own hooks finished.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    async fn call(&self, instance: &mut ModelInstance, root: &ModelInstance, context: &str) -> OdmResult<()>;
}

/// Adapter turning a closure returning a boxed future into a [`LifecycleHook`].
pub struct HookFn<F>(F);

/// Wraps a closure as a [`LifecycleHook`].
pub fn hook_fn<F>(hook: F) -> HookFn<F>
where
    F: for<'a> Fn(&'a mut ModelInstance, &'a ModelInstance, &'a str) -> BoxFuture<'a, OdmResult<()>>
        + Send
        + Sync,
{
    HookFn(hook)
}

#[async_trait]
impl<F> LifecycleHook for HookFn<F>
where
    F: for<'a> Fn(&'a mut ModelInstance, &'a ModelInstance, &'a str) -> BoxFuture<'a, OdmResult<()>>
        + Send
        + Sync,
{
    async fn call(&self, instance: &mut ModelInstance, root: &ModelInstance, context: &str) -> OdmResult<()> {
        (self.0)(instance, root, context).await
    }
}

/// Shared handle to a registered hook.
pub type HookRef = Arc<dyn LifecycleHook>;

/// Hooks of one class, keyed by event and context.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<(HookEvent, String), Vec<HookRef>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook to the list for `(event, context)`.
    pub fn register(&mut self, event: HookEvent, context: &str, hook: HookRef) {
        self.hooks
            .entry((event, context.to_string()))
            .or_default()
            .push(hook);
    }

    /// Hooks registered for exactly `(event, context)`, in registration order.
    pub fn hooks_for(&self, event: HookEvent, context: &str) -> Vec<HookRef> {
        self.hooks
            .get(&(event, context.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Hooks that fire for `event` in `context`: the exact-context hooks followed by the
    /// wildcard hooks.
    pub fn applicable(&self, event: HookEvent, context: &str) -> Vec<HookRef> {
        let mut hooks = self.hooks_for(event, context);

        if context != WILDCARD_CONTEXT {
            hooks.extend(self.hooks_for(event, WILDCARD_CONTEXT));
        }

        hooks
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.values().all(Vec::is_empty)
    }

    /// Prepends the hooks of `other`, so inherited hooks fire before the class's own.
    pub(crate) fn inherit(&mut self, other: &HookRegistry) {
        for (key, parent_hooks) in &other.hooks {
            let own = self.hooks.entry(key.clone()).or_default();
            let mut merged = parent_hooks.clone();
            merged.append(own);
            *own = merged;
        }
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.hooks
                    .iter()
                    .map(|((event, context), hooks)| (format!("{event}:{context}"), hooks.len())),
            )
            .finish()
    }
}

/// Fires `event` on `instance` and, depth-first, on every nested model it holds.
pub fn invoke<'a>(
    instance: &'a mut ModelInstance,
    event: HookEvent,
    context: &'a str,
) -> BoxFuture<'a, OdmResult<()>> {
    propagate(instance, None, event, context)
}

fn propagate<'a>(
    instance: &'a mut ModelInstance,
    root: Option<&'a ModelInstance>,
    event: HookEvent,
    context: &'a str,
) -> BoxFuture<'a, OdmResult<()>> {
    Box::pin(async move {
        let class = instance.class().clone();

        for hook in class.hooks().applicable(event, context) {
            tracing::trace!(model = class.name(), %event, context, "running lifecycle hook");
            match root {
                Some(root) => hook.call(instance, root, context).await?,
                None => {
                    let snapshot = instance.clone();
                    hook.call(instance, &snapshot, context).await?;
                }
            }
        }

        let snapshot;
        let root = match root {
            Some(root) => root,
            None => {
                snapshot = instance.clone();
                &snapshot
            }
        };

        // Declared properties in declaration order, then anything else holding a model
        let mut names = class
            .properties()
            .iter()
            .map(|property| property.name().to_string())
            .collect::<Vec<_>>();
        names.extend(
            instance
                .properties()
                .filter(|(name, _)| class.property(name).is_none())
                .map(|(name, _)| name.to_string()),
        );

        for name in names {
            match instance.get_mut(&name) {
                Some(Value::Model(nested)) => propagate(nested, Some(root), event, context).await?,
                Some(Value::Array(items)) => {
                    for item in items.iter_mut() {
                        if let Value::Model(nested) = item {
                            propagate(nested, Some(root), event, context).await?;
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{class::ModelClass, error::OdmError, metadata::FieldOptions, schema::Property};
    use serde_json::json;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    fn recorder(log: Arc<Mutex<Vec<String>>>, label: &'static str) -> impl LifecycleHook {
        hook_fn(move |instance, _, context| {
            let log = log.clone();
            Box::pin(async move {
                log.lock()
                    .unwrap()
                    .push(format!("{label}:{}:{context}", instance.class().name()));
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_context_hooks_run_before_wildcard_hooks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let class = ModelClass::builder("HookOrder")
            .before_save_in(WILDCARD_CONTEXT, recorder(log.clone(), "wild"))
            .before_save(recorder(log.clone(), "first"))
            .before_save(recorder(log.clone(), "second"))
            .before_save_in("other", recorder(log.clone(), "other"))
            .build()
            .unwrap();

        let mut instance = class.instantiate();
        invoke(&mut instance, HookEvent::BeforeSave, "default")
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "first:HookOrder:default",
                "second:HookOrder:default",
                "wild:HookOrder:default",
            ]
        );
    }

    #[tokio::test]
    async fn test_later_hook_sees_earlier_mutation() {
        let class = ModelClass::builder("HookMutation")
            .before_create(hook_fn(|instance, _, _| {
                Box::pin(async move {
                    instance.set("step", 1);
                    Ok(())
                })
            }))
            .before_create(hook_fn(|instance, _, _| {
                Box::pin(async move {
                    let step = instance.get("step").and_then(Value::as_i64).unwrap_or(0);
                    instance.set("step", step + 1);
                    Ok(())
                })
            }))
            .build()
            .unwrap();

        let mut instance = class.instantiate();
        invoke(&mut instance, HookEvent::BeforeCreate, "default")
            .await
            .unwrap();

        assert_eq!(instance.get("step"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let class = ModelClass::builder("HookFailure")
            .before_save(hook_fn(|_, _, context| {
                Box::pin(async move {
                    Err(OdmError::hook("HookFailure", HookEvent::BeforeSave, context, "rejected"))
                })
            }))
            .before_save(hook_fn(move |_, _, _| {
                let counted = counted.clone();
                Box::pin(async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }))
            .build()
            .unwrap();

        let mut instance = class.instantiate();
        let err = invoke(&mut instance, HookEvent::BeforeSave, "default")
            .await
            .unwrap_err();

        assert!(matches!(err, OdmError::Hook { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_propagates_into_nested_models() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let leaf = ModelClass::builder("HookLeaf")
            .before_create(recorder(log.clone(), "create"))
            .build()
            .unwrap();
        let root = ModelClass::builder("HookRoot")
            .property(Property::models("leaves", &leaf))
            .before_create(recorder(log.clone(), "create"))
            .build()
            .unwrap();

        let mut instance = root.instantiate().with(
            "leaves",
            vec![leaf.instantiate(), leaf.instantiate()],
        );
        invoke(&mut instance, HookEvent::BeforeCreate, "default")
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "create:HookRoot:default",
                "create:HookLeaf:default",
                "create:HookLeaf:default",
            ]
        );
    }

    #[tokio::test]
    async fn test_propagates_into_models_declared_by_field_mapping() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let leaf = ModelClass::builder("MappedLeaf")
            .json("name", FieldOptions::new())
            .before_create(recorder(log.clone(), "create"))
            .build()
            .unwrap();
        let root = ModelClass::builder("MappedRoot")
            .field("child", FieldOptions::new().model(&leaf))
            .build()
            .unwrap();

        let mut instance = root
            .from_json(&json!({ "child": { "name": "leaf" } }), "default")
            .unwrap()
            .unwrap();
        assert!(instance.get_model("child").is_some());

        invoke(&mut instance, HookEvent::BeforeCreate, "default")
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["create:MappedLeaf:default"]);
    }

    #[tokio::test]
    async fn test_nested_hooks_see_the_outermost_instance() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observed = seen.clone();
        let grandchild = ModelClass::builder("RootGrandchild")
            .before_save(hook_fn(move |instance, root, _| {
                let observed = observed.clone();
                Box::pin(async move {
                    let owner = root.get_str("owner").unwrap_or("?").to_string();
                    observed.lock().unwrap().push(format!("{}:{owner}", root.class().name()));
                    instance.set("owner", owner);
                    Ok(())
                })
            }))
            .build()
            .unwrap();
        let child = ModelClass::builder("RootChild")
            .property(Property::model("kid", &grandchild))
            .build()
            .unwrap();
        let parent = ModelClass::builder("RootParent")
            .property(Property::models("children", &child))
            .before_save(hook_fn(|instance, _, _| {
                Box::pin(async move {
                    instance.set("owner", "ada");
                    Ok(())
                })
            }))
            .build()
            .unwrap();

        let mut family = parent.instantiate().with(
            "children",
            vec![child.instantiate().with("kid", grandchild.instantiate())],
        );
        invoke(&mut family, HookEvent::BeforeSave, "default")
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["RootParent:ada"]);
        let kid = family.get_models("children")[0].get_model("kid").unwrap();
        assert_eq!(kid.get_str("owner"), Some("ada"));
    }
}
