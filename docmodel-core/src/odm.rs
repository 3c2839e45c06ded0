//! The application container.
//!
//! An [`Odm`] owns the named store backends of an application. Registering a model class
//! with it binds the class to those stores, which is what the persistence operations use
//! to find their collection. Classes are tracked by [`ClassId`], never by name.
//!
//! A persistence target that does not resolve (no collection configured, or a store name
//! that was never added) is only reported when an operation is attempted.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{memory::InMemoryStore, odm::{Odm, Operation, Registration}};
//!
//! let odm = Odm::builder()
//!     .store("default", InMemoryStore::new())
//!     .build();
//!
//! odm.register(&user);
//! odm.register_with(&audit, Registration::new().suppress(Operation::Remove));
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use crate::{
    backend::{DynStoreBackend, StoreBackend},
    class::{ClassId, DbConfig, ModelClass},
    collection::Collection,
    error::{OdmError, OdmResult},
};

/// Persistence operations, used to suppress operations at registration and to report
/// which operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Save,
    Remove,
    RemoveById,
    RemoveAll,
    Get,
    GetOne,
    GetById,
    GetCursor,
    Count,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Save => "save",
            Operation::Remove => "remove",
            Operation::RemoveById => "removeById",
            Operation::RemoveAll => "removeAll",
            Operation::Get => "get",
            Operation::GetOne => "getOne",
            Operation::GetById => "getById",
            Operation::GetCursor => "getCursor",
            Operation::Count => "count",
        };

        f.write_str(name)
    }
}

/// Options for [`Odm::register_with`].
#[derive(Debug, Clone, Default)]
pub struct Registration {
    suppressed: HashSet<Operation>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables an operation for the registered class.
    pub fn suppress(mut self, operation: Operation) -> Self {
        self.suppressed.insert(operation);
        self
    }

    pub fn is_suppressed(&self, operation: Operation) -> bool {
        self.suppressed.contains(&operation)
    }
}

type Stores = HashMap<String, Arc<dyn DynStoreBackend>>;

/// The link between a registered class and the stores of its container.
#[derive(Debug)]
pub struct Binding {
    model: String,
    db: Option<DbConfig>,
    stores: Arc<Stores>,
    registration: Registration,
}

impl Binding {
    /// Resolves the collection `operation` runs against.
    ///
    /// # Errors
    ///
    /// - [`OdmError::OperationSuppressed`] if the operation was suppressed at registration
    /// - [`OdmError::CollectionNotConfigured`] if the class has no persistence configuration
    /// - [`OdmError::StoreNotFound`] if the configured store is not part of the container
    pub fn collection(&self, operation: Operation) -> OdmResult<Collection> {
        if self.registration.is_suppressed(operation) {
            return Err(OdmError::OperationSuppressed {
                model: self.model.clone(),
                operation,
            });
        }

        let config = self
            .db
            .as_ref()
            .ok_or_else(|| OdmError::CollectionNotConfigured(self.model.clone()))?;

        let backend = self
            .stores
            .get(&config.store)
            .ok_or_else(|| OdmError::StoreNotFound {
                model: self.model.clone(),
                store: config.store.clone(),
            })?;

        Ok(Collection::new(config.collection.clone(), backend.clone()))
    }

    pub fn db_config(&self) -> Option<&DbConfig> {
        self.db.as_ref()
    }
}

/// Resolves the collection of a registered class for `operation`.
pub(crate) fn collection_for(class: &ModelClass, operation: Operation) -> OdmResult<Collection> {
    class
        .binding()
        .ok_or_else(|| OdmError::NotRegistered(class.name().to_string()))?
        .collection(operation)
}

/// Builder for [`Odm`].
#[derive(Default)]
pub struct OdmBuilder {
    stores: Stores,
}

impl OdmBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named store. A later store with the same name replaces the earlier one.
    pub fn store(mut self, name: impl Into<String>, backend: impl StoreBackend + 'static) -> Self {
        self.stores.insert(name.into(), Arc::new(backend));
        self
    }

    /// Adds a named store that is already shared.
    pub fn shared_store(mut self, name: impl Into<String>, backend: Arc<dyn DynStoreBackend>) -> Self {
        self.stores.insert(name.into(), backend);
        self
    }

    pub fn build(self) -> Odm {
        Odm {
            stores: Arc::new(self.stores),
            models: RwLock::new(HashMap::new()),
        }
    }
}

/// The application container: named stores and the classes registered against them.
pub struct Odm {
    stores: Arc<Stores>,
    models: RwLock<HashMap<ClassId, ModelClass>>,
}

impl Odm {
    pub fn builder() -> OdmBuilder {
        OdmBuilder::new()
    }

    /// Registers `class` with every operation enabled.
    pub fn register(&self, class: &ModelClass) {
        self.register_with(class, Registration::new());
    }

    /// Registers `class`, replacing any earlier registration of the same class.
    pub fn register_with(&self, class: &ModelClass, registration: Registration) {
        if class.is_registered() {
            tracing::warn!(model = class.name(), "model class registered again, replacing binding");
        }

        class.bind(Arc::new(Binding {
            model: class.name().to_string(),
            db: class.db_config().cloned(),
            stores: self.stores.clone(),
            registration,
        }));

        self.models
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class.id(), class.clone());

        tracing::debug!(
            model = class.name(),
            id = %class.id(),
            collection = class.db_config().map(|config| config.collection.as_str()),
            "model class registered"
        );
    }

    /// Looks up a registered class by identity.
    pub fn model(&self, id: ClassId) -> Option<ModelClass> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Returns every registered class.
    pub fn models(&self) -> Vec<ModelClass> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Returns the backend registered under `name`.
    pub fn store(&self, name: &str) -> Option<&Arc<dyn DynStoreBackend>> {
        self.stores.get(name)
    }

    /// Returns the backend registered under `name` as its concrete type.
    pub fn store_as<B: StoreBackend + 'static>(&self, name: &str) -> Option<&B> {
        self.stores
            .get(name)
            .and_then(|backend| backend.as_any().downcast_ref::<B>())
    }

    /// Shuts every store down, stopping at the first failure.
    pub async fn shutdown(&self) -> OdmResult<()> {
        for (name, backend) in self.stores.iter() {
            tracing::debug!(store = %name, "shutting down store");
            backend.shutdown().await?;
        }

        Ok(())
    }
}

impl fmt::Debug for Odm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Odm")
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .finish()
    }
}
