//! Convenient re-exports of commonly used types from docmodel.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```
//!
//! This provides access to:
//! - Model classes, instances, properties and field options
//! - Privacy rules and lifecycle hooks
//! - The application container and store backends
//! - Query construction and filtering
//! - Error types

pub use docmodel_core::{
    backend::{DeleteResult, InsertOneResult, StoreBackend, StoreBackendBuilder, UpdateResult, WriteOptions},
    class::{DbConfig, ModelClass, ModelClassBuilder},
    collection::Collection,
    db::FromDbOptions,
    error::{OdmError, OdmResult},
    hooks::{HookEvent, LifecycleHook, hook_fn},
    identifier::Identifier,
    instance::ModelInstance,
    metadata::{DEFAULT_CONTEXT, FieldOptions, WILDCARD_CONTEXT},
    model::Model,
    odm::{Odm, Operation, Registration},
    privacy::Privacy,
    query::{Collation, Expr, FieldOp, Filter, Projection, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    schema::{ModelRef, Property, PropertyKind},
    value::Value,
};
