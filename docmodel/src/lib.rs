//! Main docmodel crate providing a unified interface for model marshalling and persistence.
//!
//! This crate is the primary entry point for users of the docmodel framework. It re-exports
//! the core types from `docmodel-core` and gives access to the storage backends.
//!
//! # Features
//!
//! - **Declared models** - Properties, defaults and nested models declared at runtime
//! - **Per-context field mapping** - Different JSON and database names for the same property
//!   depending on the caller's context
//! - **Privacy and hooks** - Context-aware visibility rules and before-create/before-save hooks
//!   that run through nested models
//! - **Multiple backends** - In-memory and MongoDB storage behind one backend trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> OdmResult<()> {
//!     let odm = Odm::builder()
//!         .store("default", InMemoryStore::new())
//!         .build();
//!
//!     let user = ModelClass::builder("User")
//!         .db_config(DbConfig::new("users"))
//!         .json("firstName", FieldOptions::named("first_name"))
//!         .db("firstName", FieldOptions::named("fn"))
//!         .privacy("password", Privacy::Private)
//!         .build()?;
//!     odm.register(&user);
//!
//!     // Parse a request body, persist it and read it back
//!     let mut ada = user
//!         .from_json(&json!({ "first_name": "Ada" }), DEFAULT_CONTEXT)?
//!         .expect("an object");
//!     ada.create().await?;
//!
//!     let stored = user.get_by_id(ada.id().cloned().expect("created"), None).await?;
//!     println!("{:?}", stored.map(|user| user.to_json(DEFAULT_CONTEXT)));
//!
//!     // Write a single field
//!     ada.save_changes(bson::doc! { "fn": "Augusta" }).await?;
//!
//!     odm.shutdown().await
//! }
//! ```
//!
//! # Typed Models
//!
//! Wrapping an instance in an application type and implementing [`model::Model`] gives every
//! operation a typed form, with each default overridable:
//!
//! ```ignore
//! pub struct User(ModelInstance);
//!
//! impl Model for User {
//!     fn class() -> ModelClass { USER.clone() }
//!     fn from_instance(instance: ModelInstance) -> Self { User(instance) }
//!     fn instance(&self) -> &ModelInstance { &self.0 }
//!     fn instance_mut(&mut self) -> &mut ModelInstance { &mut self.0 }
//! }
//!
//! let users = User::get(Query::filtered(Filter::eq("fn", "Ada"))).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{
    backend, class, collection, db, error, hooks, identifier, instance, json, metadata, model, odm,
    persistence, privacy, query, schema, value,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmodel_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
