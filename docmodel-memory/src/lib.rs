//! In-memory storage backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Dotted paths** - Filters, sorts, projections and updates reach into embedded documents
//! - **Full query support** - Filtering, multi-key sorting, skip/limit, projection and
//!   case-insensitive collation
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let odm = Odm::builder()
//!         .store("default", InMemoryStore::new())
//!         .build();
//!
//!     let user = ModelClass::builder("User")
//!         .db_config(DbConfig::new("users"))
//!         .field("name", FieldOptions::new())
//!         .build()?;
//!     odm.register(&user);
//!
//!     let mut ada = user.instantiate().with("name", "Ada");
//!     ada.create().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_memory;

pub mod store;
pub mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
