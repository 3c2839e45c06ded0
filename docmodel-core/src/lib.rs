//! Model marshalling between in-memory instances, JSON and document-store documents.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Values and identifiers** ([`value`], [`identifier`]) - Dynamic property values and
//!   the native/display identifier pair
//! - **Model definitions** ([`class`], [`schema`], [`metadata`], [`privacy`], [`hooks`]) -
//!   Declared properties, field mappings per representation and context, visibility rules
//!   and lifecycle hooks
//! - **Instances** ([`instance`]) - Property bags bound to their class
//! - **Marshallers** ([`json`], [`db`]) - JSON and database document mapping, including
//!   nested models, strict projection reads and change-set merging
//! - **Store abstraction** ([`backend`], [`collection`], [`query`]) - Backend traits and the
//!   query AST they execute
//! - **Application container** ([`odm`]) - Named stores and model registration
//! - **Persistence** ([`persistence`], [`model`]) - Create, save, read and remove operations
//!   on classes, instances and typed wrappers
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docmodel_core::{class::{DbConfig, ModelClass}, metadata::FieldOptions};
//!
//! let user = ModelClass::builder("User")
//!     .db_config(DbConfig::new("users"))
//!     .field("firstName", FieldOptions::named("fn"))
//!     .build()?;
//!
//! let mut ada = user.instantiate().with("firstName", "Ada");
//! ada.create().await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_core;

pub mod backend;
pub mod class;
pub mod collection;
pub mod db;
pub mod error;
pub mod hooks;
pub mod identifier;
pub mod instance;
pub mod json;
pub mod metadata;
pub mod model;
pub mod odm;
pub mod persistence;
pub mod privacy;
pub mod query;
pub mod schema;
pub mod value;
