//! Typed models.
//!
//! [`Model`] is implemented by integrator-defined wrapper types around a
//! [`ModelInstance`]. Every marshalling and persistence operation has a default
//! implementation that delegates to the wrapped instance and its class, and any of them
//! can be overridden by the implementor.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::OnceLock;
//! use docmodel::prelude::*;
//!
//! pub struct User(ModelInstance);
//!
//! impl Model for User {
//!     fn class() -> ModelClass {
//!         static CLASS: OnceLock<ModelClass> = OnceLock::new();
//!         CLASS
//!             .get_or_init(|| {
//!                 ModelClass::builder("User")
//!                     .db_config(DbConfig::new("users"))
//!                     .field("name", FieldOptions::new())
//!                     .build()
//!                     .expect("valid model definition")
//!             })
//!             .clone()
//!     }
//!
//!     fn from_instance(instance: ModelInstance) -> Self {
//!         User(instance)
//!     }
//!
//!     fn instance(&self) -> &ModelInstance {
//!         &self.0
//!     }
//!
//!     fn instance_mut(&mut self) -> &mut ModelInstance {
//!         &mut self.0
//!     }
//! }
//! ```

use async_trait::async_trait;
use bson::Document;
use serde_json::Value as JsonValue;

use crate::{
    backend::{DeleteResult, InsertOneResult, UpdateResult},
    class::ModelClass,
    db::FromDbOptions,
    error::OdmResult,
    identifier::Identifier,
    instance::ModelInstance,
    query::{Expr, Projection, Query},
};

#[async_trait]
pub trait Model: Sized + Send + Sync {
    /// The class every instance of this type belongs to.
    fn class() -> ModelClass;

    fn from_instance(instance: ModelInstance) -> Self;

    fn instance(&self) -> &ModelInstance;

    fn instance_mut(&mut self) -> &mut ModelInstance;

    /// A new value carrying the declared defaults.
    fn new() -> Self {
        Self::from_instance(Self::class().instantiate())
    }

    fn from_json(json: &JsonValue, context: &str) -> OdmResult<Option<Self>> {
        Ok(Self::class()
            .from_json(json, context)?
            .map(Self::from_instance))
    }

    fn from_json_array(json: &JsonValue, context: &str) -> OdmResult<Vec<Self>> {
        Ok(Self::class()
            .from_json_array(json, context)?
            .into_iter()
            .map(Self::from_instance)
            .collect())
    }

    fn to_json(&self, context: &str) -> JsonValue {
        self.instance().to_json(context)
    }

    fn from_db(document: &Document, options: FromDbOptions) -> OdmResult<Self> {
        Self::class()
            .from_db(document, options)
            .map(Self::from_instance)
    }

    fn to_db(&self) -> Document {
        self.instance().to_db()
    }

    async fn create(&mut self) -> OdmResult<InsertOneResult> {
        self.instance_mut().create().await
    }

    async fn save(&mut self) -> OdmResult<UpdateResult> {
        self.instance_mut().save().await
    }

    async fn save_changes(&mut self, change_set: Document) -> OdmResult<UpdateResult> {
        self.instance_mut()
            .save_changes(change_set)
            .await
    }

    async fn remove(&self) -> OdmResult<DeleteResult> {
        self.instance().remove().await
    }

    async fn get(query: Query) -> OdmResult<Vec<Self>> {
        Ok(Self::class()
            .get(query)
            .await?
            .into_iter()
            .map(Self::from_instance)
            .collect())
    }

    async fn get_one(filter: Option<Expr>, projection: Option<Projection>) -> OdmResult<Option<Self>> {
        Ok(Self::class()
            .get_one(filter, projection)
            .await?
            .map(Self::from_instance))
    }

    async fn get_by_id(id: Identifier, projection: Option<Projection>) -> OdmResult<Option<Self>> {
        Ok(Self::class()
            .get_by_id(id, projection)
            .await?
            .map(Self::from_instance))
    }

    async fn remove_by_id(id: Option<Identifier>) -> OdmResult<DeleteResult> {
        Self::class().remove_by_id(id).await
    }

    async fn remove_all(filter: Option<Expr>) -> OdmResult<DeleteResult> {
        Self::class().remove_all(filter).await
    }

    async fn count(filter: Option<Expr>) -> OdmResult<u64> {
        Self::class().count(filter).await
    }
}
