//! A named collection on a shared backend.
//!
//! [`Collection`] is what a registered model class resolves its persistence target to.
//! It holds the collection name and a shared handle to the backend of its store, and
//! forwards every call to the backend. It is cheap to clone.

use std::sync::Arc;

use bson::Document;

use crate::{
    backend::{DeleteResult, DocumentStream, DynStoreBackend, InsertOneResult, UpdateResult, WriteOptions},
    error::OdmResult,
    query::{Expr, Query},
};

#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    backend: Arc<dyn DynStoreBackend>,
}

impl Collection {
    pub(crate) fn new(name: impl Into<String>, backend: Arc<dyn DynStoreBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Arc<dyn DynStoreBackend> {
        &self.backend
    }

    pub async fn insert_one(&self, document: Document) -> OdmResult<InsertOneResult> {
        tracing::trace!(collection = %self.name, "insert_one");
        self.backend.insert_one(&self.name, document).await
    }

    pub async fn update_one(&self, filter: Expr, set: Document, options: WriteOptions) -> OdmResult<UpdateResult> {
        tracing::trace!(collection = %self.name, fields = set.len(), upsert = options.upsert, "update_one");
        self.backend
            .update_one(&self.name, filter, set, options)
            .await
    }

    pub async fn delete_one(&self, filter: Expr) -> OdmResult<DeleteResult> {
        tracing::trace!(collection = %self.name, "delete_one");
        self.backend.delete_one(&self.name, filter).await
    }

    pub async fn delete_many(&self, filter: Option<Expr>) -> OdmResult<DeleteResult> {
        tracing::trace!(collection = %self.name, "delete_many");
        self.backend.delete_many(&self.name, filter).await
    }

    pub async fn find(&self, query: Query) -> OdmResult<Vec<Document>> {
        tracing::trace!(collection = %self.name, ?query, "find");
        self.backend.find(&self.name, query).await
    }

    pub async fn find_cursor(&self, query: Query) -> OdmResult<DocumentStream> {
        tracing::trace!(collection = %self.name, ?query, "find_cursor");
        self.backend.find_cursor(&self.name, query).await
    }

    pub async fn count(&self, filter: Option<Expr>) -> OdmResult<u64> {
        self.backend.count(&self.name, filter).await
    }

    /// Drops the collection and every document in it.
    pub async fn drop(&self) -> OdmResult<()> {
        tracing::debug!(collection = %self.name, "dropping collection");
        self.backend.drop_collection(&self.name).await
    }
}
