//! Storage backend abstraction.
//!
//! The [`StoreBackend`] trait is the boundary between the marshallers and a document
//! store driver. It speaks store-native documents ([`bson::Document`]) and returns
//! store-native acknowledgments. Implementations must be `Send + Sync`; the persistence
//! layer shares one backend between every model bound to its store.
//!
//! - [`StoreBackend`]: the core trait, generic and statically dispatched
//! - [`DynStoreBackend`]: object-safe mirror, implemented for every [`StoreBackend`]
//! - [`StoreBackendBuilder`]: async factory for backends that need to connect first
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use docmodel::{backend::StoreBackend, query::Filter};
//!
//! let ack = backend.insert_one("users", doc! { "fn": "Ada" }).await?;
//! let found = backend.find("users", Query::filtered(Filter::eq("fn", "Ada"))).await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use std::{any::Any, fmt::Debug};

use crate::{
    error::OdmResult,
    query::{Expr, Query},
};

/// A stream of raw documents produced by a cursor.
pub type DocumentStream = BoxStream<'static, OdmResult<Document>>;

/// Acknowledgment of an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// Identifier the document was stored under.
    pub inserted_id: Bson,
    pub inserted_count: u64,
}

/// Acknowledgment of an update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    /// Identifier of the document created by an upsert.
    pub upserted_id: Option<Bson>,
}

/// Acknowledgment of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Options for writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOptions {
    /// Insert the document when the filter matches nothing.
    pub upsert: bool,
}

impl WriteOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Abstract interface for document storage backends.
///
/// # Error Handling
///
/// Driver failures are reported as [`OdmError`](crate::error::OdmError) values and are
/// propagated unmodified by the persistence layer.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts one document. The document carries its identifier under `_id`; backends
    /// generate one when it is missing.
    async fn insert_one(&self, collection: &str, document: Document) -> OdmResult<InsertOneResult>;

    /// Sets the fields of `set` on the first document matching `filter`. Keys may be dotted
    /// paths into embedded documents.
    async fn update_one(
        &self,
        collection: &str,
        filter: Expr,
        set: Document,
        options: WriteOptions,
    ) -> OdmResult<UpdateResult>;

    /// Deletes the first document matching `filter`.
    async fn delete_one(&self, collection: &str, filter: Expr) -> OdmResult<DeleteResult>;

    /// Deletes every document matching `filter`, or every document when it is `None`.
    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> OdmResult<DeleteResult>;

    /// Runs a query and collects the results.
    async fn find(&self, collection: &str, query: Query) -> OdmResult<Vec<Document>>;

    /// Runs a query and returns its results as a stream.
    ///
    /// The default implementation collects through [`StoreBackend::find`]; backends with
    /// real cursors should override it.
    async fn find_cursor(&self, collection: &str, query: Query) -> OdmResult<DocumentStream> {
        let documents = StoreBackend::find(self, collection, query).await?;
        Ok(stream::iter(documents.into_iter().map(Ok)).boxed())
    }

    /// Counts the documents matching `filter`.
    async fn count(&self, collection: &str, filter: Option<Expr>) -> OdmResult<u64>;

    async fn create_collection(&self, name: &str) -> OdmResult<()>;

    /// Drops a collection and every document in it.
    async fn drop_collection(&self, name: &str) -> OdmResult<()>;

    async fn list_collections(&self) -> OdmResult<Vec<String>>;

    /// Releases the backend's resources. The default implementation does nothing.
    async fn shutdown(&self) -> OdmResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_one(&self, collection: &str, document: Document) -> OdmResult<InsertOneResult> {
        StoreBackend::insert_one(*self, collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Expr,
        set: Document,
        options: WriteOptions,
    ) -> OdmResult<UpdateResult> {
        StoreBackend::update_one(*self, collection, filter, set, options)
            .await
    }

    async fn delete_one(&self, collection: &str, filter: Expr) -> OdmResult<DeleteResult> {
        StoreBackend::delete_one(*self, collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> OdmResult<DeleteResult> {
        StoreBackend::delete_many(*self, collection, filter).await
    }

    async fn find(&self, collection: &str, query: Query) -> OdmResult<Vec<Document>> {
        StoreBackend::find(*self, collection, query).await
    }

    async fn find_cursor(&self, collection: &str, query: Query) -> OdmResult<DocumentStream> {
        StoreBackend::find_cursor(*self, collection, query).await
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> OdmResult<u64> {
        StoreBackend::count(*self, collection, filter).await
    }

    async fn create_collection(&self, name: &str) -> OdmResult<()> {
        StoreBackend::create_collection(*self, name).await
    }

    async fn drop_collection(&self, name: &str) -> OdmResult<()> {
        StoreBackend::drop_collection(*self, name).await
    }

    async fn list_collections(&self) -> OdmResult<Vec<String>> {
        StoreBackend::list_collections(*self).await
    }

    async fn shutdown(&self) -> OdmResult<()> {
        StoreBackend::shutdown(*self).await
    }
}

/// Object-safe form of [`StoreBackend`], used wherever backends are stored by name.
#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn insert_one(&self, collection: &str, document: Document) -> OdmResult<InsertOneResult>;
    async fn update_one(
        &self,
        collection: &str,
        filter: Expr,
        set: Document,
        options: WriteOptions,
    ) -> OdmResult<UpdateResult>;
    async fn delete_one(&self, collection: &str, filter: Expr) -> OdmResult<DeleteResult>;
    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> OdmResult<DeleteResult>;
    async fn find(&self, collection: &str, query: Query) -> OdmResult<Vec<Document>>;
    async fn find_cursor(&self, collection: &str, query: Query) -> OdmResult<DocumentStream>;
    async fn count(&self, collection: &str, filter: Option<Expr>) -> OdmResult<u64>;
    async fn create_collection(&self, name: &str) -> OdmResult<()>;
    async fn drop_collection(&self, name: &str) -> OdmResult<()>;
    async fn list_collections(&self) -> OdmResult<Vec<String>>;
    async fn shutdown(&self) -> OdmResult<()>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: StoreBackend + 'static> DynStoreBackend for B {
    async fn insert_one(&self, collection: &str, document: Document) -> OdmResult<InsertOneResult> {
        StoreBackend::insert_one(self, collection, document).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Expr,
        set: Document,
        options: WriteOptions,
    ) -> OdmResult<UpdateResult> {
        StoreBackend::update_one(self, collection, filter, set, options).await
    }

    async fn delete_one(&self, collection: &str, filter: Expr) -> OdmResult<DeleteResult> {
        StoreBackend::delete_one(self, collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> OdmResult<DeleteResult> {
        StoreBackend::delete_many(self, collection, filter).await
    }

    async fn find(&self, collection: &str, query: Query) -> OdmResult<Vec<Document>> {
        StoreBackend::find(self, collection, query).await
    }

    async fn find_cursor(&self, collection: &str, query: Query) -> OdmResult<DocumentStream> {
        StoreBackend::find_cursor(self, collection, query).await
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> OdmResult<u64> {
        StoreBackend::count(self, collection, filter).await
    }

    async fn create_collection(&self, name: &str) -> OdmResult<()> {
        StoreBackend::create_collection(self, name).await
    }

    async fn drop_collection(&self, name: &str) -> OdmResult<()> {
        StoreBackend::drop_collection(self, name).await
    }

    async fn list_collections(&self) -> OdmResult<Vec<String>> {
        StoreBackend::list_collections(self).await
    }

    async fn shutdown(&self) -> OdmResult<()> {
        StoreBackend::shutdown(self).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Async factory for a backend.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> OdmResult<Self::Backend>;
}
