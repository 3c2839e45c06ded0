use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use bson::{Document, doc};
use mongodb::{
    Client, Collection as MongoCollection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::ClientOptions,
};
use docmodel_core::{
    backend::{
        DeleteResult, DocumentStream, InsertOneResult, StoreBackend, StoreBackendBuilder, UpdateResult,
        WriteOptions,
    },
    error::{OdmError, OdmResult},
    identifier::NATIVE_ID_FIELD,
    query::{Expr, Query, QueryVisitor},
};

use crate::query::MongoQueryTranslator;

const DUPLICATE_KEY: i32 = 11000;

fn backend_error(err: MongoError) -> OdmError {
    OdmError::Backend(err.to_string())
}


/// A [`StoreBackend`] over one MongoDB database.
#[derive(Debug, Clone)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_one(&self, collection: &str, document: Document) -> OdmResult<InsertOneResult> {
        let id = document
            .get(NATIVE_ID_FIELD)
            .map(ToString::to_string)
            .unwrap_or_default();

        let result = self.get_collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| match e.kind.as_ref() {
                ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY => {
                    OdmError::DocumentAlreadyExists(id, collection.to_string())
                },
                _ => backend_error(e),
            })?;

        Ok(InsertOneResult {
            inserted_id: result.inserted_id,
            inserted_count: 1,
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Expr,
        set: Document,
        options: WriteOptions,
    ) -> OdmResult<UpdateResult> {
        let filter = MongoQueryTranslator.visit_expr(&filter)?;

        // The server rejects an empty $set, so only report whether the document exists
        if set.is_empty() {
            let matched = self.get_collection(collection)
                .count_documents(filter)
                .limit(1)
                .await
                .map_err(backend_error)?;

            return Ok(UpdateResult {
                matched_count: matched,
                ..UpdateResult::default()
            });
        }

        let result = self.get_collection(collection)
            .update_one(filter, doc! { "$set": set })
            .upsert(options.upsert)
            .await
            .map_err(backend_error)?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Expr) -> OdmResult<DeleteResult> {
        let result = self.get_collection(collection)
            .delete_one(MongoQueryTranslator.visit_expr(&filter)?)
            .await
            .map_err(backend_error)?;

        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> OdmResult<DeleteResult> {
        let result = self.get_collection(collection)
            .delete_many(MongoQueryTranslator::filter(filter.as_ref())?)
            .await
            .map_err(backend_error)?;

        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn find(&self, collection: &str, query: Query) -> OdmResult<Vec<Document>> {
        self.get_collection(collection)
            .find(MongoQueryTranslator::filter(query.filter.as_ref())?)
            .with_options(MongoQueryTranslator::find_options(&query))
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn find_cursor(&self, collection: &str, query: Query) -> OdmResult<DocumentStream> {
        let cursor = self.get_collection(collection)
            .find(MongoQueryTranslator::filter(query.filter.as_ref())?)
            .with_options(MongoQueryTranslator::find_options(&query))
            .await
            .map_err(backend_error)?;

        Ok(cursor.map(|document| document.map_err(backend_error)).boxed())
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> OdmResult<u64> {
        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::filter(filter.as_ref())?)
            .await
            .map_err(backend_error)
    }

    async fn create_collection(&self, name: &str) -> OdmResult<()> {
        self.client
            .database(&self.database)
            .create_collection(name)
            .await
            .map_err(backend_error)
    }

    async fn drop_collection(&self, name: &str) -> OdmResult<()> {
        self.get_collection(name)
            .drop()
            .await
            .map_err(backend_error)
    }

    async fn list_collections(&self) -> OdmResult<Vec<String>> {
        self.client
            .database(&self.database)
            .list_collection_names()
            .await
            .map_err(backend_error)
    }

    async fn shutdown(&self) -> OdmResult<()> {
        self.client.clone().shutdown().await;
        tracing::debug!(database = %self.database, "mongodb client shut down");

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> OdmResult<Self::Backend> {
        let options = ClientOptions::parse(&self.dsn)
            .await
            .map_err(|e| OdmError::Initialization(e.to_string()))?;
        let client = Client::with_options(options)
            .map_err(|e| OdmError::Initialization(e.to_string()))?;

        tracing::debug!(database = %self.database, "mongodb client created");
        Ok(MongoDbStore::new(client, self.database))
    }
}
