//! In-memory storage implementation for model stores.
//!
//! This module provides a simple in-memory backend that keeps documents as BSON
//! documents in insertion order, behind an async-safe read-write lock.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document, oid::ObjectId};

use docmodel_core::{
    backend::{DeleteResult, InsertOneResult, StoreBackend, StoreBackendBuilder, UpdateResult, WriteOptions},
    error::{OdmError, OdmResult},
    identifier::NATIVE_ID_FIELD,
    query::{Expr, FieldOp, Query},
};

use crate::evaluator::{DocumentEvaluator, project, set_path};

type StoreMap = HashMap<String, Vec<Document>>;


/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait to provide a fully functional
/// document store that operates entirely in memory. Documents are identified by their
/// `_id` field; one is generated on insert when missing.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state. Multiple clones
/// of the same instance share the same underlying data.
///
/// # Performance
///
/// Queries scan every document in a collection (no indexing). That is fine for tests and
/// small datasets; use a database backend for anything larger.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::{backend::StoreBackend, query::{Filter, Query}};
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.insert_one("users", doc! { "fn": "Ada" }).await?;
///
///     let docs = store.find("users", Query::filtered(Filter::eq("fn", "Ada"))).await?;
///     assert_eq!(docs.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// ```ignore
    /// let store = InMemoryStore::builder().build().await?;
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Number of documents currently held in `collection`.
    pub async fn len(&self, collection: &str) -> usize {
        self.store
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Removes every collection.
    pub async fn clear(&self) {
        self.store.write().await.clear();
    }
}

fn fold_case(query: &Query) -> bool {
    query
        .collation
        .as_ref()
        .is_some_and(|collation| collation.is_case_insensitive())
}

/// Seeds an upserted document with the equality conditions of its filter.
fn seed_from_filter(filter: &Expr, document: &mut Document) -> OdmResult<()> {
    match filter {
        Expr::Field { field, op: FieldOp::Eq, value } => set_path(document, field, value.clone()),
        Expr::And(exprs) => {
            for expr in exprs {
                seed_from_filter(expr, document)?;
            }
            Ok(())
        },
        _ => Ok(()),
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_one(&self, collection: &str, document: Document) -> OdmResult<InsertOneResult> {
        let mut store = self.store.write().await;
        let documents = store
            .entry(collection.to_string())
            .or_default();

        let document = match document.get(NATIVE_ID_FIELD) {
            Some(_) => document,
            None => {
                let mut stored = Document::new();
                stored.insert(NATIVE_ID_FIELD, ObjectId::new());
                for (key, value) in document {
                    stored.insert(key, value);
                }
                stored
            },
        };
        let id = document
            .get(NATIVE_ID_FIELD)
            .cloned()
            .unwrap_or(Bson::Null);

        if documents.iter().any(|existing| existing.get(NATIVE_ID_FIELD) == Some(&id)) {
            return Err(OdmError::DocumentAlreadyExists(id.to_string(), collection.to_string()));
        }

        documents.push(document);
        tracing::trace!(collection, %id, "document inserted");

        Ok(InsertOneResult {
            inserted_id: id,
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
        let mut store = self.store.write().await;

        let matched = store.get_mut(collection).and_then(|documents| {
            documents
                .iter_mut()
                .find(|document| DocumentEvaluator::matches(document, Some(&filter), false))
        });

        if let Some(document) = matched {
            let before = document.clone();
            for (path, value) in set {
                set_path(document, &path, value)?;
            }

            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: u64::from(*document != before),
                upserted_id: None,
            });
        }

        if !options.upsert {
            return Ok(UpdateResult::default());
        }

        let mut document = Document::new();
        seed_from_filter(&filter, &mut document)?;
        for (path, value) in set {
            set_path(&mut document, &path, value)?;
        }
        if !document.contains_key(NATIVE_ID_FIELD) {
            document.insert(NATIVE_ID_FIELD, ObjectId::new());
        }

        let id = document
            .get(NATIVE_ID_FIELD)
            .cloned()
            .unwrap_or(Bson::Null);
        store
            .entry(collection.to_string())
            .or_default()
            .push(document);
        tracing::trace!(collection, %id, "document upserted");

        Ok(UpdateResult {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
        })
    }

    async fn delete_one(&self, collection: &str, filter: Expr) -> OdmResult<DeleteResult> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };

        let position = documents
            .iter()
            .position(|document| DocumentEvaluator::matches(document, Some(&filter), false));

        Ok(match position {
            Some(index) => {
                documents.remove(index);
                DeleteResult { deleted_count: 1 }
            },
            None => DeleteResult::default(),
        })
    }

    async fn delete_many(&self, collection: &str, filter: Option<Expr>) -> OdmResult<DeleteResult> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };

        let before = documents.len();
        documents.retain(|document| !DocumentEvaluator::matches(document, filter.as_ref(), false));

        Ok(DeleteResult {
            deleted_count: (before - documents.len()) as u64,
        })
    }

    async fn find(&self, collection: &str, query: Query) -> OdmResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };
        let fold_case = fold_case(&query);

        let mut found = documents
            .iter()
            .filter(|document| DocumentEvaluator::matches(document, query.filter.as_ref(), fold_case))
            .cloned()
            .collect::<Vec<_>>();

        if !query.sort.is_empty() {
            found.sort_by(|a, b| DocumentEvaluator::compare(a, b, &query.sort, fold_case));
        }

        Ok(
            found
                .into_iter()
                .skip(query.skip.unwrap_or(0) as usize)
                .take(query.limit.map_or(usize::MAX, |limit| limit as usize))
                .map(|document| match &query.projection {
                    Some(projection) => project(document, projection),
                    None => document,
                })
                .collect()
        )
    }

    async fn count(&self, collection: &str, filter: Option<Expr>) -> OdmResult<u64> {
        let store = self.store.read().await;

        Ok(
            store
                .get(collection)
                .map_or(0, |documents| {
                    documents
                        .iter()
                        .filter(|document| DocumentEvaluator::matches(document, filter.as_ref(), false))
                        .count()
                }) as u64
        )
    }

    async fn create_collection(&self, name: &str) -> OdmResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> OdmResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(OdmError::CollectionNotFound(name.to_string()));
        }

        Ok(())
    }

    async fn list_collections(&self) -> OdmResult<Vec<String>> {
        let mut names = self.store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();

        Ok(names)
    }
}


/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use docmodel::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Always succeeds with a freshly initialized store.
    async fn build(self) -> OdmResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmodel_core::query::{Collation, Filter, Projection, SortDirection};

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();

        for (first, last, age) in [("Ada", "Lovelace", 36), ("grace", "Hopper", 85), ("Alan", "Turing", 41)] {
            store
                .insert_one("users", doc! { "fn": first, "ln": last, "age": age })
                .await
                .unwrap();
        }

        store
    }

    #[tokio::test]
    async fn test_insert_generates_id() {
        let store = InMemoryStore::new();

        let result = store.insert_one("users", doc! { "fn": "Ada" }).await.unwrap();
        assert!(matches!(result.inserted_id, Bson::ObjectId(_)));

        let stored = store.find("users", Query::new()).await.unwrap();
        assert_eq!(stored[0].get(NATIVE_ID_FIELD), Some(&result.inserted_id));
        assert_eq!(stored[0].keys().next().map(String::as_str), Some(NATIVE_ID_FIELD));
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_id() {
        let store = InMemoryStore::new();
        let id = ObjectId::new();

        store.insert_one("users", doc! { "_id": id }).await.unwrap();
        let result = store.insert_one("users", doc! { "_id": id }).await;

        assert!(matches!(result, Err(OdmError::DocumentAlreadyExists(_, _))));
    }

    #[tokio::test]
    async fn test_update_sets_dotted_paths() {
        let store = InMemoryStore::new();
        let id = ObjectId::new();
        store
            .insert_one("users", doc! { "_id": id, "fn": "Ada", "address": { "city": "London", "zip": "W1" } })
            .await
            .unwrap();

        let result = store
            .update_one("users", Filter::eq("_id", id), doc! { "address.city": "Paris" }, WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(result.matched_count, 1);
        assert_eq!(result.modified_count, 1);

        let stored = store.find("users", Query::new()).await.unwrap();
        assert_eq!(stored[0], doc! { "_id": id, "fn": "Ada", "address": { "city": "Paris", "zip": "W1" } });
    }

    #[tokio::test]
    async fn test_update_without_change_is_not_modified() {
        let store = seeded().await;

        let result = store
            .update_one("users", Filter::eq("fn", "Ada"), doc! { "age": 36 }, WriteOptions::default())
            .await
            .unwrap();

        assert_eq!(result.matched_count, 1);
        assert_eq!(result.modified_count, 0);
    }

    #[tokio::test]
    async fn test_update_upsert() {
        let store = InMemoryStore::new();

        let missed = store
            .update_one("users", Filter::eq("fn", "Ada"), doc! { "age": 36 }, WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(missed, UpdateResult::default());

        let upserted = store
            .update_one("users", Filter::eq("fn", "Ada"), doc! { "age": 36 }, WriteOptions::upsert())
            .await
            .unwrap();
        assert!(upserted.upserted_id.is_some());

        let stored = store.find("users", Query::new()).await.unwrap();
        assert_eq!(stored[0].get_str("fn").unwrap(), "Ada");
        assert_eq!(stored[0].get_i32("age").unwrap(), 36);
    }

    #[tokio::test]
    async fn test_find_sorts_skips_and_limits() {
        let store = seeded().await;

        let query = Query::builder()
            .sort("age", SortDirection::Desc)
            .skip(1)
            .limit(1)
            .build();
        let found = store.find("users", query).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].get_str("fn").unwrap(), "Alan");
    }

    #[tokio::test]
    async fn test_find_with_collation() {
        let store = seeded().await;

        let sensitive = store
            .find("users", Query::builder().sort("fn", SortDirection::Asc).build())
            .await
            .unwrap();
        let names = sensitive.iter().map(|d| d.get_str("fn").unwrap()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Ada", "Alan", "grace"]);

        let insensitive = store
            .find(
                "users",
                Query::builder()
                    .filter(Filter::eq("fn", "GRACE"))
                    .collation(Collation::new("en").strength(2))
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(insensitive.len(), 1);
    }

    #[tokio::test]
    async fn test_find_projection_keeps_id() {
        let store = seeded().await;

        let found = store
            .find("users", Query::builder().projection(Projection::include(["fn"])).build())
            .await
            .unwrap();

        assert!(found.iter().all(|d| d.len() == 2 && d.contains_key("_id") && d.contains_key("fn")));
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let store = seeded().await;

        assert_eq!(store.count("users", None).await.unwrap(), 3);
        assert_eq!(store.count("users", Some(Filter::gt("age", 40))).await.unwrap(), 2);

        let one = store.delete_one("users", Filter::gt("age", 40)).await.unwrap();
        assert_eq!(one.deleted_count, 1);

        let rest = store.delete_many("users", None).await.unwrap();
        assert_eq!(rest.deleted_count, 2);
        assert_eq!(store.len("users").await, 0);
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let store = InMemoryStore::new();

        assert!(store.find("nothing", Query::new()).await.unwrap().is_empty());
        assert_eq!(store.count("nothing", None).await.unwrap(), 0);
        assert_eq!(store.delete_many("nothing", None).await.unwrap().deleted_count, 0);
        assert!(matches!(
            store.drop_collection("nothing").await,
            Err(OdmError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_collections() {
        let store = InMemoryStore::builder().build().await.unwrap();

        store.create_collection("b").await.unwrap();
        store.create_collection("a").await.unwrap();
        assert_eq!(store.list_collections().await.unwrap(), vec!["a", "b"]);

        store.drop_collection("a").await.unwrap();
        assert_eq!(store.list_collections().await.unwrap(), vec!["b"]);
    }
}
