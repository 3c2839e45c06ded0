//! Persistence operations on registered model classes and their instances.
//!
//! Every operation resolves its collection through the class's binding (see
//! [`Odm::register`](crate::odm::Odm::register)) and maps documents through the DB
//! marshaller. Store errors propagate unmodified.
//!
//! An instance moves from unpersisted (no identifier) to persisted through
//! [`ModelInstance::create`]; [`ModelInstance::save`] and [`ModelInstance::remove`]
//! require the identifier and fail with [`OdmError::MissingIdentifier`] without one.

use bson::Document;
use futures::{StreamExt, stream::BoxStream};

use crate::{
    backend::{DeleteResult, InsertOneResult, UpdateResult, WriteOptions},
    class::ModelClass,
    collection::Collection,
    db::{self, FromDbOptions},
    error::{OdmError, OdmResult},
    hooks::{self, HookEvent},
    identifier::{ID_FIELD, Identifier, NATIVE_ID_FIELD},
    instance::ModelInstance,
    metadata::DEFAULT_CONTEXT,
    odm::{Operation, collection_for},
    query::{Expr, Filter, Projection, Query},
};

/// A stream of instances read through a cursor.
pub type InstanceStream = BoxStream<'static, OdmResult<ModelInstance>>;

impl ModelInstance {
    fn missing_identifier(&self, operation: Operation) -> OdmError {
        OdmError::MissingIdentifier {
            model: self.model_name().to_string(),
            operation,
            instance: Some(Box::new(self.clone())),
        }
    }

    /// Inserts the instance, running before-create hooks in the default context.
    pub async fn create(&mut self) -> OdmResult<InsertOneResult> {
        self.create_in(DEFAULT_CONTEXT).await
    }

    /// Inserts the instance, running before-create hooks in `context`.
    ///
    /// An identifier is generated when the instance has none.
    pub async fn create_in(&mut self, context: &str) -> OdmResult<InsertOneResult> {
        let collection = collection_for(self.class(), Operation::Create)?;

        hooks::invoke(self, HookEvent::BeforeCreate, context).await?;

        if !self.has_id() {
            self.set_id(Identifier::generate());
        }

        let document = self.to_db();
        tracing::debug!(model = self.model_name(), collection = collection.name(), context, "creating document");

        collection.insert_one(document).await
    }

    /// Writes every mapped field of the instance.
    pub async fn save(&mut self) -> OdmResult<UpdateResult> {
        self.save_with(None, WriteOptions::default(), DEFAULT_CONTEXT)
            .await
    }

    /// Writes only the fields of `change_set` (DB field names, dotted paths allowed) and
    /// merges them back onto the instance.
    pub async fn save_changes(&mut self, change_set: Document) -> OdmResult<UpdateResult> {
        self.save_with(Some(change_set), WriteOptions::default(), DEFAULT_CONTEXT)
            .await
    }

    /// Updates the stored document, running before-save hooks in `context`.
    ///
    /// Without a change-set the whole DB document, minus the identifier, is written.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::MissingIdentifier`] carrying a copy of the instance when it has
    /// never been created.
    pub async fn save_with(
        &mut self,
        change_set: Option<Document>,
        options: WriteOptions,
        context: &str,
    ) -> OdmResult<UpdateResult> {
        let Some(id) = self.id().cloned() else {
            return Err(self.missing_identifier(Operation::Save));
        };
        let collection = collection_for(self.class(), Operation::Save)?;

        hooks::invoke(self, HookEvent::BeforeSave, context).await?;

        let mut set = match &change_set {
            Some(change_set) => change_set.clone(),
            None => self.to_db(),
        };
        set.remove(NATIVE_ID_FIELD);
        if !self.class().fields().db().for_external(ID_FIELD, DEFAULT_CONTEXT).is_mapped() {
            set.remove(ID_FIELD);
        }

        tracing::debug!(
            model = self.model_name(),
            collection = collection.name(),
            context,
            partial = change_set.is_some(),
            "saving document"
        );

        let result = collection
            .update_one(Filter::id(&id), set, options)
            .await?;

        if let Some(change_set) = change_set {
            db::apply_change_set(self, &change_set)?;
        }

        Ok(result)
    }

    /// Deletes the stored document. The instance itself stays usable.
    pub async fn remove(&self) -> OdmResult<DeleteResult> {
        let Some(id) = self.id() else {
            return Err(self.missing_identifier(Operation::Remove));
        };
        let collection = collection_for(self.class(), Operation::Remove)?;

        tracing::debug!(model = self.model_name(), collection = collection.name(), %id, "removing document");
        collection.delete_one(Filter::id(id)).await
    }
}

impl ModelClass {
    fn read_options(query: &Query) -> FromDbOptions {
        FromDbOptions {
            strict: query.projection.is_some(),
        }
    }

    fn with_default_collation(&self, mut query: Query) -> Query {
        if query.collation.is_none() {
            query.collation = self
                .db_config()
                .and_then(|config| config.collation.clone());
        }
        query
    }

    /// Returns every instance matching `query`. Reads through a projection are strict.
    pub async fn get(&self, query: Query) -> OdmResult<Vec<ModelInstance>> {
        let collection = collection_for(self, Operation::Get)?;
        let options = Self::read_options(&query);

        collection
            .find(self.with_default_collation(query))
            .await?
            .iter()
            .map(|document| db::from_db(self, document, options))
            .collect()
    }

    /// Returns the first instance matching `filter`, if any.
    pub async fn get_one(&self, filter: Option<Expr>, projection: Option<Projection>) -> OdmResult<Option<ModelInstance>> {
        let collection = collection_for(self, Operation::GetOne)?;
        self.find_first(collection, filter, projection).await
    }

    /// Returns the instance stored under `id`, if any.
    pub async fn get_by_id(
        &self,
        id: impl Into<Identifier>,
        projection: Option<Projection>,
    ) -> OdmResult<Option<ModelInstance>> {
        let collection = collection_for(self, Operation::GetById)?;
        self.find_first(collection, Some(Filter::id(&id.into())), projection)
            .await
    }

    async fn find_first(
        &self,
        collection: Collection,
        filter: Option<Expr>,
        projection: Option<Projection>,
    ) -> OdmResult<Option<ModelInstance>> {
        let query = Query {
            filter,
            projection,
            limit: Some(1),
            ..Query::default()
        };
        let options = Self::read_options(&query);

        collection
            .find(self.with_default_collation(query))
            .await?
            .first()
            .map(|document| db::from_db(self, document, options))
            .transpose()
    }

    /// Streams the instances matching `query`, mapping each document as it arrives.
    pub async fn get_cursor(&self, query: Query) -> OdmResult<InstanceStream> {
        let collection = collection_for(self, Operation::GetCursor)?;
        let options = Self::read_options(&query);
        let class = self.clone();

        let documents = collection
            .find_cursor(self.with_default_collation(query))
            .await?;

        Ok(documents
            .map(move |document| document.and_then(|document| db::from_db(&class, &document, options)))
            .boxed())
    }

    /// Deletes the document stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::MissingIdentifier`] when `id` is `None`.
    pub async fn remove_by_id(&self, id: impl Into<Option<Identifier>>) -> OdmResult<DeleteResult> {
        let Some(id) = id.into() else {
            return Err(OdmError::MissingIdentifier {
                model: self.name().to_string(),
                operation: Operation::RemoveById,
                instance: None,
            });
        };
        let collection = collection_for(self, Operation::RemoveById)?;

        tracing::debug!(model = self.name(), collection = collection.name(), %id, "removing document by id");
        collection.delete_one(Filter::id(&id)).await
    }

    /// Deletes every document matching `filter`, or the whole collection's documents.
    pub async fn remove_all(&self, filter: Option<Expr>) -> OdmResult<DeleteResult> {
        let collection = collection_for(self, Operation::RemoveAll)?;

        tracing::debug!(model = self.name(), collection = collection.name(), "removing documents");
        collection.delete_many(filter).await
    }

    pub async fn count(&self, filter: Option<Expr>) -> OdmResult<u64> {
        collection_for(self, Operation::Count)?
            .count(filter)
            .await
    }
}
