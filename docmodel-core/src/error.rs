//! Error types and result types for model marshalling and persistence.
//!
//! Use [`OdmResult<T>`] as the return type for fallible operations. Configuration
//! errors carry the offending model and property names so a misdeclared class can
//! be diagnosed from the message alone.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::{hooks::HookEvent, instance::ModelInstance, odm::Operation};

/// Represents all possible errors raised by the mapping layer and its store backends.
#[derive(Error, Debug)]
pub enum OdmError {
    /// A nested model reference could not be resolved to a model class.
    #[error("Invalid model reference for {model}.{property}: {reason}")]
    InvalidModelReference {
        model: String,
        property: String,
        reason: String,
    },
    /// A model was declared or used in a way its definition does not allow.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The model class has not been registered with an application container.
    #[error("Model {0} is not registered with an application container")]
    NotRegistered(String),
    /// The store a model is configured for does not exist in the container.
    #[error("Model {model} is configured for store {store}, which is not defined")]
    StoreNotFound { model: String, store: String },
    /// The model class has no collection configured.
    #[error("Model {0} has no collection configured")]
    CollectionNotConfigured(String),
    /// The operation was suppressed when the model was registered.
    #[error("Operation {operation} is suppressed for model {model}")]
    OperationSuppressed { model: String, operation: Operation },
    /// An operation that requires an identifier was attempted without one.
    ///
    /// When the operation was attempted on an instance, the instance is attached.
    #[error("{operation} on model {model} requires an identifier")]
    MissingIdentifier {
        model: String,
        operation: Operation,
        instance: Option<Box<ModelInstance>>,
    },
    /// A lifecycle hook rejected, aborting the enclosing operation.
    #[error("{event} hook for model {model} failed in context {context}: {message}")]
    Hook {
        model: String,
        event: HookEvent,
        context: String,
        message: String,
    },
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// The document violates schema constraints or has invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl OdmError {
    /// Builds a [`OdmError::Hook`] from any displayable failure.
    pub fn hook(
        model: impl Into<String>,
        event: HookEvent,
        context: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        OdmError::Hook {
            model: model.into(),
            event,
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Returns the instance attached to a [`OdmError::MissingIdentifier`], if any.
    pub fn instance(&self) -> Option<&ModelInstance> {
        match self {
            OdmError::MissingIdentifier { instance, .. } => instance.as_deref(),
            _ => None,
        }
    }
}

/// A specialized `Result` type for mapping and persistence operations.
pub type OdmResult<T> = Result<T, OdmError>;

impl From<BsonError> for OdmError {
    fn from(err: BsonError) -> Self {
        OdmError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for OdmError {
    fn from(err: SerdeJsonError) -> Self {
        OdmError::Serialization(err.to_string())
    }
}
