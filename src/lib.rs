// ============================================================================
// rustdocmodel
// ============================================================================

pub mod core;
pub mod persist;
pub mod store;

// Re-export main types for convenience
pub use core::{AttributeType, PersistError, Result, Value};
pub use persist::{
    AttributeChange, ChangeLedger, CoordinatorPolicy, Document, ModelSchema, SaveCoordinator,
    SaveOptions, UpdateOptions, WriteOptions,
};
pub use store::{DocumentStore, InMemoryDocumentStore, WriteResponse, WriteResult};

#[doc(hidden)]
pub use paste;
