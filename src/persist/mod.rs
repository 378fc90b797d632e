//! Change tracking and save coordination for store-backed documents.
//!
//! A [`Document`] records every attribute assignment in its
//! [`ChangeLedger`]. A [`SaveCoordinator`] turns the ledger into full or
//! partial store writes and commits the ledger only after the store
//! confirms the write.

pub mod attribute_value;
pub mod coordinator;
pub mod document;
pub mod ledger;
mod macros;
pub mod options;
pub mod schema;

pub use attribute_value::AttributeValue;
pub use coordinator::SaveCoordinator;
pub use document::{Document, DocumentMetadata, DocumentSnapshot, PersistenceState};
pub use ledger::{AttributeChange, ChangeLedger};
pub use options::{
    CoordinatorPolicy, DEFAULT_RETRY_BUDGET, SaveOptions, UpdateOptions, WriteOptions,
};
pub use schema::{AttributeDef, CREATED_AT, ModelSchema, UPDATED_AT};
