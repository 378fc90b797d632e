//! Macro definitions for typed document models.
//!
//! `document_model!` wraps a [`Document`](crate::persist::Document) in a
//! struct with typed setters and getters. Every setter goes through
//! `Document::set`, so change tracking is identical to the untyped API.

#[path = "macros/document_model.rs"]
mod document_model;
