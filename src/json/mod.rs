//! JSON Document Module
//!
//! Treats a SQL table as an ordered collection of loosely-typed JSON
//! documents, following the Facade pattern to hide schema introspection,
//! type coercion, position bookkeeping and SQL generation.
//!
//! # Architecture
//!
//! - `adapter.rs` - Main facade (JsonStorageAdapter)
//! - `schema.rs` - Table descriptors and the schema cache
//! - `coercion.rs` - Stored scalar <-> document value rules
//! - `position.rs` - Dense sort-column renumbering plans
//! - `converter.rs` - Statement rendering (RowCodec)
//! - `executor.rs` - Sequential statement execution
//! - `validator.rs` - Identifier and clause validation
//! - `config.rs`, `selector.rs` - Adapter configuration and row selection
//! - `error.rs` - Domain-specific errors

mod adapter;
pub mod coercion;
mod config;
pub mod converter;
mod error;
mod executor;
pub mod position;
mod schema;
mod selector;
mod validator;

pub use adapter::JsonStorageAdapter;
pub use coercion::{Document, DocumentSplit};
pub use config::JsonStorageConfig;
pub use converter::{Order, RowCodec, Scope};
pub use error::{JsonError, JsonResult};
pub use executor::QueryExecutor;
pub use position::{InsertPlan, MovePlan, OutOfRange, PositionShift};
pub use schema::{SchemaCache, TableDescriptor};
pub use selector::RowSelector;
pub use validator::{ClauseRule, ClauseValidator, validate_identifier};
