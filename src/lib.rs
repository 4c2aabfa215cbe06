// ============================================================================
// tabledoc
// ============================================================================

//! Treat a SQL table as an ordered collection of loosely-typed JSON
//! documents.
//!
//! Documents are read and written through [`JsonStorageAdapter`]. Fields
//! whose value fits a typed column are stored there; everything else goes
//! into one freeform JSON column. An optional integer sort column keeps
//! the rows of each clause in a dense `0..k` order under insert, delete and
//! move.
//!
//! The database itself is reached through the [`Session`] trait, so the
//! crate works with whatever driver the application already has.
//!
//! ```ignore
//! use std::sync::Arc;
//! use tabledoc::{JsonStorageAdapter, JsonStorageConfig};
//!
//! let adapter = JsonStorageAdapter::new(
//!     Arc::new(my_session),
//!     JsonStorageConfig::new().sort_column("n").json_column("json"),
//! );
//! adapter.insert_row("mytable", "", -1, r#"{"name": "John", "age": 32}"#).await?;
//! println!("{}", adapter.read_rows("mytable", "").await?);
//! ```

pub mod core;
pub mod interface;
pub mod json;
pub mod result;

// Re-export main types for convenience
pub use crate::core::{Column, ColumnType, DbError, Result, Value, ValueKind};
pub use interface::{Session, escape_mysql_string};
pub use json::{
    Document, JsonError, JsonResult, JsonStorageAdapter, JsonStorageConfig, RowSelector,
    TableDescriptor,
};
pub use result::{QueryResult, Record};
