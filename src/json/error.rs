//! Document-layer error types
//!
//! Every public operation of the adapter returns `JsonResult`. Session
//! failures are wrapped together with the statement that caused them.

use crate::core::DbError;
use thiserror::Error;

pub type JsonResult<T> = Result<T, JsonError>;

#[derive(Debug, Error)]
pub enum JsonError {
    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Invalid document structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Table '{0}' not found or has no columns")]
    SchemaNotFound(String),

    #[error("Row selection on '{table}' matched {matches} rows, expected exactly one")]
    AmbiguousRowSelection { table: String, matches: usize },

    #[error("Position {position} is out of range for '{table}' ({len} rows in scope)")]
    PositionOutOfRange {
        table: String,
        position: i64,
        len: usize,
    },

    #[error("Statement failed: {statement}: {source}")]
    StatementFailure {
        statement: String,
        #[source]
        source: DbError,
    },
}

impl From<serde_json::Error> for JsonError {
    fn from(err: serde_json::Error) -> Self {
        JsonError::ParseError(err.to_string())
    }
}

impl JsonError {
    /// Whether the failure happened while statements were being applied,
    /// as opposed to while validating input or resolving the target row.
    pub fn is_statement_failure(&self) -> bool {
        matches!(self, JsonError::StatementFailure { .. })
    }
}
