//! Sequential statement execution
//!
//! Every statement of an operation goes through here, one at a time, so
//! the next statement never starts before the previous one has finished.

use super::error::{JsonError, JsonResult};
use crate::interface::Session;
use crate::result::QueryResult;
use tracing::debug;

/// Runs statements against a session in order, stopping at the first
/// failure.
#[derive(Clone, Copy)]
pub struct QueryExecutor<'a> {
    session: &'a dyn Session,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(session: &'a dyn Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &'a dyn Session {
        self.session
    }

    /// Run one statement.
    pub async fn query(&self, statement: &str) -> JsonResult<QueryResult> {
        debug!(statement, "executing");
        self.session
            .query(statement)
            .await
            .map_err(|source| JsonError::StatementFailure {
                statement: statement.to_string(),
                source,
            })
    }

    /// Run `statements` in order. The first failure aborts the rest.
    pub async fn run(&self, statements: &[String]) -> JsonResult<()> {
        for statement in statements {
            self.query(statement).await?;
        }
        Ok(())
    }

    pub async fn begin(&self) -> JsonResult<()> {
        debug!("beginning transaction");
        self.session
            .begin()
            .await
            .map_err(|source| failure("START TRANSACTION", source))
    }

    pub async fn commit(&self) -> JsonResult<()> {
        debug!("committing transaction");
        self.session
            .commit()
            .await
            .map_err(|source| failure("COMMIT", source))
    }

    pub async fn rollback(&self) -> JsonResult<()> {
        debug!("rolling back transaction");
        self.session
            .rollback()
            .await
            .map_err(|source| failure("ROLLBACK", source))
    }
}

fn failure(statement: &str, source: crate::core::DbError) -> JsonError {
    JsonError::StatementFailure {
        statement: statement.to_string(),
        source,
    }
}
