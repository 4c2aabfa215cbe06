//! Table descriptors and the per-adapter schema cache
//!
//! A descriptor is built from `DESCRIBE` output the first time a table is
//! used and then reused for every later operation. Nothing notices if the
//! table is altered afterwards; call [`SchemaCache::refresh`] when it is.

use super::coercion::Document;
use super::converter::RowCodec;
use super::error::{JsonError, JsonResult};
use super::executor::QueryExecutor;
use crate::core::{Column, DbError};
use crate::result::QueryResult;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// What the document layer knows about one table.
///
/// `columns` holds the typed columns only; the sort and freeform columns
/// are kept apart and are `None` when the table does not have them.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescriptor {
    table: String,
    columns: Vec<Column>,
    sort_column: Option<String>,
    json_column: Option<String>,
}

impl TableDescriptor {
    pub fn new(
        table: impl Into<String>,
        columns: Vec<Column>,
        sort_column: Option<String>,
        json_column: Option<String>,
    ) -> Self {
        Self {
            table: table.into(),
            columns,
            sort_column,
            json_column,
        }
    }

    /// Split introspected columns into typed, sort and freeform columns.
    pub fn from_columns(
        table: impl Into<String>,
        all_columns: Vec<Column>,
        sort_name: Option<&str>,
        json_name: Option<&str>,
    ) -> Self {
        let mut sort_column = None;
        let mut json_column = None;
        let mut columns = Vec::with_capacity(all_columns.len());

        for column in all_columns {
            if sort_name == Some(column.name.as_str()) {
                sort_column = Some(column.name);
            } else if json_name == Some(column.name.as_str()) {
                json_column = Some(column.name);
            } else {
                columns.push(column);
            }
        }

        Self::new(table, columns, sort_column, json_column)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn sort_column(&self) -> Option<&str> {
        self.sort_column.as_deref()
    }

    pub fn json_column(&self) -> Option<&str> {
        self.json_column.as_deref()
    }

    pub fn is_sort_column(&self, name: &str) -> bool {
        self.sort_column() == Some(name)
    }

    pub fn is_json_column(&self, name: &str) -> bool {
        self.json_column() == Some(name)
    }

    /// Column name to default placeholder, in table order.
    pub fn defaults(&self) -> Document {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.default_value()))
            .collect()
    }
}

/// Memoizes one [`TableDescriptor`] per table name.
pub struct SchemaCache {
    sort_column: Option<String>,
    json_column: Option<String>,
    entries: RwLock<HashMap<String, Arc<TableDescriptor>>>,
}

impl SchemaCache {
    pub fn new(sort_column: Option<String>, json_column: Option<String>) -> Self {
        Self {
            sort_column,
            json_column,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The descriptor for `table`, introspecting it on first use.
    ///
    /// The cache lock is not held while `DESCRIBE` runs. When two callers
    /// miss at once, the first descriptor stored is the one both get.
    pub async fn resolve(
        &self,
        executor: &QueryExecutor<'_>,
        table: &str,
    ) -> JsonResult<Arc<TableDescriptor>> {
        if let Some(descriptor) = self.cached(table).await {
            debug!(table, "schema cache hit");
            return Ok(descriptor);
        }

        debug!(table, "schema cache miss");
        let descriptor = Arc::new(self.introspect(executor, table).await?);
        let mut entries = self.entries.write().await;
        Ok(entries
            .entry(table.to_string())
            .or_insert(descriptor)
            .clone())
    }

    /// Drop the entry for `table` and introspect it again.
    pub async fn refresh(
        &self,
        executor: &QueryExecutor<'_>,
        table: &str,
    ) -> JsonResult<Arc<TableDescriptor>> {
        self.invalidate(table).await;
        self.resolve(executor, table).await
    }

    /// Drop the entry for `table`. Returns whether one was cached.
    pub async fn invalidate(&self, table: &str) -> bool {
        self.entries.write().await.remove(table).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn cached(&self, table: &str) -> Option<Arc<TableDescriptor>> {
        self.entries.read().await.get(table).cloned()
    }

    async fn introspect(
        &self,
        executor: &QueryExecutor<'_>,
        table: &str,
    ) -> JsonResult<TableDescriptor> {
        let statement = RowCodec::new(executor.session()).describe(table);
        let result = match executor.query(&statement).await {
            Ok(result) => result,
            Err(JsonError::StatementFailure {
                source: DbError::TableNotFound(_),
                ..
            }) => return Err(JsonError::SchemaNotFound(table.to_string())),
            Err(err) => return Err(err),
        };

        let columns = describe_columns(&result);
        if columns.is_empty() {
            return Err(JsonError::SchemaNotFound(table.to_string()));
        }

        let descriptor = TableDescriptor::from_columns(
            table,
            columns,
            self.sort_column.as_deref(),
            self.json_column.as_deref(),
        );
        info!(
            table,
            columns = descriptor.columns().len(),
            sort_column = ?descriptor.sort_column(),
            json_column = ?descriptor.json_column(),
            "introspected table"
        );
        Ok(descriptor)
    }
}

/// Columns listed by `DESCRIBE`, read from its `Field` and `Type` columns.
fn describe_columns(result: &QueryResult) -> Vec<Column> {
    result
        .records()
        .filter_map(|record| {
            let name = record.get("Field").and_then(|v| v.as_str());
            let sql_type = record.get("Type").and_then(|v| v.as_str());
            match (name, sql_type) {
                (Some(name), Some(sql_type)) => Some(Column::new(name, sql_type)),
                _ => {
                    warn!("skipping DESCRIBE row without Field/Type");
                    None
                }
            }
        })
        .collect()
}
