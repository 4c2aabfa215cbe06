//! JSON Storage Adapter
//!
//! Main facade providing the document API over one SQL table at a time.
//! Each operation resolves the table descriptor, identifies the affected
//! row, plans value and position changes, renders the statements and runs
//! them in order.

use super::coercion::{self, Document};
use super::config::JsonStorageConfig;
use super::converter::{Order, RowCodec, Scope};
use super::error::{JsonError, JsonResult};
use super::executor::QueryExecutor;
use super::position::{self, OutOfRange, PositionShift};
use super::schema::{SchemaCache, TableDescriptor};
use super::selector::RowSelector;
use super::validator::{ClauseValidator, validate_identifier};
use crate::core::Value;
use crate::interface::Session;
use crate::result::QueryResult;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// The row an operation resolved to.
struct Target {
    /// Condition that narrows the clause to this row, if the clause alone
    /// does not already select exactly it.
    condition: Option<String>,
    /// Its position, when the table has a sort column.
    position: Option<i64>,
    /// Its stored freeform payload.
    payload: Document,
}

/// JSON Storage Adapter - Facade for document operations
///
/// `clause` arguments are raw filter fragments spliced into every statement.
/// They must be empty (all rows) or start with `WHERE`; positions are
/// counted within the rows the clause selects.
///
/// All operations share one session, and a session holds at most one open
/// transaction. With `transactional` on, mutations therefore run one at a
/// time across every table, and reads wait for the running mutation to
/// finish. Without transactions only mutations of the same table are
/// serialized.
///
/// # Example
/// ```ignore
/// let config = JsonStorageConfig::new().sort_column("n").json_column("json");
/// let adapter = JsonStorageAdapter::new(session, config);
///
/// adapter.insert_row("mytable", "", -1, r#"{"name": "John", "state": "NY"}"#).await?;
/// adapter.move_row("mytable", "", 0, 1).await?;
/// let rows = adapter.read_rows("mytable", "").await?;
/// ```
pub struct JsonStorageAdapter {
    session: Arc<dyn Session>,
    schema: SchemaCache,
    validator: ClauseValidator,
    config: JsonStorageConfig,
    /// Held exclusively for the lifetime of a session transaction.
    session_lock: RwLock<()>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl JsonStorageAdapter {
    pub fn new(session: Arc<dyn Session>, config: JsonStorageConfig) -> Self {
        Self {
            session,
            schema: SchemaCache::new(config.sort_column.clone(), config.json_column.clone()),
            validator: ClauseValidator::new(),
            config,
            session_lock: RwLock::new(()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &JsonStorageConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    /// The cached descriptor for `table`.
    pub async fn describe(&self, table: &str) -> JsonResult<Arc<TableDescriptor>> {
        self.check_table(table)?;
        self.schema.resolve(&self.executor(), table).await
    }

    /// Forget the cached descriptor for `table` and introspect it again.
    /// Needed after the table has been altered.
    pub async fn refresh_schema(&self, table: &str) -> JsonResult<Arc<TableDescriptor>> {
        self.check_table(table)?;
        self.schema.refresh(&self.executor(), table).await
    }

    pub async fn clear_schema(&self) {
        self.schema.clear().await;
    }

    /// Every row in `clause` as a JSON array of documents, in position
    /// order when the table has a sort column.
    pub async fn read_rows(&self, table: &str, clause: &str) -> JsonResult<String> {
        let documents = self.read_documents(table, clause).await?;
        Ok(serde_json::to_string(&documents)?)
    }

    pub async fn read_documents(&self, table: &str, clause: &str) -> JsonResult<Vec<Document>> {
        self.check_clause(clause)?;
        let descriptor = self.describe(table).await?;
        let scope = Scope::new(table, clause);

        let statement = self.codec().select_rows(&scope, descriptor.sort_column());
        let result = {
            let _guard = if self.config.transactional {
                Some(self.session_lock.read().await)
            } else {
                None
            };
            self.executor().query(&statement).await?
        };
        Ok(result
            .records()
            .map(|record| coercion::decode_row(&record, &descriptor))
            .collect())
    }

    /// Typed column names mapped to their default placeholder values, as a
    /// JSON object.
    pub async fn read_description(&self, table: &str) -> JsonResult<String> {
        let descriptor = self.describe(table).await?;
        Ok(JsonValue::Object(descriptor.defaults()).to_string())
    }

    /// Insert a document given as JSON text before `position`; `-1`
    /// appends.
    pub async fn insert_row(
        &self,
        table: &str,
        clause: &str,
        position: i64,
        document: &str,
    ) -> JsonResult<()> {
        let document = parse_document(document)?;
        self.insert_document(table, clause, position, &document).await
    }

    /// Insert a document before `position`; `-1` appends.
    ///
    /// Typed columns the document leaves out are written with their
    /// default placeholder, so a document meant for a scoped clause must
    /// carry the fields that scope it.
    pub async fn insert_document(
        &self,
        table: &str,
        clause: &str,
        position: i64,
        document: &Document,
    ) -> JsonResult<()> {
        self.check_clause(clause)?;
        let descriptor = self.describe(table).await?;
        let scope = Scope::new(table, clause);
        self.atomically(table, self.apply_insert(&descriptor, &scope, position, document))
            .await
    }

    /// Delete the selected row and close the gap it leaves.
    pub async fn delete_row(
        &self,
        table: &str,
        clause: &str,
        selector: impl Into<RowSelector>,
    ) -> JsonResult<()> {
        let selector = selector.into();
        self.check_clause(clause)?;
        let descriptor = self.describe(table).await?;
        let scope = Scope::new(table, clause);
        self.atomically(table, self.apply_delete(&descriptor, &scope, &selector))
            .await
    }

    /// Merge a partial document given as JSON text into the selected row.
    pub async fn update_row(
        &self,
        table: &str,
        clause: &str,
        selector: impl Into<RowSelector>,
        document: &str,
    ) -> JsonResult<()> {
        let document = parse_document(document)?;
        self.update_document(table, clause, selector, &document).await
    }

    /// Merge a partial document into the selected row.
    ///
    /// Fields fitting a typed column overwrite it; the rest are merged into
    /// the stored freeform payload, keeping its other keys.
    pub async fn update_document(
        &self,
        table: &str,
        clause: &str,
        selector: impl Into<RowSelector>,
        document: &Document,
    ) -> JsonResult<()> {
        let selector = selector.into();
        self.check_clause(clause)?;
        let descriptor = self.describe(table).await?;
        let scope = Scope::new(table, clause);
        self.atomically(table, self.apply_update(&descriptor, &scope, &selector, document))
            .await
    }

    /// Move the row at `from` so it ends up at `to`, shifting the rows in
    /// between by one. Does nothing when the table has no sort column.
    pub async fn move_row(&self, table: &str, clause: &str, from: i64, to: i64) -> JsonResult<()> {
        self.check_clause(clause)?;
        let descriptor = self.describe(table).await?;
        let Some(sort) = descriptor.sort_column() else {
            debug!(table, "no sort column, move ignored");
            return Ok(());
        };
        if from == to {
            return Ok(());
        }
        let scope = Scope::new(table, clause);
        self.atomically(table, self.apply_move(&scope, sort, from, to))
            .await
    }

    // ==================== Operation Steps ====================

    async fn apply_insert(
        &self,
        descriptor: &TableDescriptor,
        scope: &Scope<'_>,
        position: i64,
        document: &Document,
    ) -> JsonResult<()> {
        let table = scope.table;
        let codec = self.codec();

        let placed = match descriptor.sort_column() {
            Some(sort) => {
                let positions = self.positions(scope, sort, Order::Desc).await?;
                let plan = position::plan_insert(&positions, position)
                    .map_err(|err| out_of_range(table, err, positions.len()))?;
                self.shift(scope, sort, &plan.shifts).await?;
                Some((sort, plan.position))
            }
            None => None,
        };

        let split = coercion::split_document(descriptor, Document::new(), document);
        let mut values: Vec<(String, String)> = descriptor
            .columns()
            .iter()
            .map(|column| {
                let literal = match split.typed_value(&column.name) {
                    Some(value) => codec.value_literal(value),
                    None => codec.value_literal(&column.default_value()),
                };
                (column.name.clone(), literal)
            })
            .collect();
        if let Some((sort, position)) = placed {
            values.push((sort.to_string(), position.to_string()));
        }
        match descriptor.json_column() {
            Some(json) => values.push((json.to_string(), codec.payload_literal(&split.freeform))),
            None => drop_freeform(table, &split.freeform),
        }

        self.executor().query(&codec.insert(table, values)).await?;
        info!(table, position = ?placed.map(|(_, p)| p), "inserted row");
        Ok(())
    }

    async fn apply_delete(
        &self,
        descriptor: &TableDescriptor,
        scope: &Scope<'_>,
        selector: &RowSelector,
    ) -> JsonResult<()> {
        let target = self.locate(descriptor, scope, selector).await?;
        let statement = self.codec().delete(scope, target.condition.as_deref());
        self.executor().query(&statement).await?;

        if let (Some(sort), Some(deleted)) = (descriptor.sort_column(), target.position) {
            let positions = self.positions(scope, sort, Order::Asc).await?;
            self.shift(scope, sort, &position::plan_delete(&positions, deleted))
                .await?;
        }
        info!(table = scope.table, position = ?target.position, "deleted row");
        Ok(())
    }

    async fn apply_update(
        &self,
        descriptor: &TableDescriptor,
        scope: &Scope<'_>,
        selector: &RowSelector,
        document: &Document,
    ) -> JsonResult<()> {
        let table = scope.table;
        let codec = self.codec();
        let target = self.locate(descriptor, scope, selector).await?;
        let split = coercion::split_document(descriptor, target.payload.clone(), document);

        let mut assignments: Vec<(String, String)> = split
            .typed
            .iter()
            .map(|(column, value)| (column.clone(), codec.value_literal(value)))
            .collect();
        match descriptor.json_column() {
            Some(json) if split.freeform != target.payload => {
                assignments.push((json.to_string(), codec.payload_literal(&split.freeform)));
            }
            Some(_) => {}
            None => drop_freeform(table, &split.freeform),
        }

        if assignments.is_empty() {
            debug!(table, "update has nothing to write");
            return Ok(());
        }

        let statement = codec.update(scope, target.condition.as_deref(), assignments);
        self.executor().query(&statement).await?;
        info!(table, position = ?target.position, "updated row");
        Ok(())
    }

    async fn apply_move(&self, scope: &Scope<'_>, sort: &str, from: i64, to: i64) -> JsonResult<()> {
        let positions = self.positions(scope, sort, Order::Asc).await?;
        let plan = position::plan_move(&positions, from, to)
            .map_err(|err| out_of_range(scope.table, err, positions.len()))?;
        if let Some(plan) = plan {
            self.shift(scope, sort, &plan.steps()).await?;
        }
        info!(table = scope.table, from, to, "moved row");
        Ok(())
    }

    // ==================== Private Helper Methods ====================

    fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(self.session.as_ref())
    }

    fn codec(&self) -> RowCodec<'_> {
        RowCodec::new(self.session.as_ref())
    }

    fn check_table(&self, table: &str) -> JsonResult<()> {
        if self.config.validate_input {
            validate_identifier(table)?;
        }
        Ok(())
    }

    fn check_clause(&self, clause: &str) -> JsonResult<()> {
        if self.config.validate_input {
            self.validator.validate(clause)?;
        }
        Ok(())
    }

    async fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run a mutation inside one transaction that is rolled back if any
    /// step fails, or, with transactions off, under the table lock alone.
    async fn atomically<T>(
        &self,
        table: &str,
        operation: impl Future<Output = JsonResult<T>>,
    ) -> JsonResult<T> {
        if !self.config.transactional {
            let lock = self.table_lock(table).await;
            let _guard = lock.lock().await;
            return operation.await;
        }

        // a rollback must never reach statements of another operation
        let _guard = self.session_lock.write().await;
        let executor = self.executor();
        executor.begin().await?;
        let result = match operation.await {
            Ok(value) => executor.commit().await.map(|_| value),
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            debug!(table, error = %err, "operation failed, rolling back");
            if let Err(rollback) = executor.rollback().await {
                warn!(table, error = %rollback, "rollback failed");
            }
        }
        result
    }

    /// Positions of every row in scope.
    async fn positions(&self, scope: &Scope<'_>, sort: &str, order: Order) -> JsonResult<Vec<i64>> {
        let statement = self
            .codec()
            .select_positions(scope, sort, order, self.config.locking());
        let result = self.executor().query(&statement).await?;
        result
            .records()
            .map(|record| {
                record
                    .get(sort)
                    .and_then(Value::as_exact_i64)
                    .ok_or_else(|| {
                        JsonError::InvalidStructure(format!(
                            "'{}' holds a non-integer value in {}",
                            sort, scope.table
                        ))
                    })
            })
            .collect()
    }

    async fn shift(&self, scope: &Scope<'_>, sort: &str, shifts: &[PositionShift]) -> JsonResult<()> {
        let codec = self.codec();
        let statements: Vec<String> = shifts
            .iter()
            .map(|shift| codec.shift(scope, sort, *shift))
            .collect();
        self.executor().run(&statements).await
    }

    /// Resolve a selector to exactly one row in scope.
    async fn locate(
        &self,
        descriptor: &TableDescriptor,
        scope: &Scope<'_>,
        selector: &RowSelector,
    ) -> JsonResult<Target> {
        let codec = self.codec();
        let condition = match (selector, descriptor.sort_column()) {
            (RowSelector::Position(position), Some(sort)) => {
                Some(codec.position_condition(sort, *position))
            }
            // Without a sort column the clause alone must pick the row.
            (RowSelector::Position(_), None) => None,
            (RowSelector::Filter(filter), _) => {
                let mut pairs = Vec::with_capacity(filter.len());
                for (field, value) in filter {
                    let column = coercion::column_name(descriptor, field);
                    if self.config.validate_input {
                        validate_identifier(column)?;
                    }
                    pairs.push((column.to_string(), value.clone()));
                }
                codec.conjunction(&pairs)
            }
        };

        let statement = codec.select_matching(scope, condition.as_deref(), self.config.locking());
        let result = self.executor().query(&statement).await?;
        let record = single_row(&result, scope.table)?;

        let position = match descriptor.sort_column() {
            Some(sort) => record.get(sort).and_then(Value::as_exact_i64),
            None => None,
        };
        let payload = match descriptor.json_column() {
            Some(json) => coercion::decode_payload(record.get(json)),
            None => Document::new(),
        };

        // Address the row by position where possible, so later statements
        // do not depend on filter values the update itself may change.
        let condition = match (descriptor.sort_column(), position) {
            (Some(sort), Some(position)) => Some(codec.position_condition(sort, position)),
            _ => condition,
        };

        Ok(Target {
            condition,
            position,
            payload,
        })
    }
}

fn single_row<'a>(result: &'a QueryResult, table: &str) -> JsonResult<crate::result::Record<'a>> {
    match result.row_count() {
        1 => result.record(0).ok_or_else(|| JsonError::AmbiguousRowSelection {
            table: table.to_string(),
            matches: 0,
        }),
        matches => Err(JsonError::AmbiguousRowSelection {
            table: table.to_string(),
            matches,
        }),
    }
}

fn parse_document(text: &str) -> JsonResult<Document> {
    match serde_json::from_str::<JsonValue>(text)? {
        JsonValue::Object(document) => Ok(document),
        other => Err(JsonError::InvalidStructure(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn out_of_range(table: &str, err: OutOfRange, len: usize) -> JsonError {
    JsonError::PositionOutOfRange {
        table: table.to_string(),
        position: err.position,
        len,
    }
}

fn drop_freeform(table: &str, freeform: &Document) {
    if !freeform.is_empty() {
        let fields: Vec<&str> = freeform.keys().map(String::as_str).collect();
        warn!(table, ?fields, "no freeform column, dropping fields");
    }
}
