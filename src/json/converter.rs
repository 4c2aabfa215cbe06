//! Statement rendering
//!
//! Turns descriptors, documents and planned position shifts into SQL text
//! using the Builder pattern. Identifiers are backtick-quoted and literals
//! are escaped through the session, so nothing here knows which driver
//! sits underneath.

use super::position::PositionShift;
use crate::interface::Session;
use serde_json::{Map, Value as JsonValue};

/// Sort direction of a position scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn keyword(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// The table and caller clause an operation is confined to.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub table: &'a str,
    pub clause: &'a str,
}

impl<'a> Scope<'a> {
    pub fn new(table: &'a str, clause: &'a str) -> Self {
        Self { table, clause }
    }

    /// The caller clause narrowed by `condition`, if any.
    ///
    /// An empty clause gets its own `WHERE`. Otherwise the clause body is
    /// parenthesized before the condition is appended with `AND`, so an
    /// `OR` inside it cannot widen the narrowed selection.
    pub fn filter(&self, condition: Option<&str>) -> String {
        let clause = self.clause.trim();
        match (clause.is_empty(), condition) {
            (_, None) => clause.to_string(),
            (true, Some(cond)) => format!("WHERE {}", cond),
            (false, Some(cond)) => match where_body(clause) {
                Some(body) => format!("WHERE ({}) AND {}", body, cond),
                None => format!("{} AND {}", clause, cond),
            },
        }
    }
}

/// What follows a leading `WHERE` keyword.
fn where_body(clause: &str) -> Option<&str> {
    let head = clause.get(..5)?;
    let rest = &clause[5..];
    let boundary = rest
        .chars()
        .next()
        .is_some_and(|c| c.is_whitespace() || c == '(');
    (head.eq_ignore_ascii_case("where") && boundary).then(|| rest.trim())
}

/// Builder for SELECT statements
pub struct SelectStatementBuilder {
    table_name: String,
    columns: Vec<String>,
    filter: String,
    order_by: Option<(String, Order)>,
    for_update: bool,
}

impl SelectStatementBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            filter: String::new(),
            order_by: None,
            for_update: false,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by = Some((column.into(), order));
        self
    }

    pub fn for_update(mut self, lock: bool) -> Self {
        self.for_update = lock;
        self
    }

    pub fn build(self) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {} FROM {}", columns, quote_ident(&self.table_name));
        push_fragment(&mut sql, &self.filter);
        if let Some((column, order)) = &self.order_by {
            sql.push_str(&format!(" ORDER BY {} {}", quote_ident(column), order.keyword()));
        }
        if self.for_update {
            sql.push_str(" FOR UPDATE");
        }
        sql
    }
}

/// Builder for INSERT statements
pub struct InsertStatementBuilder {
    table_name: String,
    values: Vec<(String, String)>,
}

impl InsertStatementBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            values: Vec::new(),
        }
    }

    /// Add a column with an already rendered literal.
    pub fn value(mut self, column: impl Into<String>, literal: impl Into<String>) -> Self {
        self.values.push((column.into(), literal.into()));
        self
    }

    pub fn values(mut self, values: Vec<(String, String)>) -> Self {
        self.values.extend(values);
        self
    }

    pub fn build(self) -> String {
        let (columns, literals): (Vec<_>, Vec<_>) = self
            .values
            .into_iter()
            .map(|(column, literal)| (quote_ident(&column), literal))
            .unzip();

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table_name),
            columns.join(", "),
            literals.join(", ")
        )
    }
}

/// Builder for UPDATE statements
pub struct UpdateStatementBuilder {
    table_name: String,
    set_clause: Vec<(String, String)>,
    filter: String,
}

impl UpdateStatementBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            set_clause: Vec::new(),
            filter: String::new(),
        }
    }

    /// Assign an already rendered literal to a column.
    pub fn set(mut self, column: impl Into<String>, literal: impl Into<String>) -> Self {
        self.set_clause.push((column.into(), literal.into()));
        self
    }

    pub fn set_multiple(mut self, updates: Vec<(String, String)>) -> Self {
        self.set_clause.extend(updates);
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn build(self) -> String {
        let set_parts: Vec<String> = self
            .set_clause
            .iter()
            .map(|(col, val)| format!("{} = {}", quote_ident(col), val))
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            quote_ident(&self.table_name),
            set_parts.join(", ")
        );
        push_fragment(&mut sql, &self.filter);
        sql
    }
}

/// Builder for DELETE statements
pub struct DeleteStatementBuilder {
    table_name: String,
    filter: String,
}

impl DeleteStatementBuilder {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            filter: String::new(),
        }
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn build(self) -> String {
        let mut sql = format!("DELETE FROM {}", quote_ident(&self.table_name));
        push_fragment(&mut sql, &self.filter);
        sql
    }
}

/// Renders the statements of every document operation.
///
/// Literal escaping is delegated to the session so the rules match the
/// server the statements run on.
pub struct RowCodec<'a> {
    session: &'a dyn Session,
}

impl<'a> RowCodec<'a> {
    pub fn new(session: &'a dyn Session) -> Self {
        Self { session }
    }

    pub fn text_literal(&self, text: &str) -> String {
        format!("'{}'", self.session.escape(text))
    }

    /// Literal for a value headed to a typed column.
    pub fn value_literal(&self, value: &JsonValue) -> String {
        match value {
            JsonValue::Null => "NULL".to_string(),
            JsonValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
            JsonValue::String(s) => self.text_literal(s),
            JsonValue::Number(n) => self.text_literal(&n.to_string()),
            JsonValue::Array(_) | JsonValue::Object(_) => self.text_literal(&value.to_string()),
        }
    }

    /// Literal holding a freeform payload as JSON text.
    pub fn payload_literal(&self, payload: &Map<String, JsonValue>) -> String {
        self.text_literal(&JsonValue::Object(payload.clone()).to_string())
    }

    /// `` `column` = literal ``, or `IS NULL` for a null value.
    pub fn equals(&self, column: &str, value: &JsonValue) -> String {
        match value {
            JsonValue::Null => format!("{} IS NULL", quote_ident(column)),
            _ => format!("{} = {}", quote_ident(column), self.value_literal(value)),
        }
    }

    /// Conjunction of equality tests for `(column, value)` pairs; `None`
    /// when there are no pairs.
    pub fn conjunction(&self, pairs: &[(String, JsonValue)]) -> Option<String> {
        if pairs.is_empty() {
            return None;
        }
        let parts: Vec<String> = pairs
            .iter()
            .map(|(column, value)| self.equals(column, value))
            .collect();
        Some(parts.join(" AND "))
    }

    pub fn position_condition(&self, sort_column: &str, position: i64) -> String {
        format!("{} = {}", quote_ident(sort_column), position)
    }

    pub fn describe(&self, table: &str) -> String {
        format!("DESCRIBE {}", quote_ident(table))
    }

    /// Every row in scope, in position order when there is a sort column.
    pub fn select_rows(&self, scope: &Scope<'_>, sort_column: Option<&str>) -> String {
        let builder = SelectStatementBuilder::new(scope.table).filter(scope.filter(None));
        match sort_column {
            Some(sort) => builder.order_by(sort, Order::Asc).build(),
            None => builder.build(),
        }
    }

    /// The positions of every row in scope.
    pub fn select_positions(
        &self,
        scope: &Scope<'_>,
        sort_column: &str,
        order: Order,
        lock: bool,
    ) -> String {
        SelectStatementBuilder::new(scope.table)
            .column(sort_column)
            .filter(scope.filter(None))
            .order_by(sort_column, order)
            .for_update(lock)
            .build()
    }

    /// Rows in scope that also satisfy `condition`.
    pub fn select_matching(&self, scope: &Scope<'_>, condition: Option<&str>, lock: bool) -> String {
        SelectStatementBuilder::new(scope.table)
            .filter(scope.filter(condition))
            .for_update(lock)
            .build()
    }

    /// Move the row at `shift.from` to `shift.to`.
    pub fn shift(&self, scope: &Scope<'_>, sort_column: &str, shift: PositionShift) -> String {
        UpdateStatementBuilder::new(scope.table)
            .set(sort_column, shift.to.to_string())
            .filter(scope.filter(Some(&self.position_condition(sort_column, shift.from))))
            .build()
    }

    pub fn insert(&self, table: &str, values: Vec<(String, String)>) -> String {
        InsertStatementBuilder::new(table).values(values).build()
    }

    pub fn update(
        &self,
        scope: &Scope<'_>,
        condition: Option<&str>,
        assignments: Vec<(String, String)>,
    ) -> String {
        UpdateStatementBuilder::new(scope.table)
            .set_multiple(assignments)
            .filter(scope.filter(condition))
            .build()
    }

    pub fn delete(&self, scope: &Scope<'_>, condition: Option<&str>) -> String {
        DeleteStatementBuilder::new(scope.table)
            .filter(scope.filter(condition))
            .build()
    }
}

fn push_fragment(sql: &mut String, fragment: &str) {
    if !fragment.is_empty() {
        sql.push(' ');
        sql.push_str(fragment);
    }
}

/// Backtick-quote an identifier, doubling embedded backticks.
pub fn quote_ident(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}
