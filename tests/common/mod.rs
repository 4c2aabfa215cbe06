//! In-memory MySQL-flavoured session for integration tests.
//!
//! Understands exactly the statement shapes the adapter renders:
//! `DESCRIBE`, `SELECT`, `INSERT`, `UPDATE`, `DELETE` with equality / `IS
//! NULL` terms combined by `AND`, `OR` and parentheses, plus `START
//! TRANSACTION`, `COMMIT` and `ROLLBACK` (snapshot and restore). Statements are tokenized with sqlparser's MySQL
//! tokenizer so literal escaping is checked the way a server would.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlparser::dialect::MySqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Word};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tabledoc::{
    DbError, Document, JsonStorageAdapter, JsonStorageConfig, QueryResult, Result, Session, Value,
};

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<(String, String)>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    fn index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|(name, _)| name == column)
            .ok_or_else(|| DbError::ColumnNotFound(column.to_string(), "table".to_string()))
    }

    fn matching(&self, filter: &Condition) -> Result<Vec<usize>> {
        filter.check(self)?;
        let mut indices = Vec::new();
        for (i, row) in self.rows.iter().enumerate() {
            if filter.holds(self, row)? {
                indices.push(i);
            }
        }
        Ok(indices)
    }
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, Table>,
    snapshot: Option<BTreeMap<String, Table>>,
    log: Vec<String>,
    failures: Vec<String>,
}

#[derive(Default)]
pub struct MemorySession {
    state: Mutex<State>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, columns: &[(&str, &str)]) -> Self {
        self.create_table(name, columns);
        self
    }

    pub fn create_table(&self, name: &str, columns: &[(&str, &str)]) {
        let table = Table {
            columns: columns
                .iter()
                .map(|(c, t)| (c.to_string(), t.to_string()))
                .collect(),
            rows: Vec::new(),
        };
        self.state.lock().unwrap().tables.insert(name.to_string(), table);
    }

    /// `ALTER TABLE .. ADD COLUMN`; existing rows get NULL.
    pub fn add_column(&self, table: &str, name: &str, sql_type: &str) {
        let mut state = self.state.lock().unwrap();
        let table = state.tables.get_mut(table).unwrap();
        table.columns.push((name.to_string(), sql_type.to_string()));
        for row in &mut table.rows {
            row.push(Value::Null);
        }
    }

    /// Store a row as-is, bypassing statement parsing.
    pub fn insert_raw(&self, table: &str, row: Vec<Value>) {
        let mut state = self.state.lock().unwrap();
        state.tables.get_mut(table).unwrap().rows.push(row);
    }

    /// One column of every row, in storage order.
    pub fn column(&self, table: &str, column: &str) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        let table = &state.tables[table];
        let i = table.index(column).unwrap();
        table.rows.iter().map(|row| row[i].clone()).collect()
    }

    /// Raw value of `column` in the row whose `key` column equals `key_value`.
    pub fn cell(&self, table: &str, key: &str, key_value: &str, column: &str) -> Value {
        let state = self.state.lock().unwrap();
        let table = &state.tables[table];
        let (k, c) = (table.index(key).unwrap(), table.index(column).unwrap());
        table
            .rows
            .iter()
            .find(|row| row[k].to_string() == key_value)
            .map(|row| row[c].clone())
            .unwrap()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state.lock().unwrap().tables[table].rows.len()
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.state.lock().unwrap().failures.push(pattern.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().unwrap().log.clear();
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|s| s.starts_with(prefix)).count()
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().unwrap().snapshot.is_some()
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn query(&self, sql: &str) -> Result<QueryResult> {
        // let concurrent callers interleave between statements
        tokio::task::yield_now().await;

        let mut state = self.state.lock()?;
        state.log.push(sql.to_string());
        if state.failures.iter().any(|pattern| sql.contains(pattern.as_str())) {
            return Err(DbError::ExecutionError(format!("injected failure: {}", sql)));
        }
        let statement = Parser::new(sql)?.statement()?;
        state.apply(statement)
    }
}

impl State {
    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))
    }

    fn apply(&mut self, statement: Statement) -> Result<QueryResult> {
        match statement {
            Statement::Describe(name) => {
                let table = self.table(&name)?;
                let rows = table
                    .columns
                    .iter()
                    .map(|(c, t)| vec![Value::from(c.as_str()), Value::from(t.as_str()), Value::from("YES")])
                    .collect();
                Ok(QueryResult::new(
                    vec!["Field".into(), "Type".into(), "Null".into()],
                    rows,
                ))
            }
            Statement::Select {
                table,
                columns,
                filter,
                order,
            } => {
                let table = self.table(&table)?;
                let mut selected: Vec<&Vec<Value>> = table
                    .matching(&filter)?
                    .into_iter()
                    .map(|i| &table.rows[i])
                    .collect();
                if let Some((column, descending)) = order {
                    let i = table.index(&column)?;
                    selected.sort_by(|a, b| compare(&a[i], &b[i]));
                    if descending {
                        selected.reverse();
                    }
                }

                let names = match columns {
                    Some(names) => names,
                    None => table.columns.iter().map(|(c, _)| c.clone()).collect(),
                };
                let indices = names
                    .iter()
                    .map(|name| table.index(name))
                    .collect::<Result<Vec<_>>>()?;
                let rows = selected
                    .into_iter()
                    .map(|row| indices.iter().map(|i| row[*i].clone()).collect())
                    .collect();
                Ok(QueryResult::new(names, rows))
            }
            Statement::Insert {
                table,
                columns,
                values,
            } => {
                let table = self.table_mut(&table)?;
                if columns.len() != values.len() {
                    return Err(DbError::ExecutionError("column count mismatch".into()));
                }
                let mut row = vec![Value::Null; table.columns.len()];
                for (column, literal) in columns.iter().zip(values) {
                    let i = table.index(column)?;
                    row[i] = literal.store(&table.columns[i].1);
                }
                table.rows.push(row);
                Ok(QueryResult::empty())
            }
            Statement::Update {
                table,
                assignments,
                filter,
            } => {
                let table = self.table_mut(&table)?;
                let targets = table.matching(&filter)?;
                let resolved = assignments
                    .into_iter()
                    .map(|(column, literal)| Ok((table.index(&column)?, literal)))
                    .collect::<Result<Vec<_>>>()?;
                for row in targets {
                    for (i, literal) in &resolved {
                        let value = literal.store(&table.columns[*i].1);
                        table.rows[row][*i] = value;
                    }
                }
                Ok(QueryResult::empty())
            }
            Statement::Delete { table, filter } => {
                let table = self.table_mut(&table)?;
                let targets = table.matching(&filter)?;
                let mut index = 0;
                table.rows.retain(|_| {
                    let keep = !targets.contains(&index);
                    index += 1;
                    keep
                });
                Ok(QueryResult::empty())
            }
            Statement::Begin => {
                self.snapshot = Some(self.tables.clone());
                Ok(QueryResult::empty())
            }
            Statement::Commit => {
                self.snapshot = None;
                Ok(QueryResult::empty())
            }
            Statement::Rollback => {
                if let Some(snapshot) = self.snapshot.take() {
                    self.tables = snapshot;
                }
                Ok(QueryResult::empty())
            }
        }
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[derive(Debug, Clone)]
enum Literal {
    Null,
    Text(String),
    Number(String),
}

impl Literal {
    /// Convert to the representation a column of `sql_type` keeps.
    fn store(&self, sql_type: &str) -> Value {
        let text = match self {
            Literal::Null => return Value::Null,
            Literal::Text(text) | Literal::Number(text) => text,
        };
        let sql_type = sql_type.to_ascii_lowercase();
        if sql_type.contains("int") {
            if let Ok(i) = text.trim().parse::<i64>() {
                return Value::Integer(i);
            }
        } else if sql_type.contains("float") || sql_type.contains("double") {
            if let Ok(f) = text.trim().parse::<f64>() {
                return Value::Float(f);
            }
        }
        Value::Text(text.clone())
    }
}

#[derive(Debug)]
enum Term {
    Equals(String, Literal),
    IsNull(String),
}

impl Term {
    fn column(&self) -> &str {
        match self {
            Term::Equals(column, _) | Term::IsNull(column) => column,
        }
    }

    fn holds(&self, value: &Value) -> bool {
        match self {
            Term::IsNull(_) => value.is_null(),
            Term::Equals(_, Literal::Null) => false,
            Term::Equals(_, Literal::Text(text) | Literal::Number(text)) => match value {
                Value::Null => false,
                Value::Text(stored) => stored == text,
                other => match (other.as_f64(), text.trim().parse::<f64>()) {
                    (Some(a), Ok(b)) => a == b,
                    _ => other.to_string() == *text,
                },
            },
        }
    }
}

#[derive(Debug)]
enum Condition {
    All,
    Term(Term),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    /// Fails on unknown columns even when no row is evaluated.
    fn check(&self, table: &Table) -> Result<()> {
        match self {
            Condition::All => Ok(()),
            Condition::Term(term) => table.index(term.column()).map(|_| ()),
            Condition::And(parts) | Condition::Or(parts) => {
                parts.iter().try_for_each(|part| part.check(table))
            }
        }
    }

    fn holds(&self, table: &Table, row: &[Value]) -> Result<bool> {
        match self {
            Condition::All => Ok(true),
            Condition::Term(term) => Ok(term.holds(&row[table.index(term.column())?])),
            Condition::And(parts) => {
                for part in parts {
                    if !part.holds(table, row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Or(parts) => {
                for part in parts {
                    if part.holds(table, row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

#[derive(Debug)]
enum Statement {
    Describe(String),
    Select {
        table: String,
        columns: Option<Vec<String>>,
        filter: Condition,
        order: Option<(String, bool)>,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Literal>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Literal)>,
        filter: Condition,
    },
    Delete {
        table: String,
        filter: Condition,
    },
    Begin,
    Commit,
    Rollback,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn parse_error(message: impl Into<String>) -> DbError {
    DbError::ParseError(message.into())
}

impl Parser {
    fn new(sql: &str) -> Result<Self> {
        let dialect = MySqlDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| parse_error(e.to_string()))?
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
            .collect();
        Ok(Self { tokens, pos: 0 })
    }

    fn statement(mut self) -> Result<Statement> {
        let statement = if self.eat_keyword("DESCRIBE") {
            Statement::Describe(self.ident()?)
        } else if self.eat_keyword("SELECT") {
            self.select()?
        } else if self.eat_keyword("INSERT") {
            self.insert()?
        } else if self.eat_keyword("UPDATE") {
            self.update()?
        } else if self.eat_keyword("DELETE") {
            self.expect_keyword("FROM")?;
            let table = self.ident()?;
            Statement::Delete {
                table,
                filter: self.filter()?,
            }
        } else if self.eat_keyword("START") {
            self.expect_keyword("TRANSACTION")?;
            Statement::Begin
        } else if self.eat_keyword("COMMIT") {
            Statement::Commit
        } else if self.eat_keyword("ROLLBACK") {
            Statement::Rollback
        } else {
            return Err(parse_error(format!("unsupported statement: {:?}", self.peek())));
        };

        match self.peek() {
            None => Ok(statement),
            Some(token) => Err(parse_error(format!("unexpected trailing token {:?}", token))),
        }
    }

    fn select(&mut self) -> Result<Statement> {
        let columns = if self.eat(&Token::Mul) {
            None
        } else {
            Some(self.ident_list()?)
        };
        self.expect_keyword("FROM")?;
        let table = self.ident()?;
        let filter = self.filter()?;

        let mut order = None;
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let column = self.ident()?;
            let descending = if self.eat_keyword("DESC") {
                true
            } else {
                self.eat_keyword("ASC");
                false
            };
            order = Some((column, descending));
        }
        if self.eat_keyword("FOR") {
            self.expect_keyword("UPDATE")?;
        }

        Ok(Statement::Select {
            table,
            columns,
            filter,
            order,
        })
    }

    fn insert(&mut self) -> Result<Statement> {
        self.expect_keyword("INTO")?;
        let table = self.ident()?;
        self.expect(&Token::LParen)?;
        let columns = self.ident_list()?;
        self.expect(&Token::RParen)?;
        self.expect_keyword("VALUES")?;
        self.expect(&Token::LParen)?;
        let mut values = vec![self.literal()?];
        while self.eat(&Token::Comma) {
            values.push(self.literal()?);
        }
        self.expect(&Token::RParen)?;
        Ok(Statement::Insert {
            table,
            columns,
            values,
        })
    }

    fn update(&mut self) -> Result<Statement> {
        let table = self.ident()?;
        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.ident()?;
            self.expect(&Token::Eq)?;
            assignments.push((column, self.literal()?));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(Statement::Update {
            table,
            assignments,
            filter: self.filter()?,
        })
    }

    fn filter(&mut self) -> Result<Condition> {
        if !self.eat_keyword("WHERE") {
            return Ok(Condition::All);
        }
        self.disjunction()
    }

    // AND binds tighter than OR, as in SQL.
    fn disjunction(&mut self) -> Result<Condition> {
        let mut parts = vec![self.conjunction()?];
        while self.eat_keyword("OR") {
            parts.push(self.conjunction()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Condition::Or(parts)
        })
    }

    fn conjunction(&mut self) -> Result<Condition> {
        let mut parts = vec![self.primary()?];
        while self.eat_keyword("AND") {
            parts.push(self.primary()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Condition::And(parts)
        })
    }

    fn primary(&mut self) -> Result<Condition> {
        if self.eat(&Token::LParen) {
            let inner = self.disjunction()?;
            self.expect(&Token::RParen)?;
            return Ok(inner);
        }
        let column = self.ident()?;
        if self.eat_keyword("IS") {
            self.expect_keyword("NULL")?;
            Ok(Condition::Term(Term::IsNull(column)))
        } else {
            self.expect(&Token::Eq)?;
            Ok(Condition::Term(Term::Equals(column, self.literal()?)))
        }
    }

    fn ident_list(&mut self) -> Result<Vec<String>> {
        let mut idents = vec![self.ident()?];
        while self.eat(&Token::Comma) {
            idents.push(self.ident()?);
        }
        Ok(idents)
    }

    fn literal(&mut self) -> Result<Literal> {
        match self.next() {
            Some(Token::SingleQuotedString(text)) | Some(Token::DoubleQuotedString(text)) => {
                Ok(Literal::Text(text))
            }
            Some(Token::Number(number, _)) => Ok(Literal::Number(number)),
            Some(Token::Minus) => match self.next() {
                Some(Token::Number(number, _)) => Ok(Literal::Number(format!("-{}", number))),
                other => Err(parse_error(format!("expected a number, got {:?}", other))),
            },
            Some(Token::Word(word)) if is_keyword(&word, "NULL") => Ok(Literal::Null),
            other => Err(parse_error(format!("expected a literal, got {:?}", other))),
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Word(word)) => Ok(word.value),
            other => Err(parse_error(format!("expected an identifier, got {:?}", other))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(parse_error(format!("expected {:?}, got {:?}", expected, self.peek())))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Word(word)) if is_keyword(word, keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(parse_error(format!("expected {}, got {:?}", keyword, self.peek())))
        }
    }
}

fn is_keyword(word: &Word, keyword: &str) -> bool {
    word.quote_style.is_none() && word.value.eq_ignore_ascii_case(keyword)
}

// ============================================================================
// Fixtures
// ============================================================================

/// `mytable (n int, name text, age int, json text)`.
pub fn mytable() -> Arc<MemorySession> {
    Arc::new(MemorySession::new().with_table(
        "mytable",
        &[
            ("n", "int(11)"),
            ("name", "text"),
            ("age", "int(11)"),
            ("json", "text"),
        ],
    ))
}

pub fn adapter(session: Arc<MemorySession>) -> JsonStorageAdapter {
    JsonStorageAdapter::new(
        session,
        JsonStorageConfig::new().sort_column("n").json_column("json"),
    )
}

pub fn doc(value: JsonValue) -> Document {
    match value {
        JsonValue::Object(map) => map,
        other => panic!("expected an object, got {}", other),
    }
}

/// `field` of every document, in read order.
pub async fn field(adapter: &JsonStorageAdapter, table: &str, clause: &str, field: &str) -> Vec<JsonValue> {
    adapter
        .read_documents(table, clause)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.get(field).cloned().unwrap_or(JsonValue::Null))
        .collect()
}

/// Sort column values of the rows in `clause`, sorted.
pub fn sorted_positions(session: &MemorySession, table: &str, key: &str, key_value: &str) -> Vec<i64> {
    let keys = session.column(table, key);
    let mut positions: Vec<i64> = session
        .column(table, "n")
        .into_iter()
        .zip(keys)
        .filter(|(_, k)| k.to_string() == key_value)
        .filter_map(|(p, _)| p.as_exact_i64())
        .collect();
    positions.sort_unstable();
    positions
}
