use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::fmt;

use super::Value;

pub type Row = Vec<Value>;

lazy_static! {
    // MySQL reports BOOLEAN columns as tinyint(1); BIT without a width is BIT(1).
    static ref ONE_BIT_TYPE: Regex =
        Regex::new(r"(?i)^\s*(tinyint\s*\(\s*1\s*\)|bit(\s*\(\s*1\s*\))?|bool|boolean)(\s|$)")
            .expect("static regex");
}

/// Runtime type tag of a document value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Integer,
    Float,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(_) => Self::Boolean,
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            JsonValue::Number(_) => Self::Float,
            JsonValue::String(_) => Self::String,
            JsonValue::Array(_) => Self::Array,
            JsonValue::Object(_) => Self::Object,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

/// Coercion type of a typed column, derived from its declared SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    Text,
}

impl ColumnType {
    /// Classify a declared SQL type. The checks run in order, so
    /// `tinyint(1)` is a boolean before it is an integer.
    pub fn from_sql_type(sql_type: &str) -> Self {
        let lowered = sql_type.to_ascii_lowercase();
        if ONE_BIT_TYPE.is_match(&lowered) {
            Self::Boolean
        } else if lowered.contains("int") {
            Self::Integer
        } else if lowered.contains("float") || lowered.contains("double") {
            Self::Float
        } else {
            Self::Text
        }
    }

    /// Placeholder value whose JSON type stands for this column type.
    pub fn default_value(&self) -> JsonValue {
        match self {
            Self::Boolean => JsonValue::Bool(false),
            Self::Integer => JsonValue::from(0),
            Self::Float => JsonValue::from(0.0),
            Self::Text => JsonValue::String(String::new()),
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Boolean => ValueKind::Boolean,
            Self::Integer => ValueKind::Integer,
            Self::Float => ValueKind::Float,
            Self::Text => ValueKind::String,
        }
    }

    /// Whether a document value of `kind` may be written to this column.
    ///
    /// Same kind always fits, integers widen into float columns and text
    /// columns take anything in its string form. Everything else, null
    /// included, belongs in the freeform payload.
    pub fn accepts(&self, kind: ValueKind) -> bool {
        match (self, kind) {
            (Self::Text, _) => true,
            (Self::Float, ValueKind::Integer) => true,
            (column, kind) => column.kind() == kind,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

/// One typed column as discovered by introspection.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub sql_type: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let sql_type = sql_type.into();
        Self {
            name: name.into(),
            column_type: ColumnType::from_sql_type(&sql_type),
            sql_type,
        }
    }

    pub fn default_value(&self) -> JsonValue {
        self.column_type.default_value()
    }
}
