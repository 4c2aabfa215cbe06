use super::coercion::Document;
use super::error::{JsonError, JsonResult};
use serde_json::Value as JsonValue;

/// Identifies the single row an operation applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSelector {
    /// A value of the sort column. Without a sort column, the clause itself
    /// must select exactly one row.
    Position(i64),
    /// Field equalities that must match exactly one row in the clause.
    Filter(Document),
}

impl RowSelector {
    /// Parse an integer position or a filter object.
    pub fn from_json(text: &str) -> JsonResult<Self> {
        match serde_json::from_str::<JsonValue>(text)? {
            JsonValue::Number(n) => n.as_i64().map(RowSelector::Position).ok_or_else(|| {
                JsonError::InvalidStructure(format!("position must be an integer, got {}", n))
            }),
            JsonValue::Object(filter) => Ok(RowSelector::Filter(filter)),
            other => Err(JsonError::InvalidStructure(format!(
                "expected a position or a filter object, got {}",
                other
            ))),
        }
    }
}

impl From<i64> for RowSelector {
    fn from(position: i64) -> Self {
        RowSelector::Position(position)
    }
}

impl From<i32> for RowSelector {
    fn from(position: i32) -> Self {
        RowSelector::Position(i64::from(position))
    }
}

impl From<Document> for RowSelector {
    fn from(filter: Document) -> Self {
        RowSelector::Filter(filter)
    }
}
