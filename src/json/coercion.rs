//! Type coercion between stored scalars and document values
//!
//! Reading decides, per column, how a raw scalar becomes a JSON value.
//! Writing decides, per document field, whether it goes to a typed column
//! or into the freeform payload.

use super::schema::TableDescriptor;
use crate::core::{ColumnType, Value, ValueKind};
use crate::result::Record;
use serde_json::{Map, Number, Value as JsonValue};
use tracing::warn;

/// A document: field name to value.
pub type Document = Map<String, JsonValue>;

/// Column name that documents see under an alias.
pub const RESERVED_COLUMN: &str = "class";
/// The alias documents use for [`RESERVED_COLUMN`].
pub const RESERVED_ALIAS: &str = "clazz";

/// The field name a column is exposed under.
pub fn field_name(column: &str) -> &str {
    if column == RESERVED_COLUMN {
        RESERVED_ALIAS
    } else {
        column
    }
}

/// The column a document field writes to.
///
/// `clazz` maps back to `class` only when the table really has a `class`
/// column and no `clazz` column of its own.
pub fn column_name<'a>(descriptor: &TableDescriptor, field: &'a str) -> &'a str {
    if field == RESERVED_ALIAS
        && descriptor.column(RESERVED_ALIAS).is_none()
        && descriptor.column(RESERVED_COLUMN).is_some()
    {
        RESERVED_COLUMN
    } else {
        field
    }
}

/// Decode one stored scalar.
///
/// Boolean detection runs before integer detection since both look at the
/// same integer-shaped text.
pub fn decode_column(raw: &Value, column_type: Option<ColumnType>) -> JsonValue {
    if raw.is_null() {
        return JsonValue::Null;
    }

    if let Some(i) = raw.as_integral_i64() {
        match column_type {
            Some(ColumnType::Boolean) => return JsonValue::Bool(i == 1),
            Some(ColumnType::Integer) => return JsonValue::from(i),
            _ => {}
        }
    }

    if column_type == Some(ColumnType::Float) {
        if let Some(number) = raw.as_f64().and_then(Number::from_f64) {
            return JsonValue::Number(number);
        }
    }

    match raw {
        Value::Text(text) => match serde_json::from_str::<JsonValue>(text) {
            Ok(parsed @ (JsonValue::Array(_) | JsonValue::Object(_))) => parsed,
            _ => JsonValue::String(text.clone()),
        },
        Value::Integer(i) => JsonValue::from(*i),
        Value::Float(f) => Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(f.to_string())),
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Null => JsonValue::Null,
    }
}

/// Parse a stored freeform payload. NULL, unparsable text and non-object
/// JSON all read as an empty payload.
pub fn decode_payload(raw: Option<&Value>) -> Document {
    let text = match raw {
        None | Some(Value::Null) => return Document::new(),
        Some(Value::Text(text)) => text.as_str(),
        Some(other) => {
            warn!(value = %other, "freeform column holds a non-text value; ignoring it");
            return Document::new();
        }
    };
    if text.trim().is_empty() {
        return Document::new();
    }
    match serde_json::from_str::<JsonValue>(text) {
        Ok(JsonValue::Object(payload)) => payload,
        Ok(_) => {
            warn!("freeform payload is not a JSON object; ignoring it");
            Document::new()
        }
        Err(err) => {
            warn!(error = %err, "freeform payload is not valid JSON; ignoring it");
            Document::new()
        }
    }
}

/// Turn one stored row into a document.
///
/// Typed columns come first; freeform fields are merged afterwards and win
/// on a name collision. The sort column is never part of the document.
pub fn decode_row(record: &Record<'_>, descriptor: &TableDescriptor) -> Document {
    let mut document = Document::new();
    for (column, raw) in record.iter() {
        if descriptor.is_sort_column(column) || descriptor.is_json_column(column) {
            continue;
        }
        let column_type = descriptor.column(column).map(|c| c.column_type);
        document.insert(field_name(column).to_string(), decode_column(raw, column_type));
    }

    if let Some(json_column) = descriptor.json_column() {
        document.extend(decode_payload(record.get(json_column)));
    }
    document
}

/// A document divided between typed columns and the freeform payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSplit {
    /// `(column, value)` pairs, in document order.
    pub typed: Vec<(String, JsonValue)>,
    pub freeform: Document,
}

impl DocumentSplit {
    pub fn typed_value(&self, column: &str) -> Option<&JsonValue> {
        self.typed
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

/// Whether `value` may be stored in the typed column `column`.
///
/// A column the descriptor does not know is never compatible.
pub fn is_compatible(descriptor: &TableDescriptor, column: &str, value: &JsonValue) -> bool {
    descriptor
        .column(column)
        .is_some_and(|c| c.column_type.accepts(ValueKind::of(value)))
}

/// Split a document for writing, starting from an existing payload.
///
/// Compatible fields become typed assignments and are dropped from the
/// payload; the rest are merged into it, leaving unrelated payload keys
/// untouched. Fields named after the sort or freeform column are skipped.
pub fn split_document(descriptor: &TableDescriptor, existing: Document, document: &Document) -> DocumentSplit {
    let mut split = DocumentSplit {
        typed: Vec::new(),
        freeform: existing,
    };

    for (field, value) in document {
        if descriptor.is_sort_column(field) || descriptor.is_json_column(field) {
            warn!(field = %field, table = %descriptor.table(), "ignoring field named after a reserved column");
            continue;
        }
        let column = column_name(descriptor, field);
        if is_compatible(descriptor, column, value) {
            split.freeform.remove(field);
            split.typed.push((column.to_string(), value.clone()));
        } else {
            split.freeform.insert(field.clone(), value.clone());
        }
    }
    split
}
