pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{Column, ColumnType, Row, ValueKind};
pub use value::Value;
