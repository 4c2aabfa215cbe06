use super::error::JsonResult;
use serde::Deserialize;

/// Configuration for [`JsonStorageAdapter`](super::JsonStorageAdapter)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JsonStorageConfig {
    /// Integer column holding the dense row order
    pub sort_column: Option<String>,
    /// Text column holding fields that have no typed column
    pub json_column: Option<String>,
    /// Wrap every mutation in one session transaction
    pub transactional: bool,
    /// Lock scanned rows with `FOR UPDATE` inside a transaction
    pub lock_rows: bool,
    /// Validate table names, filter columns and caller clauses
    pub validate_input: bool,
}

impl Default for JsonStorageConfig {
    fn default() -> Self {
        Self {
            sort_column: None,
            json_column: None,
            transactional: true,
            lock_rows: true,
            validate_input: true,
        }
    }
}

impl JsonStorageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from JSON text; missing keys keep their defaults.
    pub fn from_json(text: &str) -> JsonResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn sort_column(mut self, column: impl Into<String>) -> Self {
        self.sort_column = Some(column.into());
        self
    }

    pub fn json_column(mut self, column: impl Into<String>) -> Self {
        self.json_column = Some(column.into());
        self
    }

    pub fn transactional(mut self, enabled: bool) -> Self {
        self.transactional = enabled;
        self
    }

    pub fn lock_rows(mut self, enabled: bool) -> Self {
        self.lock_rows = enabled;
        self
    }

    pub fn validate_input(mut self, enabled: bool) -> Self {
        self.validate_input = enabled;
        self
    }

    /// Whether scans inside a mutation should take row locks.
    pub(crate) fn locking(&self) -> bool {
        self.transactional && self.lock_rows
    }
}
