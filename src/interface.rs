use async_trait::async_trait;
use crate::core::Result;
use crate::result::QueryResult;

/// The database session the document layer talks to.
///
/// Implement this for whatever driver the application already uses. Only
/// `query` is required; escaping and transaction control default to MySQL
/// behaviour expressed through `query`.
///
/// ```ignore
/// struct MySqlSession { pool: mysql_async::Pool }
///
/// #[async_trait]
/// impl Session for MySqlSession {
///     async fn query(&self, sql: &str) -> Result<QueryResult> {
///         // run `sql`, convert rows into QueryResult
///     }
/// }
/// ```
#[async_trait]
pub trait Session: Send + Sync {
    /// Execute one statement. Statements that return no rows yield an
    /// empty result.
    async fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Make `text` safe to place between single quotes.
    fn escape(&self, text: &str) -> String {
        escape_mysql_string(text)
    }

    async fn begin(&self) -> Result<()> {
        self.query("START TRANSACTION").await.map(|_| ())
    }

    async fn commit(&self) -> Result<()> {
        self.query("COMMIT").await.map(|_| ())
    }

    async fn rollback(&self) -> Result<()> {
        self.query("ROLLBACK").await.map(|_| ())
    }
}

/// Escape a string literal the way `mysql_real_escape_string` does.
pub fn escape_mysql_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\0' => escaped.push_str("\\0"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            '\x1a' => escaped.push_str("\\Z"),
            other => escaped.push(other),
        }
    }
    escaped
}
