//! Input validation
//!
//! Table names and filter keys end up inside backtick-quoted identifiers,
//! and the caller's clause is spliced into every statement verbatim. Both
//! are checked here before any SQL is rendered.

use super::error::{JsonError, JsonResult};

const MAX_IDENTIFIER_LEN: usize = 64;

/// A rule applied to a caller-supplied clause.
pub trait ClauseRule: Send + Sync {
    fn check(&self, clause: &str) -> JsonResult<()>;
}

/// The clause must be empty or open with `WHERE`, because the adapter
/// composes extra conditions onto it with `AND`.
#[derive(Debug, Clone, Default)]
pub struct LeadingWhereRule;

impl ClauseRule for LeadingWhereRule {
    fn check(&self, clause: &str) -> JsonResult<()> {
        let trimmed = clause.trim_start();
        if trimmed.is_empty() {
            return Ok(());
        }
        let head = trimmed.get(..5).unwrap_or(trimmed);
        let boundary = trimmed[head.len()..]
            .chars()
            .next()
            .is_none_or(char::is_whitespace);
        if head.eq_ignore_ascii_case("where") && boundary {
            Ok(())
        } else {
            Err(JsonError::InvalidStructure(format!(
                "clause must be empty or start with WHERE: {}",
                clause
            )))
        }
    }
}

/// Rejects statement separators and comments, which would let a clause
/// escape the statement it is spliced into. Quoted literals and quoted
/// identifiers are skipped, so `WHERE tag = 'C#'` passes.
#[derive(Debug, Clone, Default)]
pub struct StatementBreakRule;

impl ClauseRule for StatementBreakRule {
    fn check(&self, clause: &str) -> JsonResult<()> {
        let mut chars = clause.chars().peekable();
        let mut quote: Option<char> = None;

        while let Some(c) = chars.next() {
            if let Some(open) = quote {
                if c == '\\' && open != '`' {
                    chars.next();
                } else if c == open {
                    quote = None;
                }
                continue;
            }

            let pattern = match (c, chars.peek()) {
                ('\'' | '"' | '`', _) => {
                    quote = Some(c);
                    continue;
                }
                (';', _) => ";",
                ('#', _) => "#",
                ('-', Some('-')) => "--",
                ('/', Some('*')) => "/*",
                ('*', Some('/')) => "*/",
                _ => continue,
            };
            return Err(JsonError::InvalidStructure(format!(
                "clause may not contain '{}'",
                pattern
            )));
        }

        match quote {
            // the rest of the statement would end up inside the literal
            Some(open) => Err(JsonError::InvalidStructure(format!(
                "clause has an unterminated {} quote",
                open
            ))),
            None => Ok(()),
        }
    }
}

/// Runs every clause rule in order, stopping at the first failure.
pub struct ClauseValidator {
    rules: Vec<Box<dyn ClauseRule>>,
}

impl ClauseValidator {
    pub fn new() -> Self {
        Self {
            rules: vec![Box::new(LeadingWhereRule), Box::new(StatementBreakRule)],
        }
    }

    pub fn validate(&self, clause: &str) -> JsonResult<()> {
        self.rules.iter().try_for_each(|rule| rule.check(clause))
    }
}

impl Default for ClauseValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates a table or column name.
pub fn validate_identifier(name: &str) -> JsonResult<()> {
    let Some(first) = name.chars().next() else {
        return Err(JsonError::InvalidIdentifier(
            "identifier cannot be empty".to_string(),
        ));
    };

    if !first.is_alphabetic() && first != '_' {
        return Err(JsonError::InvalidIdentifier(format!(
            "'{}' must start with a letter or underscore",
            name
        )));
    }

    if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
        return Err(JsonError::InvalidIdentifier(format!(
            "'{}' may only contain letters, digits, '_' and '$'",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(JsonError::InvalidIdentifier(format!(
            "'{}' is longer than {} characters",
            name, MAX_IDENTIFIER_LEN
        )));
    }

    Ok(())
}
