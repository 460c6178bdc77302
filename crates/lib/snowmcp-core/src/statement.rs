//! SQL statement splitting, classification, and identifier hygiene.
//!
//! Statements arrive as free-form text from MCP clients. Before anything
//! reaches the warehouse the text is split on semicolons outside quotes and
//! comments, writes are told apart from reads, and every identifier that gets
//! interpolated into catalog queries is validated against Snowflake's
//! unquoted identifier rules.

use std::{error::Error, fmt};

/// Statement keywords that mutate state and therefore run inside an explicit
/// transaction.
const WRITE_PREFIXES: &[&str] = &["INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER"];

#[derive(Debug)]
pub enum StatementError {
    InvalidIdentifier(String),
}

impl fmt::Display for StatementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidIdentifier(name) => write!(f, "Invalid identifier: {name:?}"),
        }
    }
}

impl Error for StatementError {}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SplitState {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

/// Splits `command` into individual statements on semicolons.
///
/// Semicolons inside single- or double-quoted strings, `--` and `//` line
/// comments, and `/* */` block comments do not split. Empty fragments are
/// dropped, so a trailing semicolon yields no extra statement.
#[must_use]
pub fn split_statements(command: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = SplitState::Normal;
    let mut chars = command.chars().peekable();

    while let Some(ch) = chars.next() {
        if state == SplitState::Normal && ch == ';' {
            push_fragment(&mut statements, &mut current);
            continue;
        }
        current.push(ch);
        match state {
            SplitState::Normal => match ch {
                '\'' => state = SplitState::SingleQuoted,
                '"' => state = SplitState::DoubleQuoted,
                '-' if chars.peek() == Some(&'-') => {
                    current.push('-');
                    chars.next();
                    state = SplitState::LineComment;
                }
                '/' if chars.peek() == Some(&'/') => {
                    current.push('/');
                    chars.next();
                    state = SplitState::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    current.push('*');
                    chars.next();
                    state = SplitState::BlockComment;
                }
                _ => {}
            },
            SplitState::SingleQuoted if ch == '\'' => state = SplitState::Normal,
            SplitState::DoubleQuoted if ch == '"' => state = SplitState::Normal,
            SplitState::LineComment if ch == '\n' => state = SplitState::Normal,
            SplitState::BlockComment if ch == '*' && chars.peek() == Some(&'/') => {
                current.push('/');
                chars.next();
                state = SplitState::Normal;
            }
            _ => {}
        }
    }
    push_fragment(&mut statements, &mut current);
    statements
}

fn push_fragment(statements: &mut Vec<String>, current: &mut String) {
    let fragment = current.trim();
    if !fragment.is_empty() {
        statements.push(fragment.to_string());
    }
    current.clear();
}

/// Reports whether `statement` mutates warehouse state.
#[must_use]
pub fn is_write_statement(statement: &str) -> bool {
    let upper = statement.trim_start().to_uppercase();
    WRITE_PREFIXES.iter().any(|prefix| {
        upper.strip_prefix(prefix).is_some_and(|rest| {
            rest.chars().next().is_none_or(|ch| !ch.is_alphanumeric() && ch != '_')
        })
    })
}

/// Validates `name` as an unquoted Snowflake identifier and returns it.
///
/// Accepts a letter or underscore followed by letters, digits, underscores,
/// or dollar signs. Anything else is rejected, which keeps caller-supplied
/// names safe to interpolate into catalog queries.
///
/// # Errors
/// Returns [`StatementError::InvalidIdentifier`] when `name` does not match.
pub fn ensure_ident(name: &str) -> Result<&str, StatementError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|head| head.is_ascii_alphabetic() || head == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '$');
    if valid {
        Ok(name)
    } else {
        Err(StatementError::InvalidIdentifier(name.to_string()))
    }
}

/// Quotes `value` as a SQL string literal, escaping quotes and backslashes.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('\'');
    quoted
}

/// Quotes `name` as a double-quoted identifier.
///
/// Used for column names read back from the catalog, which may contain
/// characters an unquoted identifier cannot.
#[must_use]
pub fn quote_column(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for ch in name.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Joins validated database, schema, and table parts into a dotted name.
///
/// # Errors
/// Returns an error when any part fails identifier validation.
pub fn qualified_name(
    database: Option<&str>,
    schema: Option<&str>,
    table: &str,
) -> Result<String, StatementError> {
    let mut parts = Vec::with_capacity(3);
    if let Some(database) = database {
        parts.push(ensure_ident(database)?);
    }
    if let Some(schema) = schema {
        parts.push(ensure_ident(schema)?);
    }
    parts.push(ensure_ident(table)?);
    Ok(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_semicolons_and_drops_blanks() {
        let parts = split_statements("SELECT 1; SELECT 2;;  ;");
        assert_eq!(parts, vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn quoted_semicolons_do_not_split() {
        let parts = split_statements("SELECT 'a;b'; SELECT \"c;d\"");
        assert_eq!(parts, vec!["SELECT 'a;b'", "SELECT \"c;d\""]);
    }

    #[test]
    fn commented_semicolons_do_not_split() {
        let parts = split_statements("SELECT 1 -- trailing; note\n; SELECT 2");
        assert_eq!(parts, vec!["SELECT 1 -- trailing; note", "SELECT 2"]);

        let parts = split_statements("SELECT /* a;b */ 1; SELECT 2 // tail;");
        assert_eq!(parts, vec!["SELECT /* a;b */ 1", "SELECT 2 // tail;"]);
    }

    #[test]
    fn write_detection_honors_word_boundaries() {
        assert!(is_write_statement("INSERT INTO t VALUES (1)"));
        assert!(is_write_statement("  drop table t"));
        assert!(is_write_statement("DELETE"));
        assert!(!is_write_statement("SELECT * FROM inserts"));
        assert!(!is_write_statement("CREATED_AT_REPORT"));
        assert!(!is_write_statement("UPDATES"));
    }

    #[test]
    fn identifier_validation() {
        assert_eq!(ensure_ident("ORDERS").unwrap(), "ORDERS");
        assert_eq!(ensure_ident("_staging$tmp").unwrap(), "_staging$tmp");
        assert!(ensure_ident("").is_err());
        assert!(ensure_ident("1table").is_err());
        assert!(ensure_ident("bad-name").is_err());
        assert!(ensure_ident("t; DROP TABLE x").is_err());
        assert!(ensure_ident("$head").is_err());
    }

    #[test]
    fn literal_quoting_escapes() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
        assert_eq!(quote_literal("back\\slash"), "'back\\\\slash'");
    }

    #[test]
    fn column_quoting_doubles_embedded_quotes() {
        assert_eq!(quote_column("Order Count"), "\"Order Count\"");
        assert_eq!(quote_column("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn qualified_names_join_validated_parts() {
        assert_eq!(qualified_name(None, None, "ORDERS").unwrap(), "ORDERS");
        assert_eq!(
            qualified_name(Some("ANALYTICS"), Some("PUBLIC"), "ORDERS").unwrap(),
            "ANALYTICS.PUBLIC.ORDERS"
        );
        assert_eq!(qualified_name(None, Some("PUBLIC"), "ORDERS").unwrap(), "PUBLIC.ORDERS");
        assert!(qualified_name(Some("bad-db"), None, "ORDERS").is_err());
    }
}
