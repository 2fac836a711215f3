//! Query results: rows of textual field values, or a server error.

use std::collections::HashMap;
use std::str::FromStr;

/// One result row: field name → textual value, as returned by the server.
///
/// Field order is not preserved; look values up by name. A SQL NULL surfaces
/// as the empty string, matching text-mode client behavior.
#[derive(Debug, Clone, Default)]
pub struct Row {
    fields: HashMap<String, String>,
}

impl Row {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Row {
            fields: HashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn add_field(&mut self, name: String, value: String) {
        self.fields.insert(name, value);
    }

    /// The textual value of a field, if the field exists.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The textual value of a field, or a default when it is missing.
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// Parse a field's textual value. `None` when the field is missing or
    /// does not parse as `T`.
    pub fn get_parsed<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.parse().ok())
    }

    /// Number of fields in the row.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over (name, value) pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The outcome of one query: an ordered sequence of rows, or an error.
///
/// A `Some` error is always non-empty text and takes precedence; rows are
/// ignored by convention when it is set.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    pub error: Option<String>,
}

impl ResultSet {
    /// An empty, successful result (command-ok / empty-query).
    pub fn empty() -> Self {
        ResultSet::default()
    }

    /// A successful result carrying rows.
    pub fn with_rows(rows: Vec<Row>) -> Self {
        ResultSet { rows, error: None }
    }

    /// A failed result carrying the server's (or engine's) error text.
    pub fn from_error(message: impl Into<String>) -> Self {
        ResultSet {
            rows: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// True when the query failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The error text, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accessors() {
        let mut row = Row::with_capacity(2);
        row.add_field("id".to_string(), "42".to_string());
        row.add_field("email".to_string(), "a@b.c".to_string());

        assert_eq!(row.len(), 2);
        assert_eq!(row.get("id"), Some("42"));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.get_or("missing", "x"), "x");
        assert_eq!(row.get_parsed::<u64>("id"), Some(42));
        assert_eq!(row.get_parsed::<u64>("email"), None);
    }

    #[test]
    fn test_result_set_error_precedence() {
        let ok = ResultSet::with_rows(vec![Row::default()]);
        assert!(!ok.is_error());
        assert_eq!(ok.rows.len(), 1);

        let failed = ResultSet::from_error("ERROR: relation \"t\" does not exist (42P01)");
        assert!(failed.is_error());
        assert!(failed.error().unwrap().contains("does not exist"));
        assert!(failed.rows.is_empty());
    }
}
