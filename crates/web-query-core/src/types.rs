//! Values produced by a query run

use std::fmt;

/// Text read for one selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    /// Element matched and had text
    Text(String),
    /// Element matched but its text content is null
    Null,
    /// No element matched (embedded lookups do not wait)
    Undefined,
}

impl QueryValue {
    pub fn from_text(text: Option<String>) -> Self {
        text.map_or(Self::Null, Self::Text)
    }
}

impl fmt::Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Null => f.write_str("null"),
            Self::Undefined => f.write_str("undefined"),
        }
    }
}

/// A selector that could not be evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFailure {
    pub selector: String,
    pub message: String,
}

/// Outcome of one pass over the configured selectors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryReport {
    /// Lines written to stdout
    pub printed: usize,
    /// Selectors that failed, in evaluation order
    pub failures: Vec<QueryFailure>,
}

impl QueryReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// How the run ends once the selector loop is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exit the process with this status
    Exit(i32),
    /// Leave the window open for inspection
    StayOpen,
}
