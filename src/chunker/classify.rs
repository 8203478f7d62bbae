//! Structural classification of a SQL unit.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::scanner;

static INSERT_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*INSERT\b.*\bSELECT\b").unwrap());
static ALTER_VIEW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^\s*ALTER\s+VIEW\b").unwrap());
static LEADING_WITH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)^\s*WITH\s").unwrap());

/// The structural category of a unit. One per decomposition call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    /// More than one top-level statement.
    Batch,
    /// `INSERT ... SELECT|WITH ...`
    InsertSelect,
    /// `ALTER VIEW ... AS SELECT ...`
    AlterView,
    /// Leading `WITH`.
    Cte,
    /// Top-level `UNION` / `UNION ALL`.
    Union,
    /// Nothing to split on.
    Opaque,
}

/// Classify `sql`, first match wins.
///
/// Every predicate runs against the literal-stripped view, so keywords that
/// only occur inside quotes (scheduling macros included) are invisible.
pub fn classify(sql: &str) -> Structure {
    let stripped = scanner::strip_literals(sql);
    classify_stripped(&stripped)
}

pub(crate) fn classify_stripped(stripped: &str) -> Structure {
    if scanner::split_statements(stripped).len() > 1 {
        Structure::Batch
    } else if INSERT_SELECT.is_match(stripped) {
        Structure::InsertSelect
    } else if ALTER_VIEW.is_match(stripped) {
        Structure::AlterView
    } else if has_leading_with(stripped) {
        Structure::Cte
    } else if !scanner::find_top_level_unions(stripped).is_empty() {
        Structure::Union
    } else {
        Structure::Opaque
    }
}

pub(crate) fn has_leading_with(stripped: &str) -> bool {
    LEADING_WITH.is_match(stripped)
}

/// Kind of one member of a multi-statement batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Use,
    Select,
    CteQuery,
    Insert,
    AlterView,
    Create,
    Other,
}

impl StatementKind {
    /// Detect the kind from the statement's leading keyword(s), skipping
    /// comments.
    pub fn detect(statement: &str) -> Self {
        let stripped = scanner::strip_literals(statement);
        let mut words = stripped
            .split(|c: char| c.is_whitespace() || c == '(')
            .filter(|w| !w.is_empty());
        let first = words.next().unwrap_or_default().to_ascii_uppercase();
        let second = words.next().unwrap_or_default();
        match first.as_str() {
            "WITH" => Self::CteQuery,
            "INSERT" => Self::Insert,
            "ALTER" if second.eq_ignore_ascii_case("VIEW") => Self::AlterView,
            "CREATE" => Self::Create,
            "SELECT" => Self::Select,
            "USE" => Self::Use,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Use => "use",
            Self::Select => "select",
            Self::CteQuery => "cte_query",
            Self::Insert => "insert",
            Self::AlterView => "alter_view",
            Self::Create => "create",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
