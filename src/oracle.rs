//! Collaborator interfaces consumed by the converter.
//!
//! Translation, validation and repair are external and possibly slow or
//! nondeterministic, so the workflow only ever sees them through these
//! traits. Tests plug in deterministic fakes; the CLI plugs in
//! [`crate::command::CommandOracle`].

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ConvertResult;

/// Result of asking a validator about one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub valid: bool,
    pub error: Option<String>,
    /// How the verdict was obtained, e.g. `dry_run` or `disabled`.
    pub mode: String,
}

impl Verdict {
    pub fn valid(mode: impl Into<String>) -> Self {
        Self {
            valid: true,
            error: None,
            mode: mode.into(),
        }
    }

    pub fn invalid(error: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            mode: mode.into(),
        }
    }
}

/// Everything the repair oracle gets to see.
#[derive(Debug, Clone, Serialize)]
pub struct RepairRequest<'a> {
    /// Table-normalized source statement.
    pub source_sql: &'a str,
    /// The candidate that failed validation.
    pub candidate_sql: &'a str,
    pub error: &'a str,
    /// All previous attempts, oldest first.
    pub history: String,
}

/// Hive SQL in, BigQuery SQL out.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, sql: &str) -> ConvertResult<String>;
}

#[async_trait]
pub trait SourceValidator: Send + Sync {
    async fn validate_source(&self, sql: &str) -> ConvertResult<Verdict>;
}

#[async_trait]
pub trait TargetValidator: Send + Sync {
    async fn validate_target(&self, sql: &str) -> ConvertResult<Verdict>;
}

#[async_trait]
pub trait Repairer: Send + Sync {
    async fn repair(&self, request: &RepairRequest<'_>) -> ConvertResult<String>;
}

/// Output of table-name normalization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Normalized {
    pub sql: String,
    /// Real table references with no known mapping, sorted.
    pub unmapped: Vec<String>,
}

/// Rewrites source table references to their target names.
pub trait TableNormalizer: Send + Sync {
    fn normalize(&self, sql: &str) -> Normalized;
}

/// Validator used when validation is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysValid;

#[async_trait]
impl SourceValidator for AlwaysValid {
    async fn validate_source(&self, _sql: &str) -> ConvertResult<Verdict> {
        Ok(Verdict::valid("disabled"))
    }
}

#[async_trait]
impl TargetValidator for AlwaysValid {
    async fn validate_target(&self, _sql: &str) -> ConvertResult<Verdict> {
        Ok(Verdict::valid("disabled"))
    }
}

/// Normalizer that leaves every name alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl TableNormalizer for PassThrough {
    fn normalize(&self, sql: &str) -> Normalized {
        Normalized {
            sql: sql.to_string(),
            unmapped: Vec::new(),
        }
    }
}

/// Remove a Markdown code fence wrapped around an oracle answer.
pub fn strip_code_fence(text: &str) -> String {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text.to_string();
    };
    // drop the info string (```sql)
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => "",
    };
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fence("```\nSELECT 1\n```\n"), "SELECT 1");
        assert_eq!(strip_code_fence("  SELECT 1  "), "SELECT 1");
        assert_eq!(strip_code_fence("```sql\nSELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_pass_through() {
        let out = PassThrough.normalize("SELECT * FROM t");
        assert_eq!(out.sql, "SELECT * FROM t");
        assert!(out.unmapped.is_empty());
    }

    #[tokio::test]
    async fn test_always_valid() {
        let verdict = AlwaysValid.validate_target("garbage").await.unwrap();
        assert_eq!(verdict, Verdict::valid("disabled"));
    }
}
