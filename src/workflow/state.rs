//! Per-run state threaded through the conversion workflow.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One validated candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionAttempt {
    /// 1-based.
    pub attempt: u32,
    pub sql: String,
    /// Present iff validation failed.
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only attempt log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct History(Vec<ConversionAttempt>);

impl History {
    /// Append an attempt numbered after the existing ones.
    pub fn record(&mut self, sql: impl Into<String>, error: Option<String>) -> &ConversionAttempt {
        let attempt = self.0.len() as u32 + 1;
        self.0.push(ConversionAttempt {
            attempt,
            sql: sql.into(),
            error,
            recorded_at: Utc::now(),
        });
        &self.0[self.0.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversionAttempt> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&ConversionAttempt> {
        self.0.last()
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    /// Oldest first, as handed to the repair oracle.
    pub fn format_for_repair(&self) -> String {
        if self.0.is_empty() {
            return "No previous attempts.".to_string();
        }
        let mut out = String::new();
        for attempt in &self.0 {
            out.push_str(&format!("\nAttempt {}:\nSQL: {}\n", attempt.attempt, attempt.sql));
            if let Some(error) = &attempt.error {
                out.push_str(&format!("Error: {error}\n"));
            }
        }
        out
    }
}

/// Everything one run knows. Created per request, never shared.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkflowState {
    pub source_sql: String,
    pub source_valid: bool,
    pub source_error: Option<String>,
    /// Source with table names rewritten.
    pub normalized_sql: Option<String>,
    pub mapping_error: Option<String>,
    pub unmapped_tables: Vec<String>,
    pub candidate_sql: Option<String>,
    pub target_valid: bool,
    pub target_error: Option<String>,
    pub validation_mode: Option<String>,
    pub retries_used: u32,
    pub max_retries: u32,
    pub chunked: bool,
    pub chunk_count: usize,
    history: History,
}

impl WorkflowState {
    pub fn new(source_sql: impl Into<String>, max_retries: u32) -> Self {
        Self {
            source_sql: source_sql.into(),
            max_retries,
            ..Self::default()
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub(crate) fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn retries_left(&self) -> bool {
        self.retries_used < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_attempts_numbered_in_order() {
        let mut history = History::default();
        assert_eq!(history.record("SELECT 1", Some("bad".into())).attempt, 1);
        assert_eq!(history.record("SELECT 2", None).attempt, 2);
        let numbers: Vec<u32> = history.iter().map(|a| a.attempt).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_format_for_repair() {
        let mut history = History::default();
        assert_eq!(history.format_for_repair(), "No previous attempts.");
        history.record("SELECT x", Some("Unrecognized name: x".into()));
        history.record("SELECT 1", None);
        assert_eq!(
            history.format_for_repair(),
            "\nAttempt 1:\nSQL: SELECT x\nError: Unrecognized name: x\n\nAttempt 2:\nSQL: SELECT 1\n"
        );
    }

    #[test]
    fn test_retries_left() {
        let mut state = WorkflowState::new("SELECT 1", 1);
        assert!(state.retries_left());
        state.retries_used = 1;
        assert!(!state.retries_left());
    }
}
