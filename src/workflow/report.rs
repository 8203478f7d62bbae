//! What a finished run hands back to its caller.

use chrono::Local;
use serde::Serialize;

use super::Outcome;
use super::state::WorkflowState;

/// Final state of one run plus how it ended.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    /// True only when the target engine accepted the candidate.
    pub success: bool,
    pub outcome: Outcome,
    /// Set when the run gave up with a candidate still failing.
    pub warning: Option<String>,
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub state: WorkflowState,
}

impl ConversionReport {
    pub fn sql(&self) -> Option<&str> {
        self.state.candidate_sql.as_deref()
    }

    /// Markdown report, as written next to batch outputs.
    pub fn to_markdown(&self, title: &str) -> String {
        let state = &self.state;
        let mut md = String::new();
        let (icon, status) = if self.success {
            ("✅", "Success")
        } else {
            ("❌", "Failure")
        };

        md.push_str(&format!("# Conversion Report: {title}\n\n"));
        md.push_str(&format!("**Date**: {}\n", Local::now().format("%Y-%m-%d %H:%M:%S")));
        md.push_str(&format!("**Status**: {icon} {status}\n"));
        md.push_str(&format!("**Outcome**: {}\n", self.outcome));
        md.push_str(&format!("**Duration**: {:.2}s\n", self.elapsed_ms as f64 / 1000.0));
        md.push_str(&format!("**Retries**: {}\n", state.retries_used));
        if state.chunked {
            md.push_str(&format!("**Chunks**: {}\n", state.chunk_count));
        }
        if let Some(warning) = &self.warning {
            md.push_str(&format!("**Warning**: {warning}\n"));
        }

        md.push_str("\n## 1. Validation Result\n");
        let hive_valid = if state.source_valid { "Yes" } else { "No" };
        md.push_str(&format!("- **Hive Valid**: {hive_valid}\n"));
        if let Some(err) = &state.source_error {
            md.push_str(&format!("  - Error: `{err}`\n"));
        }
        if let Some(err) = &state.mapping_error {
            md.push_str(&format!("- **Table Mapping**: {err}\n"));
        }
        md.push_str(&format!(
            "- **BigQuery Validation**: {}\n",
            if state.target_valid { "Passed" } else { "Failed" }
        ));
        let mode = state.validation_mode.as_deref().unwrap_or("N/A");
        md.push_str(&format!("- **Mode**: {mode}\n"));
        if let Some(err) = &state.target_error {
            md.push_str(&format!("- **Error**: \n```\n{err}\n```\n"));
        }

        md.push_str("\n## 2. Final BigQuery SQL\n");
        match &state.candidate_sql {
            Some(sql) => md.push_str(&format!("```sql\n{sql}\n```\n")),
            None => md.push_str("*No BigQuery SQL generated.*\n"),
        }

        md.push_str("\n## 3. Input Hive SQL\n");
        md.push_str(&format!("```sql\n{}\n```\n", state.source_sql.trim()));

        md.push_str("\n## 4. Conversion History\n");
        if state.history().is_empty() {
            md.push_str("*No history available.*\n");
        }
        for attempt in state.history().iter() {
            md.push_str(&format!("### Attempt {}\n", attempt.attempt));
            if let Some(err) = &attempt.error {
                md.push_str(&format!("**Error**:\n```\n{err}\n```\n"));
            }
            md.push_str(&format!(
                "<details>\n<summary>Generated SQL</summary>\n\n```sql\n{}\n```\n\n</details>\n\n",
                attempt.sql
            ));
        }
        md
    }
}
