//! The convert → validate → repair state machine.
//!
//! ```text
//! ValidateSource ─▶ NormalizeNames ─▶ Convert ─▶ Validate ─▶ End
//!       │                 │                        ▲   │
//!       ▼                 ▼                        │   ▼
//!      End               End                       └─ Fix
//! ```
//!
//! `Validate ⇄ Fix` is the only cycle. `retries_used` grows on every pass
//! through `Fix`, so a run makes at most `max_retries + 1` validation calls.

mod report;
mod state;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

pub use report::ConversionReport;
pub use state::{ConversionAttempt, History, WorkflowState};

use crate::chunker::Chunker;
use crate::config::ConverterConfig;
use crate::convert::ChunkedConverter;
use crate::error::{ConvertError, ConvertResult};
use crate::oracle::{
    AlwaysValid, PassThrough, RepairRequest, Repairer, SourceValidator, TableNormalizer,
    TargetValidator, Translator, strip_code_fence,
};
use crate::template::expand_templates;

/// Where a run is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    ValidateSource,
    NormalizeNames,
    Convert,
    Validate,
    Fix,
    End(Outcome),
}

/// How a run ended. Every variant comes with a complete state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The Hive input was rejected; nothing was converted.
    SourceInvalid,
    /// Tables without a BigQuery mapping; nothing was converted.
    MappingUnresolved { tables: Vec<String> },
    /// The target engine accepted the candidate.
    Converted,
    /// Still failing after the last repair. The candidate is kept.
    RetriesExhausted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceInvalid => write!(f, "source invalid"),
            Self::MappingUnresolved { tables } => {
                write!(f, "mapping unresolved ({})", tables.join(", "))
            }
            Self::Converted => write!(f, "converted"),
            Self::RetriesExhausted => write!(f, "retries exhausted"),
        }
    }
}

/// A configured converter. Cheap to share; every [`Workflow::run`] gets
/// its own state.
pub struct Workflow {
    translator: Arc<dyn Translator>,
    source_validator: Arc<dyn SourceValidator>,
    target_validator: Arc<dyn TargetValidator>,
    repairer: Arc<dyn Repairer>,
    normalizer: Arc<dyn TableNormalizer>,
    config: ConverterConfig,
    chunker: Chunker,
}

impl Workflow {
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::default()
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Run one conversion to a terminal stage.
    ///
    /// Collaborator failures (process, transport) are returned as errors.
    /// Every other ending, including a rejected source, is an `Ok` report.
    pub async fn run(&self, sql: &str) -> ConvertResult<ConversionReport> {
        let started = Instant::now();
        let mut state = WorkflowState::new(sql, self.config.max_retries);
        let mut stage = Stage::ValidateSource;

        let outcome = loop {
            tracing::debug!("[Workflow] Stage {:?}", stage);
            stage = match stage {
                Stage::ValidateSource => self.validate_source(&mut state).await?,
                Stage::NormalizeNames => self.normalize_names(&mut state),
                Stage::Convert => self.convert(&mut state).await?,
                Stage::Validate => self.validate(&mut state).await?,
                Stage::Fix => self.fix(&mut state).await?,
                Stage::End(outcome) => break outcome,
            };
        };

        let warning = (outcome == Outcome::RetriesExhausted).then(|| {
            format!(
                "Maximum retries ({}) exceeded. The converted SQL may still contain errors.",
                state.max_retries
            )
        });
        if let Some(w) = &warning {
            tracing::warn!("[Workflow] {}", w);
        }
        tracing::info!("[Workflow] Finished: {}", outcome);

        Ok(ConversionReport {
            success: outcome == Outcome::Converted,
            outcome,
            warning,
            elapsed_ms: started.elapsed().as_millis() as u64,
            state,
        })
    }

    async fn validate_source(&self, state: &mut WorkflowState) -> ConvertResult<Stage> {
        tracing::info!(
            "[Stage: validate_source] Input SQL: {} chars",
            state.source_sql.len()
        );
        if !self.config.source_validation {
            tracing::info!("[Stage: validate_source] Source validation disabled, skipping");
            state.source_valid = true;
            return Ok(Stage::NormalizeNames);
        }

        let verdict = self.source_validator.validate_source(&state.source_sql).await?;
        state.source_valid = verdict.valid;
        if verdict.valid {
            tracing::info!("[Stage: validate_source] Hive SQL is valid");
            Ok(Stage::NormalizeNames)
        } else {
            let error = verdict
                .error
                .unwrap_or_else(|| "Hive SQL is invalid".to_string());
            tracing::warn!("[Stage: validate_source] Hive SQL is invalid: {}", error);
            state.source_error = Some(error);
            Ok(Stage::End(Outcome::SourceInvalid))
        }
    }

    fn normalize_names(&self, state: &mut WorkflowState) -> Stage {
        let normalized = self.normalizer.normalize(&state.source_sql);
        if !normalized.unmapped.is_empty() {
            let error = format!(
                "Mapping failed: No BigQuery mapping found for tables: {}",
                normalized.unmapped.join(", ")
            );
            tracing::error!("[Stage: normalize_names] {}", error);
            state.mapping_error = Some(error);
            state.unmapped_tables = normalized.unmapped.clone();
            return Stage::End(Outcome::MappingUnresolved {
                tables: normalized.unmapped,
            });
        }

        if normalized.sql != state.source_sql {
            tracing::info!("[Stage: normalize_names] Table names mapped");
        } else {
            tracing::info!("[Stage: normalize_names] No table names needed mapping");
        }
        state.normalized_sql = Some(normalized.sql);
        Stage::Convert
    }

    async fn convert(&self, state: &mut WorkflowState) -> ConvertResult<Stage> {
        let source = state
            .normalized_sql
            .as_deref()
            .unwrap_or(&state.source_sql);
        let converter = ChunkedConverter::new(self.translator.as_ref(), &self.chunker);
        let converted = converter.convert(source).await?;
        tracing::info!(
            "[Stage: convert] Conversion completed ({} chars, {} chunk(s))",
            converted.sql.len(),
            converted.chunk_count
        );

        state.candidate_sql = Some(converted.sql);
        state.chunked = converted.chunked;
        state.chunk_count = converted.chunk_count;
        state.retries_used = 0;
        state.history_mut().clear();
        Ok(Stage::Validate)
    }

    async fn validate(&self, state: &mut WorkflowState) -> ConvertResult<Stage> {
        let candidate = state.candidate_sql.clone().unwrap_or_default();
        let attempt = state.history().len() + 1;
        tracing::info!("[Stage: validate] Validating BigQuery SQL (attempt {})", attempt);

        let checked = if self.config.expand_templates {
            expand_templates(&candidate)
        } else {
            candidate.clone()
        };
        let verdict = self.target_validator.validate_target(&checked).await?;
        tracing::info!("[Stage: validate] Validation mode: {}", verdict.mode);
        state.validation_mode = Some(verdict.mode);
        state.target_valid = verdict.valid;

        if verdict.valid {
            tracing::info!("[Stage: validate] BigQuery SQL validation passed");
            state.target_error = None;
            state.history_mut().record(candidate, None);
            return Ok(Stage::End(Outcome::Converted));
        }

        let error = verdict
            .error
            .unwrap_or_else(|| "Validation failed without an error message".to_string());
        tracing::error!("[Stage: validate] BigQuery SQL validation FAILED (attempt {})", attempt);
        for line in error.lines() {
            tracing::error!("  {}", line);
        }
        state.target_error = Some(error.clone());
        state.history_mut().record(candidate, Some(error));

        if state.retries_left() {
            Ok(Stage::Fix)
        } else {
            Ok(Stage::End(Outcome::RetriesExhausted))
        }
    }

    async fn fix(&self, state: &mut WorkflowState) -> ConvertResult<Stage> {
        state.retries_used += 1;
        tracing::info!(
            "[Stage: fix] Starting SQL fix (retry {}/{})",
            state.retries_used,
            state.max_retries
        );

        let repaired = {
            let request = RepairRequest {
                source_sql: state
                    .normalized_sql
                    .as_deref()
                    .unwrap_or(&state.source_sql),
                candidate_sql: state.candidate_sql.as_deref().unwrap_or_default(),
                error: state.target_error.as_deref().unwrap_or_default(),
                history: state.history().format_for_repair(),
            };
            self.repairer.repair(&request).await?
        };

        let normalized = self.normalizer.normalize(&strip_code_fence(&repaired));
        if !normalized.unmapped.is_empty() {
            tracing::warn!(
                "[Stage: fix] Repaired SQL references unmapped tables: {}",
                normalized.unmapped.join(", ")
            );
        }
        tracing::info!("[Stage: fix] SQL fix completed ({} chars)", normalized.sql.len());
        state.candidate_sql = Some(normalized.sql);
        Ok(Stage::Validate)
    }
}

/// Builder for [`Workflow`]
#[derive(Default)]
pub struct WorkflowBuilder {
    translator: Option<Arc<dyn Translator>>,
    source_validator: Option<Arc<dyn SourceValidator>>,
    target_validator: Option<Arc<dyn TargetValidator>>,
    repairer: Option<Arc<dyn Repairer>>,
    normalizer: Option<Arc<dyn TableNormalizer>>,
    config: ConverterConfig,
}

impl WorkflowBuilder {
    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Defaults to accepting every source statement.
    pub fn source_validator(mut self, validator: Arc<dyn SourceValidator>) -> Self {
        self.source_validator = Some(validator);
        self
    }

    pub fn target_validator(mut self, validator: Arc<dyn TargetValidator>) -> Self {
        self.target_validator = Some(validator);
        self
    }

    pub fn repairer(mut self, repairer: Arc<dyn Repairer>) -> Self {
        self.repairer = Some(repairer);
        self
    }

    /// Defaults to leaving table names untouched.
    pub fn normalizer(mut self, normalizer: Arc<dyn TableNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn config(mut self, config: ConverterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ConvertResult<Workflow> {
        let missing = |what: &str| ConvertError::Config(format!("workflow needs a {what}"));
        Ok(Workflow {
            translator: self.translator.ok_or_else(|| missing("translator"))?,
            source_validator: self
                .source_validator
                .unwrap_or_else(|| Arc::new(AlwaysValid)),
            target_validator: self
                .target_validator
                .ok_or_else(|| missing("target validator"))?,
            repairer: self.repairer.ok_or_else(|| missing("repairer"))?,
            normalizer: self.normalizer.unwrap_or_else(|| Arc::new(PassThrough)),
            chunker: self.config.chunker(),
            config: self.config,
        })
    }
}
