//! End-to-end runs of the conversion workflow with deterministic oracles.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hive2bq::prelude::*;
use pretty_assertions::assert_eq;

/// Translator that upper-cases, so conversions are visible.
struct Upper;

#[async_trait]
impl Translator for Upper {
    async fn translate(&self, sql: &str) -> ConvertResult<String> {
        Ok(sql.to_uppercase())
    }
}

/// Replays scripted verdicts, then keeps repeating the last one.
struct Scripted {
    verdicts: Mutex<VecDeque<bool>>,
    last: bool,
    calls: Mutex<u32>,
}

impl Scripted {
    fn new(verdicts: &[bool], last: bool) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.iter().copied().collect()),
            last,
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TargetValidator for Scripted {
    async fn validate_target(&self, _sql: &str) -> ConvertResult<Verdict> {
        *self.calls.lock().unwrap() += 1;
        let ok = self.verdicts.lock().unwrap().pop_front().unwrap_or(self.last);
        Ok(if ok {
            Verdict::valid("fake")
        } else {
            Verdict::invalid("Syntax error: Unexpected keyword", "fake")
        })
    }
}

#[async_trait]
impl SourceValidator for Scripted {
    async fn validate_source(&self, _sql: &str) -> ConvertResult<Verdict> {
        let ok = self.verdicts.lock().unwrap().pop_front().unwrap_or(self.last);
        Ok(if ok {
            Verdict::valid("fake")
        } else {
            Verdict::invalid("ParseException line 1:7", "fake")
        })
    }
}

/// Appends a marker per repair and keeps the histories it was shown.
#[derive(Default)]
struct Fixer {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Repairer for Fixer {
    async fn repair(&self, request: &RepairRequest<'_>) -> ConvertResult<String> {
        self.seen.lock().unwrap().push(request.history.clone());
        Ok(format!("{} -- fixed", request.candidate_sql))
    }
}

/// Answers with the Hive table name the mapping already replaced.
struct Regressing;

#[async_trait]
impl Repairer for Regressing {
    async fn repair(&self, _request: &RepairRequest<'_>) -> ConvertResult<String> {
        Ok("```sql\nSELECT * FROM ods.orders WHERE dt = '2024-01-01'\n```".to_string())
    }
}

struct Broken;

#[async_trait]
impl Translator for Broken {
    async fn translate(&self, _sql: &str) -> ConvertResult<String> {
        Err(ConvertError::Translation("provider unavailable".into()))
    }
}

fn config(max_retries: u32) -> ConverterConfig {
    ConverterConfig {
        max_retries,
        ..ConverterConfig::default()
    }
}

#[tokio::test]
async fn test_retry_bound_then_success() {
    let validator = Arc::new(Scripted::new(&[false, false], true));
    let fixer = Arc::new(Fixer::default());
    let workflow = Workflow::builder()
        .translator(Arc::new(Upper))
        .target_validator(validator.clone())
        .repairer(fixer.clone())
        .config(config(2))
        .build()
        .unwrap();

    let report = workflow.run("select 1").await.unwrap();
    assert!(report.success);
    assert_eq!(report.outcome, Outcome::Converted);
    assert_eq!(report.state.retries_used, 2);
    assert_eq!(report.state.history().len(), 3);
    assert_eq!(validator.calls(), 3);
    assert_eq!(report.sql(), Some("SELECT 1 -- fixed -- fixed"));
    assert!(report.warning.is_none());

    let attempts: Vec<_> = report.state.history().iter().map(|a| a.error.is_some()).collect();
    assert_eq!(attempts, vec![true, true, false]);

    // the second repair sees both failures, oldest first
    let seen = fixer.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[1].contains("Attempt 1:\nSQL: SELECT 1\n"));
    assert!(seen[1].contains("Attempt 2:\nSQL: SELECT 1 -- fixed\n"));
}

#[tokio::test]
async fn test_retries_exhausted() {
    let validator = Arc::new(Scripted::new(&[], false));
    let workflow = Workflow::builder()
        .translator(Arc::new(Upper))
        .target_validator(validator.clone())
        .repairer(Arc::new(Fixer::default()))
        .config(config(2))
        .build()
        .unwrap();

    let report = workflow.run("select 1").await.unwrap();
    assert!(!report.success);
    assert_eq!(report.outcome, Outcome::RetriesExhausted);
    assert_eq!(report.state.retries_used, 2);
    assert_eq!(report.state.history().len(), 3);
    assert_eq!(validator.calls(), 3);
    assert_eq!(
        report.warning.as_deref(),
        Some("Maximum retries (2) exceeded. The converted SQL may still contain errors.")
    );
    // best candidate is still returned
    assert!(report.sql().is_some());
    assert_eq!(
        report.state.target_error.as_deref(),
        Some("Syntax error: Unexpected keyword")
    );
}

#[tokio::test]
async fn test_zero_retries_validates_once() {
    let validator = Arc::new(Scripted::new(&[], false));
    let workflow = Workflow::builder()
        .translator(Arc::new(Upper))
        .target_validator(validator.clone())
        .repairer(Arc::new(Fixer::default()))
        .config(config(0))
        .build()
        .unwrap();

    let report = workflow.run("select 1").await.unwrap();
    assert_eq!(report.outcome, Outcome::RetriesExhausted);
    assert_eq!(validator.calls(), 1);
}

#[tokio::test]
async fn test_source_invalid_stops_early() {
    let target = Arc::new(Scripted::new(&[], true));
    let workflow = Workflow::builder()
        .translator(Arc::new(Broken))
        .source_validator(Arc::new(Scripted::new(&[], false)))
        .target_validator(target.clone())
        .repairer(Arc::new(Fixer::default()))
        .build()
        .unwrap();

    let report = workflow.run("selec 1").await.unwrap();
    assert_eq!(report.outcome, Outcome::SourceInvalid);
    assert!(!report.state.source_valid);
    assert_eq!(
        report.state.source_error.as_deref(),
        Some("ParseException line 1:7")
    );
    assert!(report.sql().is_none());
    assert_eq!(target.calls(), 0);
}

#[tokio::test]
async fn test_source_validation_can_be_disabled() {
    let workflow = Workflow::builder()
        .translator(Arc::new(Upper))
        .source_validator(Arc::new(Scripted::new(&[], false)))
        .target_validator(Arc::new(Scripted::new(&[], true)))
        .repairer(Arc::new(Fixer::default()))
        .config(ConverterConfig {
            source_validation: false,
            ..ConverterConfig::default()
        })
        .build()
        .unwrap();

    let report = workflow.run("select 1").await.unwrap();
    assert!(report.success);
    assert!(report.state.source_valid);
}

#[tokio::test]
async fn test_unmapped_tables_skip_conversion() {
    let mapping = TableMapping::from_pairs([("ods.orders", "proj.ods.orders")]);
    let workflow = Workflow::builder()
        .translator(Arc::new(Broken))
        .target_validator(Arc::new(Scripted::new(&[], true)))
        .repairer(Arc::new(Fixer::default()))
        .normalizer(Arc::new(mapping))
        .build()
        .unwrap();

    let report = workflow
        .run("SELECT * FROM ods.orders o JOIN dim.users u ON o.uid = u.id JOIN dim.city c ON 1=1")
        .await
        .unwrap();
    assert_eq!(
        report.outcome,
        Outcome::MappingUnresolved {
            tables: vec!["dim.city".to_string(), "dim.users".to_string()]
        }
    );
    assert_eq!(
        report.state.mapping_error.as_deref(),
        Some("Mapping failed: No BigQuery mapping found for tables: dim.city, dim.users")
    );
    assert!(report.state.history().is_empty());
}

#[tokio::test]
async fn test_mapped_names_reach_the_translator() {
    let mapping = TableMapping::from_pairs([("ods.orders", "proj.ods.orders")]);
    let workflow = Workflow::builder()
        .translator(Arc::new(Upper))
        .target_validator(Arc::new(Scripted::new(&[], true)))
        .repairer(Arc::new(Fixer::default()))
        .normalizer(Arc::new(mapping))
        .build()
        .unwrap();

    let report = workflow.run("select id from ods.orders").await.unwrap();
    assert_eq!(
        report.state.normalized_sql.as_deref(),
        Some("select id from `proj.ods.orders`")
    );
    assert_eq!(report.sql(), Some("SELECT ID FROM `PROJ.ODS.ORDERS`"));
}

#[tokio::test]
async fn test_repaired_sql_is_mapped_again() {
    let mapping = TableMapping::from_pairs([("ods.orders", "p.ods.orders")]);
    let validator = Arc::new(Scripted::new(&[false], true));
    let workflow = Workflow::builder()
        .translator(Arc::new(Upper))
        .target_validator(validator.clone())
        .repairer(Arc::new(Regressing))
        .normalizer(Arc::new(mapping))
        .config(config(3))
        .build()
        .unwrap();

    let report = workflow.run("select * from ods.orders").await.unwrap();
    assert_eq!(report.outcome, Outcome::Converted);
    assert_eq!(validator.calls(), 2);
    assert_eq!(
        report.sql(),
        Some("SELECT * FROM `p.ods.orders` WHERE dt = '2024-01-01'")
    );
    let last = report.state.history().last().unwrap();
    assert_eq!(last.sql, "SELECT * FROM `p.ods.orders` WHERE dt = '2024-01-01'");
}

#[tokio::test]
async fn test_translation_failure_propagates() {
    let workflow = Workflow::builder()
        .translator(Arc::new(Broken))
        .target_validator(Arc::new(Scripted::new(&[], true)))
        .repairer(Arc::new(Fixer::default()))
        .build()
        .unwrap();

    let err = workflow.run("select 1").await.unwrap_err();
    assert_eq!(err.to_string(), "Translation error: provider unavailable");
}

#[tokio::test]
async fn test_chunked_run_reports_chunks() {
    let workflow = Workflow::builder()
        .translator(Arc::new(Upper))
        .target_validator(Arc::new(Scripted::new(&[], true)))
        .repairer(Arc::new(Fixer::default()))
        .config(ConverterConfig {
            chunking: ChunkingMode::Always,
            ..ConverterConfig::default()
        })
        .build()
        .unwrap();

    let report = workflow
        .run("insert overwrite table dw.t select a from x union all select b from y")
        .await
        .unwrap();
    assert!(report.state.chunked);
    assert_eq!(report.state.chunk_count, 3);
    assert_eq!(
        report.sql(),
        Some("CREATE OR REPLACE TABLE `dw.t` AS\nSELECT A FROM X\nUNION ALL\nSELECT B FROM Y")
    );
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let workflow = Arc::new(
        Workflow::builder()
            .translator(Arc::new(Upper))
            .target_validator(Arc::new(AlwaysValid))
            .repairer(Arc::new(Fixer::default()))
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let workflow = workflow.clone();
            tokio::spawn(async move { workflow.run(&format!("select {i}")).await })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.sql(), Some(format!("SELECT {i}").as_str()));
        assert_eq!(report.state.history().len(), 1);
    }
}
