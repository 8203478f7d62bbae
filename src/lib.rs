//! # hive2bq — Hive SQL to BigQuery, one checked chunk at a time
//!
//! Large Hive statements are cut along structural seams, translated piece
//! by piece through an external oracle, merged back, and then driven
//! through a bounded validate/repair loop.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hive2bq::prelude::*;
//!
//! let llm = Arc::new(CommandOracle::parse("llm-translate")?);
//! let dry_run = Arc::new(CommandOracle::parse("bq-dry-run")?.with_mode("dry_run"));
//!
//! let workflow = Workflow::builder()
//!     .translator(llm.clone())
//!     .target_validator(dry_run)
//!     .repairer(llm)
//!     .config(ConverterConfig::load(None)?)
//!     .build()?;
//!
//! let report = workflow.run("INSERT OVERWRITE TABLE t SELECT 1").await?;
//! println!("{}", report.sql().unwrap_or_default());
//! ```
//!
//! ## Chunk kinds
//!
//! | Kind                | Produced from                         | Merged as              |
//! |---------------------|---------------------------------------|------------------------|
//! | `insert_header`     | `INSERT [OVERWRITE] [INTO] TABLE t`   | first                  |
//! | `alter_view_header` | `ALTER VIEW v AS`                     | first                  |
//! | `cte`               | `name AS (...)`                       | `WITH a AS (..), b ..` |
//! | `union_first/part`  | top-level `UNION [ALL]` branches      | `UNION ALL`            |
//! | statement kinds     | `;`-separated batch members           | `;\n`, `use` dropped   |

pub mod chunker;
pub mod command;
pub mod config;
pub mod convert;
pub mod error;
pub mod mapping;
pub mod oracle;
pub mod template;
pub mod workflow;

pub mod prelude {
    pub use crate::chunker::{
        ChunkKind, ChunkThresholds, Chunker, ChunkingMode, SqlChunk, StatementKind, decompose,
        reassemble,
    };
    pub use crate::command::CommandOracle;
    pub use crate::config::ConverterConfig;
    pub use crate::error::*;
    pub use crate::mapping::TableMapping;
    pub use crate::oracle::*;
    pub use crate::workflow::{ConversionReport, Outcome, Workflow};
}

pub use chunker::{decompose, reassemble};
