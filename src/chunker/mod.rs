//! Structural SQL decomposition and reassembly.
//!
//! Oversized statements are cut along structural seams (statement batches,
//! `INSERT`/`ALTER VIEW` heads, CTE bindings, top-level `UNION`s) into
//! ordered, typed chunks that can be translated independently and merged
//! back with [`reassemble`].
//!
//! The detection is heuristic, not a SQL grammar: anything the chunker cannot
//! delimit with confidence is kept as a single opaque `main` chunk.

pub mod classify;
pub mod header;
mod merge;
pub mod scanner;
mod split;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

pub use classify::{StatementKind, Structure, classify};
pub use merge::reassemble;
pub use split::decompose;

use crate::error::ConvertError;

/// Category of a chunk. Closed set; reassembly rules key off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    /// One CTE binding; content is the parenthesised definition.
    Cte,
    /// The query following the CTE list, or an undecomposed unit.
    Main,
    /// First branch of a top-level UNION chain.
    UnionFirst,
    /// A later branch of a top-level UNION chain.
    UnionPart,
    /// `INSERT [OVERWRITE] [INTO] TABLE <t>`
    InsertHeader,
    /// `ALTER VIEW <v> AS`
    AlterViewHeader,
    /// The query body of an INSERT or ALTER VIEW.
    Select,
    /// One member of a multi-statement batch.
    Statement(StatementKind),
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cte => "cte",
            Self::Main => "main",
            Self::UnionFirst => "union_first",
            Self::UnionPart => "union_part",
            Self::InsertHeader => "insert_header",
            Self::AlterViewHeader => "alter_view_header",
            Self::Select => "select",
            Self::Statement(kind) => kind.as_str(),
        }
    }

    pub fn is_header(&self) -> bool {
        matches!(self, Self::InsertHeader | Self::AlterViewHeader)
    }

    pub fn is_union(&self) -> bool {
        matches!(self, Self::UnionFirst | Self::UnionPart)
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ChunkKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A unit of decomposition.
///
/// Fields are read-only so that `name` stays present exactly for `cte`
/// chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlChunk {
    kind: ChunkKind,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    index: usize,
}

impl SqlChunk {
    /// Create an unnamed chunk.
    ///
    /// `None` for [`ChunkKind::Cte`], which needs a name: use
    /// [`SqlChunk::cte`] for CTE bindings.
    pub fn new(kind: ChunkKind, content: impl Into<String>, index: usize) -> Option<Self> {
        (kind != ChunkKind::Cte).then(|| Self::unnamed(kind, content, index))
    }

    /// Callers in this module tree pass only non-CTE kinds.
    fn unnamed(kind: ChunkKind, content: impl Into<String>, index: usize) -> Self {
        Self {
            kind,
            content: content.into().trim().to_string(),
            name: None,
            index,
        }
    }

    /// Create a CTE chunk named `name` whose content is the parenthesised
    /// definition.
    pub fn cte(name: impl Into<String>, definition: impl Into<String>, index: usize) -> Self {
        Self {
            kind: ChunkKind::Cte,
            content: definition.into().trim().to_string(),
            name: Some(name.into()),
            index,
        }
    }

    pub fn main(content: impl Into<String>) -> Self {
        Self::unnamed(ChunkKind::Main, content, 0)
    }

    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Same kind, name and position with new content, e.g. after translation.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            kind: self.kind,
            content: content.into().trim().to_string(),
            name: self.name.clone(),
            index: self.index,
        }
    }

    pub(crate) fn shifted(mut self, offset: usize) -> Self {
        self.index += offset;
        self
    }
}

/// Whether chunking is decided by size or forced by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingMode {
    /// Chunk only when the input exceeds a threshold.
    #[default]
    Auto,
    /// Always run structural decomposition.
    Always,
    /// Never chunk.
    Disabled,
}

impl FromStr for ChunkingMode {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" => Ok(Self::Always),
            "disabled" => Ok(Self::Disabled),
            other => Err(ConvertError::config(
                "SQL_CHUNKING_MODE",
                other,
                "auto, always or disabled",
            )),
        }
    }
}

impl fmt::Display for ChunkingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Always => "always",
            Self::Disabled => "disabled",
        })
    }
}

/// Size limits above which a unit is decomposed in `auto` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkThresholds {
    pub max_chars: usize,
    pub max_lines: usize,
}

impl Default for ChunkThresholds {
    fn default() -> Self {
        Self {
            max_chars: 8000,
            max_lines: 200,
        }
    }
}

impl ChunkThresholds {
    /// Character count OR newline count above its limit.
    pub fn exceeded_by(&self, sql: &str) -> bool {
        let sql = sql.trim();
        sql.chars().count() > self.max_chars || line_breaks(sql) > self.max_lines
    }
}

fn line_breaks(sql: &str) -> usize {
    sql.bytes().filter(|&b| b == b'\n').count()
}

/// Decides whether to chunk and produces the chunk plan for a unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chunker {
    thresholds: ChunkThresholds,
    mode: ChunkingMode,
}

impl Chunker {
    pub fn new(thresholds: ChunkThresholds, mode: ChunkingMode) -> Self {
        Self { thresholds, mode }
    }

    pub fn mode(&self) -> ChunkingMode {
        self.mode
    }

    pub fn thresholds(&self) -> ChunkThresholds {
        self.thresholds
    }

    /// Size gate, overridden by a forced mode.
    pub fn should_chunk(&self, sql: &str) -> bool {
        match self.mode {
            ChunkingMode::Always => true,
            ChunkingMode::Disabled => false,
            ChunkingMode::Auto => self.thresholds.exceeded_by(sql),
        }
    }

    /// The chunks `sql` will be translated as: a structural decomposition
    /// when chunking applies, otherwise one `main` chunk.
    pub fn plan(&self, sql: &str) -> Vec<SqlChunk> {
        tracing::info!(
            "[Chunker] Input SQL: {} chars, {} lines (mode={})",
            sql.chars().count(),
            line_breaks(sql),
            self.mode
        );
        if self.should_chunk(sql) {
            decompose(sql)
        } else {
            vec![SqlChunk::main(sql)]
        }
    }
}
