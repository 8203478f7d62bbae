//! Chunk-aware translation: plan, translate piece by piece, reassemble.

use serde::Serialize;

use crate::chunker::{ChunkKind, Chunker, SqlChunk, StatementKind, header, reassemble};
use crate::error::ConvertResult;
use crate::oracle::{Translator, strip_code_fence};

/// Result of one chunk-aware translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkedOutcome {
    pub sql: String,
    /// Whether the statement went through the oracle in more than one piece.
    pub chunked: bool,
    pub chunk_count: usize,
}

/// Translates a statement whole or chunk by chunk.
pub struct ChunkedConverter<'a> {
    translator: &'a dyn Translator,
    chunker: &'a Chunker,
}

impl<'a> ChunkedConverter<'a> {
    pub fn new(translator: &'a dyn Translator, chunker: &'a Chunker) -> Self {
        Self {
            translator,
            chunker,
        }
    }

    pub async fn convert(&self, sql: &str) -> ConvertResult<ChunkedOutcome> {
        let plan = self.chunker.plan(sql);
        if plan.len() <= 1 {
            tracing::info!("[Convert] Translating statement in a single call");
            let translated = self.translator.translate(sql).await?;
            return Ok(ChunkedOutcome {
                sql: strip_code_fence(&translated),
                chunked: false,
                chunk_count: 1,
            });
        }

        tracing::info!("[Convert] Translating {} chunks", plan.len());
        let translated = self.translate_chunks(&plan).await?;
        let merged = reassemble(&translated);
        tracing::info!("[Convert] Reassembled {} chars", merged.len());
        Ok(ChunkedOutcome {
            sql: merged,
            chunked: true,
            chunk_count: plan.len(),
        })
    }

    /// Strictly sequential, in index order.
    async fn translate_chunks(&self, plan: &[SqlChunk]) -> ConvertResult<Vec<SqlChunk>> {
        let mut ordered: Vec<&SqlChunk> = plan.iter().collect();
        ordered.sort_by_key(|c| c.index());

        let mut out = Vec::with_capacity(ordered.len());
        for (n, chunk) in ordered.into_iter().enumerate() {
            tracing::debug!("[Convert] Chunk {}/{} ({})", n + 1, plan.len(), chunk.kind());
            let content = match chunk.kind() {
                ChunkKind::Statement(StatementKind::Use) => continue,
                ChunkKind::InsertHeader => rewrite_insert_header(chunk.content()),
                ChunkKind::AlterViewHeader => rewrite_alter_view_header(chunk.content()),
                ChunkKind::Cte => {
                    let inner = unwrap_parens(chunk.content());
                    let translated = self.translator.translate(inner).await?;
                    format!("({})", strip_code_fence(&translated))
                }
                _ => {
                    let translated = self.translator.translate(chunk.content()).await?;
                    strip_code_fence(&translated)
                }
            };
            out.push(chunk.with_content(content));
        }
        Ok(out)
    }
}

/// `INSERT ... TABLE t` becomes `CREATE OR REPLACE TABLE `t` AS`.
fn rewrite_insert_header(head: &str) -> String {
    match header::insert_target(head) {
        Some(target) => format!("CREATE OR REPLACE TABLE `{target}` AS"),
        None => head.to_string(),
    }
}

/// `ALTER VIEW v AS` becomes `CREATE OR REPLACE VIEW `v` AS`.
fn rewrite_alter_view_header(head: &str) -> String {
    match header::alter_view_target(head) {
        Some(target) => format!("CREATE OR REPLACE VIEW `{target}` AS"),
        None => head.to_string(),
    }
}

fn unwrap_parens(definition: &str) -> &str {
    definition
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(definition)
        .trim()
}
