use super::classify::{self, StatementKind, Structure};
use super::{ChunkKind, SqlChunk, header, scanner};

/// Decompose `sql` into ordered, typed chunks.
///
/// Never fails: a unit whose structure cannot be delimited with confidence
/// comes back as one `main` chunk.
pub fn decompose(sql: &str) -> Vec<SqlChunk> {
    let sql = sql.trim();
    let stripped = scanner::strip_literals(sql);
    let structure = classify::classify_stripped(&stripped);
    tracing::debug!("[Chunker] Structure detected: {:?}", structure);

    let chunks = match structure {
        Structure::Batch => split_batch(sql),
        Structure::InsertSelect => split_wrapped(
            sql,
            header::split_insert,
            ChunkKind::InsertHeader,
            StatementKind::Insert,
        ),
        Structure::AlterView => split_wrapped(
            sql,
            header::split_alter_view,
            ChunkKind::AlterViewHeader,
            StatementKind::AlterView,
        ),
        Structure::Cte => split_ctes(sql).unwrap_or_else(|| vec![SqlChunk::main(sql)]),
        Structure::Union => split_unions(sql).unwrap_or_else(|| vec![SqlChunk::main(sql)]),
        Structure::Opaque => vec![SqlChunk::main(sql)],
    };

    tracing::info!("[Chunker] Decomposed into {} chunk(s)", chunks.len());
    for chunk in &chunks {
        tracing::debug!(
            "[Chunker]   #{} {} {}: {} chars",
            chunk.index(),
            chunk.kind(),
            chunk.name().unwrap_or(""),
            chunk.content().len()
        );
    }
    chunks
}

/// One chunk per top-level statement; members are not decomposed further.
fn split_batch(sql: &str) -> Vec<SqlChunk> {
    scanner::split_statements(sql)
        .into_iter()
        .enumerate()
        .map(|(i, stmt)| {
            let kind = ChunkKind::Statement(StatementKind::detect(stmt));
            SqlChunk::unnamed(kind, stmt, i)
        })
        .collect()
}

/// Header chunk at index 0 followed by the decomposed body.
fn split_wrapped(
    sql: &str,
    split: fn(&str) -> Option<header::HeadSplit<'_>>,
    header_kind: ChunkKind,
    fallback: StatementKind,
) -> Vec<SqlChunk> {
    let Some(parts) = split(sql) else {
        tracing::debug!("[Chunker] {} head not recognised, keeping whole statement", fallback);
        return vec![SqlChunk::unnamed(ChunkKind::Statement(fallback), sql, 0)];
    };

    let mut chunks = vec![SqlChunk::unnamed(header_kind, parts.head, 0)];
    chunks.extend(decompose_body(parts.body).into_iter().map(|c| c.shifted(1)));
    chunks
}

/// Body of an INSERT or ALTER VIEW. One level only: the body is split on
/// its CTEs or unions but its pieces are never revisited.
fn decompose_body(body: &str) -> Vec<SqlChunk> {
    let body = body.trim();
    let stripped = scanner::strip_literals(body);
    let split = if classify::has_leading_with(&stripped) {
        split_ctes(body)
    } else if !scanner::find_top_level_unions(body).is_empty() {
        split_unions(body)
    } else {
        None
    };
    split.unwrap_or_else(|| vec![SqlChunk::unnamed(ChunkKind::Select, body, 0)])
}

/// `WITH a AS (...), b AS (...) <main>` into `cte` chunks plus `main`.
///
/// `None` when no CTE matched, a definition has no closing paren, or
/// nothing follows the CTE list.
fn split_ctes(sql: &str) -> Option<Vec<SqlChunk>> {
    let bytes = sql.as_bytes();
    if !scanner::keyword_at(bytes, 0, b"WITH") {
        return None;
    }

    let mut chunks = Vec::new();
    let mut pos = 4;
    loop {
        let head = header::cte_head(&sql[pos..])?;
        let open = pos + head.open;
        let close = match scanner::find_matching_close(sql, open) {
            Some(close) => close,
            None => {
                tracing::warn!(
                    "[Chunker] CTE '{}' has no matching ')', keeping statement whole",
                    head.name
                );
                return None;
            }
        };
        chunks.push(SqlChunk::cte(head.name, &sql[open..=close], chunks.len()));
        pos = close + 1;

        let rest = sql[pos..].trim_start();
        match rest.strip_prefix(',') {
            Some(after) => pos = sql.len() - after.len(),
            None => break,
        }
    }

    let main = sql[pos..].trim();
    if chunks.is_empty() || main.is_empty() {
        return None;
    }
    chunks.push(SqlChunk::unnamed(ChunkKind::Main, main, chunks.len()));
    Some(chunks)
}

/// Top-level UNION branches into `union_first` + `union_part` chunks.
fn split_unions(sql: &str) -> Option<Vec<SqlChunk>> {
    let boundaries = scanner::find_top_level_unions(sql);
    let mut segments = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;
    for boundary in &boundaries {
        segments.push(&sql[start..boundary.start]);
        start = boundary.end;
    }
    segments.push(&sql[start..]);

    let segments: Vec<&str> = segments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.len() < 2 {
        return None;
    }

    Some(
        segments
            .into_iter()
            .enumerate()
            .map(|(i, seg)| {
                let kind = if i == 0 {
                    ChunkKind::UnionFirst
                } else {
                    ChunkKind::UnionPart
                };
                SqlChunk::unnamed(kind, seg, i)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(chunks: &[SqlChunk]) -> Vec<String> {
        chunks.iter().map(|c| c.kind().to_string()).collect()
    }

    #[test]
    fn test_cte_decomposition() {
        let chunks = decompose("WITH a AS (SELECT 1), b AS (SELECT 2) SELECT * FROM a, b");
        assert_eq!(kinds(&chunks), vec!["cte", "cte", "main"]);
        assert_eq!(chunks[0].name(), Some("a"));
        assert_eq!(chunks[0].content(), "(SELECT 1)");
        assert_eq!(chunks[1].name(), Some("b"));
        assert_eq!(chunks[2].content(), "SELECT * FROM a, b");
        assert_eq!(
            chunks.iter().map(SqlChunk::index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_cte_with_quoted_paren() {
        let chunks = decompose("WITH a AS (SELECT ')' AS x) SELECT x FROM a");
        assert_eq!(kinds(&chunks), vec!["cte", "main"]);
        assert_eq!(chunks[0].content(), "(SELECT ')' AS x)");
    }

    #[test]
    fn test_malformed_cte_degrades_to_main() {
        let sql = "WITH a AS (SELECT (1 FROM t";
        assert_eq!(decompose(sql), vec![SqlChunk::main(sql)]);

        let no_main = "WITH a AS (SELECT 1)";
        assert_eq!(decompose(no_main), vec![SqlChunk::main(no_main)]);

        let recursive = "WITH RECURSIVE r AS (SELECT 1) SELECT * FROM r";
        assert_eq!(decompose(recursive).len(), 1);
    }

    #[test]
    fn test_union_split() {
        let chunks = decompose("SELECT 1 UNION ALL SELECT 2 UNION SELECT 3");
        assert_eq!(kinds(&chunks), vec!["union_first", "union_part", "union_part"]);
        assert_eq!(chunks[2].content(), "SELECT 3");
    }

    #[test]
    fn test_statement_batch() {
        let chunks = decompose("USE db; SELECT 1; INSERT INTO t SELECT 2");
        assert_eq!(kinds(&chunks), vec!["use", "select", "insert"]);
        assert_eq!(chunks[2].content(), "INSERT INTO t SELECT 2");
    }

    #[test]
    fn test_insert_with_cte_body() {
        let chunks = decompose(
            "INSERT OVERWRITE TABLE dw.t\nWITH a AS (SELECT 1)\nSELECT * FROM a UNION ALL SELECT 2",
        );
        assert_eq!(kinds(&chunks), vec!["insert_header", "cte", "main"]);
        assert_eq!(chunks[0].content(), "INSERT OVERWRITE TABLE dw.t");
        assert_eq!(chunks[1].index(), 1);
        assert_eq!(chunks[2].index(), 2);
        // single level: the union inside main is not split
        assert_eq!(chunks[2].content(), "SELECT * FROM a UNION ALL SELECT 2");
    }

    #[test]
    fn test_insert_with_union_body() {
        let chunks = decompose("INSERT INTO TABLE t SELECT 1 UNION SELECT 2");
        assert_eq!(kinds(&chunks), vec!["insert_header", "union_first", "union_part"]);
    }

    #[test]
    fn test_insert_partition_falls_back_to_statement() {
        let sql = "INSERT OVERWRITE TABLE t PARTITION (dt='2024') SELECT 1";
        let chunks = decompose(sql);
        assert_eq!(kinds(&chunks), vec!["insert"]);
        assert_eq!(chunks[0].content(), sql);
    }

    #[test]
    fn test_alter_view_plain_body() {
        let chunks = decompose("ALTER VIEW v AS SELECT a FROM t");
        assert_eq!(kinds(&chunks), vec!["alter_view_header", "select"]);
        assert_eq!(chunks[1].content(), "SELECT a FROM t");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(decompose("   "), vec![SqlChunk::main("")]);
    }
}
