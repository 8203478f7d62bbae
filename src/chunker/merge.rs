use super::classify::StatementKind;
use super::{ChunkKind, SqlChunk, scanner};

const UNION_SEPARATOR: &str = "\nUNION ALL\n";
const STATEMENT_SEPARATOR: &str = ";\n";

/// Rebuild one SQL string from (translated) chunks.
///
/// Chunks are ordered by index, never by content. `use` chunks are dropped.
/// Every union join is rendered as `UNION ALL`, whatever the source had.
pub fn reassemble(chunks: &[SqlChunk]) -> String {
    let mut ordered: Vec<&SqlChunk> = chunks
        .iter()
        .filter(|c| c.kind() != ChunkKind::Statement(StatementKind::Use))
        .collect();

    match ordered.as_slice() {
        [] => return String::new(),
        [only] => return only.content().to_string(),
        _ => {}
    }
    ordered.sort_by_key(|c| c.index());

    let mut header = None;
    let mut ctes = Vec::new();
    let mut body = Vec::new();
    let mut statements = Vec::new();
    let mut has_union = false;

    for chunk in ordered {
        match chunk.kind() {
            kind if kind.is_header() => header = Some(chunk.content()),
            ChunkKind::Cte => ctes.push(chunk),
            ChunkKind::Statement(_) => statements.push(chunk.content()),
            kind => {
                has_union |= kind.is_union();
                body.push(chunk.content());
            }
        }
    }

    let mut parts: Vec<String> = Vec::new();
    if let Some(header) = header {
        parts.push(header.to_string());
    }
    if !ctes.is_empty() {
        parts.push(render_ctes(&ctes));
    }
    if !body.is_empty() {
        let separator = if has_union { UNION_SEPARATOR } else { "\n" };
        parts.push(body.join(separator));
    }
    if !statements.is_empty() {
        parts.push(join_statements(&statements));
    }
    parts.join("\n")
}

/// `;\n`-joined, with the `;` moved to its own line after a trailing `--`
/// comment.
fn join_statements(statements: &[&str]) -> String {
    let mut out = String::new();
    let mut previous: Option<&str> = None;
    for &stmt in statements {
        if let Some(prev) = previous {
            if scanner::ends_in_line_comment(prev) {
                out.push('\n');
            }
            out.push_str(STATEMENT_SEPARATOR);
        }
        out.push_str(stmt);
        previous = Some(stmt);
    }
    out
}

/// `WITH a AS (...), b AS (...)`
fn render_ctes(ctes: &[&SqlChunk]) -> String {
    ctes.iter()
        .enumerate()
        .map(|(i, cte)| {
            let name = cte.name().unwrap_or_default();
            if i == 0 {
                format!("WITH {name} AS {}", cte.content())
            } else {
                format!(", {name} AS {}", cte.content())
            }
        })
        .collect()
}
