//! Quote-aware lexical scanning over SQL text.
//!
//! Every structural detector in the chunker goes through these helpers so
//! that parentheses, semicolons and keywords inside string literals or
//! comments never influence a decomposition decision.
//!
//! All positions are byte offsets. The only bytes that change scanner state
//! (`'`, `"`, `\`, `-`, `/`, `*`, `\n`, `(`, `)`, `;`) are ASCII, so every
//! offset reported here sits on a UTF-8 character boundary and can be used to
//! slice the input.

/// What a scanned byte belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    Code,
    /// Inside a quoted literal, delimiters included.
    Literal,
    /// Inside a comment, delimiters included.
    Comment,
    /// Second byte of `--` or `/*`; the byte before it opened the comment.
    CommentOpen,
}

impl Lexeme {
    fn is_code(self) -> bool {
        self == Self::Code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comment {
    Line,
    Block,
}

/// Literal and comment tracking state machine.
///
/// Single- and double-quoted literals are recognised. A backslash marks the
/// following byte as escaped; an escaped quote never toggles literal state.
/// Outside literals, `--` runs to the end of the line and `/* */` to its
/// terminator; quotes inside a comment are ignored.
#[derive(Debug, Default, Clone, Copy)]
struct ScanState {
    quote: Option<u8>,
    comment: Option<Comment>,
    escaped: bool,
    prev: u8,
}

impl ScanState {
    fn step(&mut self, b: u8) -> Lexeme {
        let prev = std::mem::replace(&mut self.prev, b);

        if let Some(comment) = self.comment {
            match comment {
                Comment::Line if b == b'\n' => {
                    self.comment = None;
                    return Lexeme::Code;
                }
                Comment::Block if prev == b'*' && b == b'/' => {
                    self.comment = None;
                    self.prev = 0;
                }
                _ => {}
            }
            return Lexeme::Comment;
        }

        let in_quote = if self.quote.is_some() {
            Lexeme::Literal
        } else {
            Lexeme::Code
        };
        if self.escaped {
            self.escaped = false;
            self.prev = 0;
            return in_quote;
        }
        if b == b'\\' {
            self.escaped = true;
            return in_quote;
        }

        match self.quote {
            Some(q) => {
                if b == q {
                    self.quote = None;
                }
                Lexeme::Literal
            }
            None if b == b'\'' || b == b'"' => {
                self.quote = Some(b);
                Lexeme::Literal
            }
            None if prev == b'-' && b == b'-' => {
                self.comment = Some(Comment::Line);
                Lexeme::CommentOpen
            }
            None if prev == b'/' && b == b'*' => {
                self.comment = Some(Comment::Block);
                // `/*/` does not close
                self.prev = 0;
                Lexeme::CommentOpen
            }
            None => Lexeme::Code,
        }
    }

    fn in_literal(&self) -> bool {
        self.quote.is_some()
    }
}

/// A top-level `UNION [ALL | DISTINCT]` keyword occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnionBoundary {
    /// Offset of the `U` of `UNION`.
    pub start: usize,
    /// Offset one past the keyword (past `ALL` or `DISTINCT` when present).
    pub end: usize,
    /// Whether the separator was `UNION ALL`.
    pub all: bool,
}

/// Whether the byte at `position` lies inside a quoted literal.
///
/// An opening quote is not inside its own literal; a closing quote is.
/// Quotes inside comments open nothing. Positions past the end report the
/// state at end of input.
pub fn is_inside_string_literal(text: &str, position: usize) -> bool {
    let mut state = ScanState::default();
    for &b in text.as_bytes().iter().take(position) {
        state.step(b);
    }
    state.in_literal()
}

/// Find the `)` matching the `(` at `open`.
///
/// Nesting depth is tracked only outside literals and comments. Returns `None` when the
/// byte at `open` is not `(` or when depth never returns to zero.
pub fn find_matching_close(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') {
        return None;
    }

    let mut state = ScanState::default();
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if !state.step(b).is_code() {
            continue;
        }
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether `text` ends inside a `--` comment, so anything appended on the
/// same line would be commented out.
pub fn ends_in_line_comment(text: &str) -> bool {
    let mut state = ScanState::default();
    for &b in text.as_bytes() {
        state.step(b);
    }
    state.comment == Some(Comment::Line)
}

/// Blank out the contents of every string literal and every comment.
///
/// Quote delimiters are kept, comments are blanked whole, and every blanked
/// byte becomes a space, so the result has exactly the same byte offsets as
/// `text`.
pub fn strip_literals(text: &str) -> String {
    let mut state = ScanState::default();
    let mut out = Vec::with_capacity(text.len());
    for &b in text.as_bytes() {
        let was_inside = state.in_literal();
        match state.step(b) {
            Lexeme::Comment => out.push(b' '),
            Lexeme::CommentOpen => {
                if let Some(opener) = out.last_mut() {
                    *opener = b' ';
                }
                out.push(b' ');
            }
            Lexeme::Literal if was_inside && state.in_literal() => out.push(b' '),
            _ => out.push(b),
        }
    }
    // Only whole characters are ever blanked, so this never replaces anything.
    String::from_utf8_lossy(&out).into_owned()
}

/// Split on `;` outside literals, comments and parentheses.
///
/// Pieces are trimmed; pieces holding nothing but whitespace and comments
/// are dropped.
pub fn split_statements(text: &str) -> Vec<&str> {
    let mut state = ScanState::default();
    let mut depth = 0usize;
    let mut start = 0;
    let mut statements = Vec::new();

    for (i, &b) in text.as_bytes().iter().enumerate() {
        if !state.step(b).is_code() {
            continue;
        }
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b';' if depth == 0 => {
                push_trimmed(&mut statements, &text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    push_trimmed(&mut statements, &text[start..]);
    statements
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !strip_literals(piece).trim().is_empty() {
        out.push(piece);
    }
}

/// Find every `UNION [ALL | DISTINCT]` at parenthesis depth zero and outside
/// literals and comments.
///
/// The keyword must stand alone: `union_id` or `reunion` never match.
pub fn find_top_level_unions(text: &str) -> Vec<UnionBoundary> {
    let bytes = text.as_bytes();
    let mut state = ScanState::default();
    let mut depth = 0usize;
    let mut found = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if !state.step(b).is_code() {
            i += 1;
            continue;
        }
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && keyword_at(bytes, i, b"UNION") => {
                let mut end = i + 5;
                let mut all = false;
                let mut j = end;
                while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                if j > end {
                    if keyword_at(bytes, j, b"ALL") {
                        end = j + 3;
                        all = true;
                    } else if keyword_at(bytes, j, b"DISTINCT") {
                        end = j + 8;
                    }
                }
                found.push(UnionBoundary { start: i, end, all });
                // Keyword bytes are plain letters and whitespace.
                for &k in &bytes[i + 1..end] {
                    state.step(k);
                }
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    found
}

/// Case-insensitive keyword match at `at` with identifier boundaries on
/// both sides.
pub(crate) fn keyword_at(bytes: &[u8], at: usize, keyword: &[u8]) -> bool {
    let end = at + keyword.len();
    if end > bytes.len() || !bytes[at..end].eq_ignore_ascii_case(keyword) {
        return false;
    }
    let before_ok = at == 0 || !is_ident_byte(bytes[at - 1]);
    let after_ok = end == bytes.len() || !is_ident_byte(bytes[end]);
    before_ok && after_ok
}

pub(crate) fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_paren_does_not_confuse_matching() {
        let sql = "foo('(', bar)";
        assert_eq!(find_matching_close(sql, 3), Some(12));
    }

    #[test]
    fn test_double_quoted_and_escaped_quotes() {
        let sql = r#"f("a)b", 'it\'s )', x)"#;
        assert_eq!(find_matching_close(sql, 1), Some(sql.len() - 1));
    }

    #[test]
    fn test_unbalanced_returns_none() {
        assert_eq!(find_matching_close("(SELECT (1)", 0), None);
        assert_eq!(find_matching_close("SELECT 1", 0), None);
    }

    #[test]
    fn test_inside_literal() {
        let sql = "SELECT 'a;b' FROM t";
        assert!(!is_inside_string_literal(sql, 7)); // opening quote
        assert!(is_inside_string_literal(sql, 9)); // the ';'
        assert!(is_inside_string_literal(sql, 11)); // closing quote
        assert!(!is_inside_string_literal(sql, 13));
    }

    #[test]
    fn test_strip_literals_keeps_offsets() {
        let sql = "SELECT '${zdt.format(\"yyyy\")} UNION' AS d, \"été\" FROM t";
        let stripped = strip_literals(sql);
        assert_eq!(stripped.len(), sql.len());
        assert!(!stripped.contains("UNION"));
        assert!(!stripped.contains("zdt"));
        assert!(stripped.ends_with("FROM t"));
    }

    #[test]
    fn test_split_statements_respects_literals_and_parens() {
        let sql = "USE db; SELECT ';' FROM t; SELECT f(a; b) ;; ";
        assert_eq!(
            split_statements(sql),
            vec!["USE db", "SELECT ';' FROM t", "SELECT f(a; b)"]
        );
    }

    #[test]
    fn test_top_level_unions() {
        let sql = "SELECT 1 UNION ALL SELECT 2 union\nSELECT 3";
        let found = find_top_level_unions(sql);
        assert_eq!(found.len(), 2);
        assert!(found[0].all);
        assert!(!found[1].all);
        assert_eq!(&sql[found[0].start..found[0].end], "UNION ALL");
        assert_eq!(&sql[found[1].start..found[1].end], "union");
    }

    #[test]
    fn test_union_distinct_consumes_qualifier() {
        let sql = "SELECT 1 UNION DISTINCT SELECT 2 UNION distinctive";
        let found = find_top_level_unions(sql);
        assert_eq!(found.len(), 2);
        assert!(!found[0].all);
        assert_eq!(&sql[found[0].start..found[0].end], "UNION DISTINCT");
        assert_eq!(&sql[found[1].start..found[1].end], "UNION");
    }

    #[test]
    fn test_apostrophe_in_line_comment_opens_nothing() {
        let sql = "-- don't touch\nSELECT 'x;y' AS a FROM t; SELECT 2";
        assert_eq!(
            split_statements(sql),
            vec!["-- don't touch\nSELECT 'x;y' AS a FROM t", "SELECT 2"]
        );
        assert!(is_inside_string_literal(sql, 24));
        assert!(!is_inside_string_literal(sql, 9));
    }

    #[test]
    fn test_block_comments_are_opaque() {
        let sql = "f(a /* it's ) ; */, b)";
        assert_eq!(find_matching_close(sql, 1), Some(sql.len() - 1));
        assert_eq!(split_statements(sql), vec![sql]);
        assert_eq!(find_matching_close("(/*/ ) */)", 0), Some(9));
    }

    #[test]
    fn test_comment_only_pieces_are_dropped() {
        assert_eq!(
            split_statements("SELECT 1; -- done\n/* tail */"),
            vec!["SELECT 1"]
        );
    }

    #[test]
    fn test_ends_in_line_comment() {
        assert!(ends_in_line_comment("SELECT 1 -- note"));
        assert!(!ends_in_line_comment("SELECT 1 -- note\nFROM t"));
        assert!(!ends_in_line_comment("SELECT '--' FROM t"));
        assert!(!ends_in_line_comment("SELECT 1 /* -- */"));
    }

    #[test]
    fn test_strip_blanks_comments() {
        let sql = "SELECT 1 -- UNION x\n/* WITH */ FROM t";
        let stripped = strip_literals(sql);
        assert_eq!(stripped.len(), sql.len());
        assert!(!stripped.contains("UNION"));
        assert!(!stripped.contains("WITH"));
        assert!(!stripped.contains("--"));
        assert!(stripped.starts_with("SELECT 1"));
        assert!(stripped.ends_with("\n           FROM t"));
        assert!(find_top_level_unions(sql).is_empty());
    }

    #[test]
    fn test_nested_and_quoted_unions_ignored() {
        let sql = "SELECT * FROM (SELECT 1 UNION SELECT 2) x WHERE y = 'UNION' AND union_id = 1";
        assert!(find_top_level_unions(sql).is_empty());
    }
}
