//! Hive → BigQuery table-name mapping.
//!
//! Loaded once from a CSV export by the host, then read-only. Share it
//! behind an `Arc`; lookups need no locking.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::chunker::scanner;
use crate::error::{ConvertError, ConvertResult};
use crate::oracle::{Normalized, TableNormalizer};

const HIVE_COLUMN: &str = "Hive 表名 (Original)";
const BIGQUERY_COLUMN: &str = "BigQuery 表名 (Mapped)";
/// Marks a Hive table with no BigQuery counterpart.
const NO_TARGET: &str = "无";

const NAME: &str = r"(?:`[^`]+`|[A-Za-z_][\w$]*)(?:\.(?:`[^`]+`|[A-Za-z_][\w$]*))*";

static TABLE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(FROM|JOIN|INTO|UPDATE|TABLE)\s+(?:TABLE\s+)?({NAME})"
    ))
    .unwrap()
});
static FROM_LIST_NEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^\s*(?:AS\s+)?(?:[A-Za-z_]\w*\s*)?,\s*({NAME})")).unwrap()
});
static CTE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bWITH\s+|,\s*)([A-Za-z_]\w*)\s+AS\s*\(").unwrap()
});

/// Words that can follow FROM/TABLE/INTO without being a table.
const NOT_TABLES: &[&str] = &[
    "if", "exists", "select", "with", "values", "lateral", "table", "partition", "overwrite",
    "unnest",
];
/// Functions whose arguments use `FROM` as a keyword.
const FROM_FUNCTIONS: &[&str] = &["extract", "substring", "trim", "position", "overlay"];

/// Case-insensitive map from Hive table names to BigQuery table names.
#[derive(Debug, Clone, Default)]
pub struct TableMapping {
    entries: BTreeMap<String, String>,
    targets: HashSet<String>,
}

impl TableMapping {
    /// Load from a CSV file. A missing file yields an empty mapping.
    pub fn from_csv_path(path: &Path) -> ConvertResult<Self> {
        if !path.exists() {
            tracing::warn!("Table mapping file not found: {}", path.display());
            return Ok(Self::default());
        }
        let mapping = File::open(path)
            .map_err(ConvertError::from)
            .and_then(Self::from_reader)
            .map_err(|e| ConvertError::Mapping(format!("{}: {e}", path.display())))?;
        tracing::info!("Loaded {} table mappings from {}", mapping.len(), path.display());
        Ok(mapping)
    }

    /// Load from CSV text with a header row.
    ///
    /// The named Hive/BigQuery columns are used when present, otherwise the
    /// first two columns.
    pub fn from_reader<R: Read>(reader: R) -> ConvertResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        };
        let (hive_col, bq_col) = match (column(HIVE_COLUMN), column(BIGQUERY_COLUMN)) {
            (Some(h), Some(b)) => (h, b),
            _ => (0, 1),
        };

        let mut pairs = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let hive = record.get(hive_col).unwrap_or_default();
            let bq = record.get(bq_col).unwrap_or_default();
            pairs.push((hive.to_string(), bq.to_string()));
        }
        Ok(Self::from_pairs(pairs))
    }

    /// Build from `(hive, bigquery)` pairs, skipping empty and `无` targets.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut mapping = Self::default();
        for (hive, bq) in pairs {
            let (hive, bq) = (hive.as_ref().trim(), bq.as_ref().trim());
            if hive.is_empty() || bq.is_empty() || bq == NO_TARGET {
                continue;
            }
            mapping.targets.insert(bq.trim_matches('`').to_lowercase());
            mapping.entries.insert(hive.to_lowercase(), bq.to_string());
        }
        mapping
    }

    pub fn get(&self, hive_table: &str) -> Option<&str> {
        self.entries
            .get(&lookup_key(hive_table))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// One `- hive → `bq`` line per entry.
    pub fn describe(&self) -> String {
        self.iter()
            .map(|(hive, bq)| format!("- {hive} → `{bq}`"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn resolve(&self, name: &str, ctes: &HashSet<String>) -> Resolution {
        let key = lookup_key(name);
        if self.targets.contains(&key) || ctes.contains(&key) {
            Resolution::Keep
        } else if let Some(bq) = self.entries.get(&key) {
            Resolution::Replace(format!("`{}`", bq.trim_matches('`')))
        } else {
            Resolution::Unmapped(name.replace('`', ""))
        }
    }
}

enum Resolution {
    Keep,
    Replace(String),
    Unmapped(String),
}

impl TableNormalizer for TableMapping {
    fn normalize(&self, sql: &str) -> Normalized {
        let stripped = scanner::strip_literals(sql);
        let ctes: HashSet<String> = CTE_NAME
            .captures_iter(&stripped)
            .map(|c| c[1].to_lowercase())
            .collect();

        let mut out = String::with_capacity(sql.len());
        let mut last = 0;
        let mut unmapped = BTreeSet::new();
        for (start, end) in table_references(&stripped) {
            match self.resolve(&sql[start..end], &ctes) {
                Resolution::Keep => {}
                Resolution::Replace(target) => {
                    out.push_str(&sql[last..start]);
                    out.push_str(&target);
                    last = end;
                }
                Resolution::Unmapped(name) => {
                    unmapped.insert(name);
                }
            }
        }
        out.push_str(&sql[last..]);

        if !unmapped.is_empty() {
            tracing::debug!("[Mapping] Unmapped tables: {:?}", unmapped);
        }
        Normalized {
            sql: out,
            unmapped: unmapped.into_iter().collect(),
        }
    }
}

/// Byte spans of table names referenced in `stripped`, in order.
fn table_references(stripped: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    for caps in TABLE_REF.captures_iter(stripped) {
        let (keyword, name) = (&caps[1], caps.get(2).map_or(0..0, |m| m.range()));
        if is_reserved(&stripped[name.clone()]) {
            continue;
        }
        let is_from = keyword.eq_ignore_ascii_case("FROM");
        if is_from && inside_from_function(stripped, name.start) {
            continue;
        }
        spans.push((name.start, name.end));

        if is_from {
            let mut pos = name.end;
            while let Some(next) = FROM_LIST_NEXT.captures(&stripped[pos..]) {
                let Some(m) = next.get(1) else { break };
                let (start, end) = (pos + m.start(), pos + m.end());
                if is_reserved(&stripped[start..end]) {
                    break;
                }
                spans.push((start, end));
                pos = end;
            }
        }
    }
    spans.sort_unstable();
    spans.dedup();
    spans
}

fn is_reserved(name: &str) -> bool {
    NOT_TABLES.iter().any(|w| name.eq_ignore_ascii_case(w))
}

/// Whether `pos` sits inside e.g. `EXTRACT(YEAR FROM ...)`.
fn inside_from_function(stripped: &str, pos: usize) -> bool {
    let bytes = stripped.as_bytes();
    let mut depth = 0usize;
    let mut i = pos;
    while i > 0 {
        i -= 1;
        match bytes[i] {
            b')' => depth += 1,
            b'(' if depth == 0 => {
                let before = stripped[..i].trim_end();
                let func_start = before
                    .bytes()
                    .rposition(|b| !scanner::is_ident_byte(b))
                    .map_or(0, |p| p + 1);
                let func = &before[func_start..];
                return FROM_FUNCTIONS.iter().any(|f| func.eq_ignore_ascii_case(f));
            }
            b'(' => depth -= 1,
            _ => {}
        }
    }
    false
}

fn lookup_key(name: &str) -> String {
    name.trim().replace('`', "").to_lowercase()
}
