//! Expansion of scheduler date macros (`${zdt...}`) before dry-run
//! validation.
//!
//! The scheduler substitutes these at run time, so the target engine never
//! sees them. For validation they are swapped for equivalent BigQuery date
//! expressions; anything unknown becomes a string placeholder.

use std::sync::LazyLock;

use regex::Regex;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).unwrap(),
        replacement,
    }
}

/// Ordered: specific formats first, then the generic fallbacks.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            r#"'?\$\{zdt\.addDay\((-?\d+)\)\.format\(['"]yyyy-MM-dd['"]\)\}'?"#,
            "FORMAT_DATE('%Y-%m-%d', DATE_ADD(CURRENT_DATE(), INTERVAL ${1} DAY))",
        ),
        rule(
            r#"'?\$\{zdt\.addDay\((-?\d+)\)\.format\(['"]yyyy-MM-dd HH:mm:ss['"]\)\}'?"#,
            "FORMAT_TIMESTAMP('%Y-%m-%d %H:%M:%S', TIMESTAMP_ADD(CURRENT_TIMESTAMP(), INTERVAL ${1} DAY))",
        ),
        rule(
            r#"'?\$\{zdt\.addDay\((-?\d+)\)\.format\(['"]yyyyMMdd['"]\)\}'?"#,
            "FORMAT_DATE('%Y%m%d', DATE_ADD(CURRENT_DATE(), INTERVAL ${1} DAY))",
        ),
        rule(
            r#"'?\$\{zdt\.format\(['"]yyyy-MM-dd['"]\)\}'?"#,
            "FORMAT_DATE('%Y-%m-%d', CURRENT_DATE())",
        ),
        rule(
            r#"'?\$\{zdt\.format\(['"]yyyy-MM-dd HH:mm:ss['"]\)\}'?"#,
            "FORMAT_TIMESTAMP('%Y-%m-%d %H:%M:%S', CURRENT_TIMESTAMP())",
        ),
        rule(
            r#"'?\$\{zdt\.format\(['"]yyyyMMdd['"]\)\}'?"#,
            "FORMAT_DATE('%Y%m%d', CURRENT_DATE())",
        ),
        rule(
            r"'?\$\{zdt\.[^}]+\}'?",
            "FORMAT_DATE('%Y-%m-%d', CURRENT_DATE())",
        ),
        rule(r"'?\$\{[^}]+\}'?", "'PLACEHOLDER'"),
    ]
});

/// Replace every `${...}` macro with something the target engine accepts.
pub fn expand_templates(sql: &str) -> String {
    if !sql.contains("${") {
        return sql.to_string();
    }
    let mut out = sql.to_string();
    for rule in RULES.iter() {
        out = rule.pattern.replace_all(&out, rule.replacement).into_owned();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_day_date() {
        assert_eq!(
            expand_templates(r#"WHERE dt = '${zdt.addDay(-1).format("yyyy-MM-dd")}'"#),
            "WHERE dt = FORMAT_DATE('%Y-%m-%d', DATE_ADD(CURRENT_DATE(), INTERVAL -1 DAY))"
        );
    }

    #[test]
    fn test_add_day_timestamp_and_compact() {
        let sql = r#"'${zdt.addDay(2).format("yyyy-MM-dd HH:mm:ss")}', '${zdt.addDay(0).format('yyyyMMdd')}'"#;
        assert_eq!(
            expand_templates(sql),
            "FORMAT_TIMESTAMP('%Y-%m-%d %H:%M:%S', TIMESTAMP_ADD(CURRENT_TIMESTAMP(), INTERVAL 2 DAY)), \
             FORMAT_DATE('%Y%m%d', DATE_ADD(CURRENT_DATE(), INTERVAL 0 DAY))"
        );
    }

    #[test]
    fn test_plain_format() {
        assert_eq!(
            expand_templates(r#"'${zdt.format("yyyyMMdd")}'"#),
            "FORMAT_DATE('%Y%m%d', CURRENT_DATE())"
        );
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(
            expand_templates("'${zdt.addMonth(1).format(\"yyyy-MM\")}'"),
            "FORMAT_DATE('%Y-%m-%d', CURRENT_DATE())"
        );
        assert_eq!(expand_templates("LIMIT ${n}"), "LIMIT 'PLACEHOLDER'");
    }

    #[test]
    fn test_no_macros_untouched() {
        let sql = "SELECT '$' AS d FROM t";
        assert_eq!(expand_templates(sql), sql);
    }
}
