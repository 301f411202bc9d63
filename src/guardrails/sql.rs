//! SELECT-only enforcement for forwarded queries.
//!
//! This is not a SQL parser. It strips comments, refuses scripts and checks
//! the leading keyword; the BigQuery dry run then confirms the statement type.
//! String literals and quoted identifiers are skipped while scanning so a
//! `--`, `#` or `;` inside them is left alone.

use crate::error::ToolError;

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Code(&'a str),
    Quoted(&'a str),
    Comment,
}

fn segments(sql: &str) -> Result<Vec<Segment<'_>>, ToolError> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut code_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                flush(&mut out, sql, code_start, i);
                i = line_end(bytes, i);
                out.push(Segment::Comment);
                code_start = i;
            }
            b'#' => {
                flush(&mut out, sql, code_start, i);
                i = line_end(bytes, i);
                out.push(Segment::Comment);
                code_start = i;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                flush(&mut out, sql, code_start, i);
                let close = find(bytes, i + 2, b"*/")
                    .ok_or_else(|| ToolError::invalid("SQL has an unterminated /* comment"))?;
                i = close + 2;
                out.push(Segment::Comment);
                code_start = i;
            }
            quote @ (b'\'' | b'"' | b'`') => {
                flush(&mut out, sql, code_start, i);
                let end = quoted_end(bytes, i, quote)
                    .ok_or_else(|| ToolError::invalid("SQL has an unterminated quoted string"))?;
                out.push(Segment::Quoted(&sql[i..end]));
                i = end;
                code_start = i;
            }
            _ => i += 1,
        }
    }
    flush(&mut out, sql, code_start, bytes.len());
    Ok(out)
}

fn flush<'a>(out: &mut Vec<Segment<'a>>, sql: &'a str, from: usize, to: usize) {
    if to > from {
        out.push(Segment::Code(&sql[from..to]));
    }
}

/// Index of the newline ending the line that contains `from` (or the end).
fn line_end(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| from + p)
}

fn find(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// End (exclusive) of the literal opening at `start`. Handles triple-quoted
/// strings and backslash escapes; backtick identifiers have no escapes.
fn quoted_end(bytes: &[u8], start: usize, quote: u8) -> Option<usize> {
    let escapes = quote != b'`';
    let triple = escapes && bytes.get(start..start + 3) == Some(&[quote, quote, quote][..]);
    let mut j = start + if triple { 3 } else { 1 };

    while j < bytes.len() {
        if escapes && bytes[j] == b'\\' {
            j += 2;
            continue;
        }
        if triple {
            if bytes.get(j..j + 3) == Some(&[quote, quote, quote][..]) {
                return Some(j + 3);
            }
        } else if bytes[j] == quote {
            return Some(j + 1);
        }
        j += 1;
    }
    None
}

/// Strip `/* */`, `--` and `#` comments and surrounding whitespace.
pub fn normalize_sql(sql: &str) -> Result<String, ToolError> {
    if sql.trim().is_empty() {
        return Err(ToolError::invalid("SQL is empty"));
    }

    let mut cleaned = String::with_capacity(sql.len());
    for segment in segments(sql)? {
        match segment {
            Segment::Code(s) | Segment::Quoted(s) => cleaned.push_str(s),
            Segment::Comment => cleaned.push(' '),
        }
    }

    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(ToolError::invalid("SQL is empty after removing comments"));
    }
    Ok(cleaned.to_string())
}

/// Allow at most trailing semicolons; any other statement separator means a
/// script. Returns the statement without the trailing semicolons.
pub fn reject_multiple_statements(sql: &str) -> Result<&str, ToolError> {
    let mut s = sql.trim();
    while let Some(rest) = s.strip_suffix(';') {
        s = rest.trim_end();
    }

    let has_separator = segments(s)?
        .iter()
        .any(|seg| matches!(seg, Segment::Code(code) if code.contains(';')));
    if has_separator {
        return Err(ToolError::rejected(
            "Multiple statements are not allowed (possible script detected). Provide a single SELECT query.",
        ));
    }
    if s.is_empty() {
        return Err(ToolError::invalid("SQL is empty"));
    }
    Ok(s)
}

/// The normalized query must start with the `SELECT` keyword (any case).
pub fn ensure_select(sql: &str) -> Result<(), ToolError> {
    let head = sql.trim_start();
    let is_select = head
        .get(..6)
        .is_some_and(|kw| kw.eq_ignore_ascii_case("select"))
        && head[6..]
            .chars()
            .next()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'));

    if is_select {
        Ok(())
    } else {
        let first = head.split_whitespace().next().unwrap_or_default();
        Err(ToolError::rejected(format!(
            "Only SELECT queries are allowed. Query starts with '{}'.",
            crate::gcp::truncate(first, 32)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_all_comment_styles() {
        let sql = "/* header */\n-- note\n# hash\nSELECT a, -- trailing\n b FROM t /* inline */";
        assert_eq!(normalize_sql(sql).unwrap(), "SELECT a,  \n b FROM t");
    }

    #[test]
    fn block_comment_acts_as_whitespace() {
        assert_eq!(normalize_sql("SELECT/**/1").unwrap(), "SELECT 1");
    }

    #[test]
    fn comment_markers_inside_literals_are_kept() {
        let sql = "SELECT '--not a comment', \"#nor this\", `weird--col` FROM t";
        assert_eq!(normalize_sql(sql).unwrap(), sql);
    }

    #[test]
    fn escaped_quotes_and_triple_quotes() {
        let sql = r#"SELECT 'it\'s -- fine', """multi
line # text""" FROM t"#;
        assert_eq!(normalize_sql(sql).unwrap(), sql);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(matches!(normalize_sql("   "), Err(ToolError::InvalidArgument(_))));
        let err = normalize_sql("-- only a comment\n/* and another */").unwrap_err();
        assert_eq!(err.to_string(), "SQL is empty after removing comments");
    }

    #[test]
    fn unterminated_constructs_are_rejected() {
        assert!(normalize_sql("SELECT 1 /* open").is_err());
        assert!(normalize_sql("SELECT 'open").is_err());
    }

    #[test]
    fn trailing_semicolons_are_allowed() {
        assert_eq!(reject_multiple_statements("SELECT 1;").unwrap(), "SELECT 1");
        assert_eq!(reject_multiple_statements("SELECT 1 ; ;; ").unwrap(), "SELECT 1");
    }

    #[test]
    fn scripts_are_rejected() {
        let err = reject_multiple_statements("SELECT 1; DROP TABLE t").unwrap_err();
        assert!(matches!(err, ToolError::PolicyRejected(_)));
    }

    #[test]
    fn semicolon_inside_literal_is_not_a_separator() {
        assert_eq!(
            reject_multiple_statements("SELECT 'a;b' AS x;").unwrap(),
            "SELECT 'a;b' AS x"
        );
    }

    #[test]
    fn select_in_any_case_is_accepted() {
        for sql in ["SELECT 1", "select 1", "SeLeCt *", "SELECT\n1", "SELECT*FROM t", "select"] {
            assert!(ensure_select(sql).is_ok(), "{sql}");
        }
    }

    #[test]
    fn anything_else_is_rejected() {
        for sql in [
            "INSERT INTO t VALUES (1)",
            "UPDATE t SET a = 1",
            "DELETE FROM t WHERE true",
            "MERGE t USING s ON true WHEN MATCHED THEN DELETE",
            "CREATE TABLE t (a INT64)",
            "DROP TABLE t",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "(SELECT 1)",
            "SELECTED",
            "select_me()",
            "CALL proc()",
            "EXPORT DATA OPTIONS() AS SELECT 1",
        ] {
            let err = ensure_select(sql).unwrap_err();
            assert!(matches!(err, ToolError::PolicyRejected(_)), "{sql}");
        }
    }

    #[test]
    fn comments_cannot_smuggle_a_select_prefix() {
        let cleaned = normalize_sql("/* SELECT */ DELETE FROM t WHERE true").unwrap();
        assert!(ensure_select(&cleaned).is_err());
        let cleaned = normalize_sql("-- SELECT\nDROP TABLE t").unwrap();
        assert!(ensure_select(&cleaned).is_err());
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        assert!(ensure_select("żółw").is_err());
        assert!(ensure_select("SÉLECT 1").is_err());
        assert_eq!(normalize_sql("SELECT 'żółw' -- ok").unwrap(), "SELECT 'żółw'");
    }
}
