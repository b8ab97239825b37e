// File: src/parser.rs
//
// Parsing SQL execution records and fingerprinting normalized queries

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::ExecutionPoint;

// SQL string literal with '' escapes
static STRING_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").expect("string literal regex"));
static NUMBER_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("number literal regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// One successfully parsed log line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExecution {
    /// First 16 hex chars of the MD5 of the normalized query.
    pub query_hash: String,
    /// Normalized SQL with literals replaced by `?`.
    pub query_pattern: String,
    pub point: ExecutionPoint,
}

/// Parser for the pipe-delimited SQL execution records the monitored
/// application writes:
///
/// ```text
/// <ISO-8601 timestamp>|<duration_ms>|<row_count>|<method>|<sql>
/// ```
///
/// Blank lines are ignored; anything else that fails to parse counts
/// as a parse error at the tailer.
#[derive(Debug, Default)]
pub struct QueryLogParser;

impl QueryLogParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_line(&self, line: &str) -> Option<ParsedExecution> {
        let mut parts = line.splitn(5, '|');
        let timestamp = parts.next()?.trim();
        let duration_ms = parts.next()?.trim().parse::<i64>().ok()?;
        let row_count = parts.next()?.trim().parse::<i64>().ok()?;
        let method = parts.next()?.trim();
        let sql = parts.next()?.trim();
        if method.is_empty() || sql.is_empty() {
            return None;
        }

        let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(timestamp)
            .ok()?
            .with_timezone(&Utc);

        let query_pattern = normalize_query(sql);
        Some(ParsedExecution {
            query_hash: fingerprint(&query_pattern),
            query_pattern,
            point: ExecutionPoint {
                timestamp,
                duration_ms,
                row_count,
                method: method.to_string(),
            },
        })
    }
}

/// Replace string and numeric literals with `?` and collapse
/// whitespace, so executions of the same statement share a pattern
/// regardless of their bind values.
pub fn normalize_query(sql: &str) -> String {
    let no_strings = STRING_LITERAL.replace_all(sql.trim(), "?");
    let no_numbers = NUMBER_LITERAL.replace_all(&no_strings, "?");
    WHITESPACE.replace_all(&no_numbers, " ").into_owned()
}

/// First 16 hex chars of the MD5 of the normalized query.
pub fn fingerprint(normalized: &str) -> String {
    let digest = format!("{:x}", md5::compute(normalized.as_bytes()));
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_collapse_to_placeholders() {
        let normalized = normalize_query(
            "SELECT * FROM evt_raw_events WHERE message_id = 'abc''d'  AND id_event > 42",
        );
        assert_eq!(
            normalized,
            "SELECT * FROM evt_raw_events WHERE message_id = ? AND id_event > ?"
        );
    }

    #[test]
    fn identifiers_with_digits_survive() {
        let normalized = normalize_query("SELECT col1 FROM t2 WHERE x = 3.14");
        assert_eq!(normalized, "SELECT col1 FROM t2 WHERE x = ?");
    }

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = fingerprint("SELECT 1");
        let b = fingerprint("SELECT 1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, fingerprint("SELECT 2"));
    }

    #[test]
    fn same_statement_different_binds_share_a_hash() {
        let first = normalize_query("SELECT * FROM t WHERE id = 1");
        let second = normalize_query("SELECT * FROM t WHERE id = 999");
        assert_eq!(fingerprint(&first), fingerprint(&second));
    }

    #[test]
    fn well_formed_lines_parse() {
        let parser = QueryLogParser::new();
        let parsed = parser
            .parse_line("2026-07-30T12:00:01.123Z|45|10|statement|SELECT * FROM t WHERE id = 7")
            .unwrap();
        assert_eq!(parsed.point.duration_ms, 45);
        assert_eq!(parsed.point.row_count, 10);
        assert_eq!(parsed.point.method, "statement");
        assert_eq!(parsed.query_pattern, "SELECT * FROM t WHERE id = ?");
        assert_eq!(parsed.query_hash.len(), 16);
    }

    #[test]
    fn sql_containing_pipes_is_kept_whole() {
        let parser = QueryLogParser::new();
        let parsed = parser
            .parse_line("2026-07-30T12:00:01Z|5|0|statement|SELECT a || b FROM t")
            .unwrap();
        assert_eq!(parsed.query_pattern, "SELECT a || b FROM t");
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let parser = QueryLogParser::new();
        assert!(parser.parse_line("").is_none());
        assert!(parser.parse_line("not a log line").is_none());
        assert!(parser.parse_line("2026-07-30T12:00:01Z|forty-five|10|statement|SELECT 1").is_none());
        assert!(parser.parse_line("yesterday|45|10|statement|SELECT 1").is_none());
        assert!(parser.parse_line("2026-07-30T12:00:01Z|45|10|statement|").is_none());
    }
}
