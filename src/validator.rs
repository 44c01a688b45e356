//! Read-only SQL sanitizer.
//!
//! This is a keyword denylist, not a parser. It rejects anything that does
//! not start with `SELECT` and anything that mentions a mutating or
//! administrative keyword as a whole word, but it cannot prove a statement is
//! harmless. Execution additionally happens inside a read-only transaction.
//!
//! Statements are not tokenized, so a `;` anywhere but the end is treated as
//! a statement separator, even inside a string literal such as `'a;b'`. Such
//! queries are rejected as [`SqlValidationError::MultipleStatements`].

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub const DEFAULT_MAX_SQL_LENGTH: usize = 5000;

pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "TRUNCATE", "ALTER", "CREATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE", "CALL", "LOAD", "OUTFILE", "INFILE",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlValidationError {
    #[error("query is empty")]
    Empty,

    #[error("only SELECT queries are allowed")]
    NotSelect,

    #[error("forbidden keyword {0}")]
    ForbiddenKeyword(String),

    #[error("multiple statements are not allowed")]
    MultipleStatements,

    #[error("query does not reference any allowed table")]
    UnknownTable,

    #[error("query is {len} characters long, the limit is {max}")]
    TooLong { len: usize, max: usize },
}

fn block_comment_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment regex should compile"))
}

fn line_comment_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"--[^\n]*").expect("line comment regex should compile"))
}

fn select_prefix_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"(?i)^SELECT\b").expect("select prefix regex should compile"))
}

fn forbidden_keyword_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b(?:{})\b", FORBIDDEN_KEYWORDS.join("|")))
            .expect("forbidden keyword regex should compile")
    })
}

fn whitespace_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex should compile"))
}

/// Splits SQL into identifier-like words, the same boundaries `\b` uses.
pub(crate) fn words(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
}

#[derive(Debug, Clone)]
pub struct SqlValidator {
    allowed_tables: Vec<String>,
    max_length: usize,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new(Vec::new(), DEFAULT_MAX_SQL_LENGTH)
    }
}

impl SqlValidator {
    /// An empty `allowed_tables` disables the table allow-list check.
    pub fn new(allowed_tables: Vec<String>, max_length: usize) -> Self {
        Self {
            allowed_tables,
            max_length,
        }
    }

    /// Returns the cleaned statement or the first check it failed.
    /// Running it again on its own output yields the same string.
    pub fn validate(&self, candidate: &str) -> Result<String, SqlValidationError> {
        let without_blocks = block_comment_regex().replace_all(candidate, " ");
        let without_comments = line_comment_regex().replace_all(&without_blocks, "");
        let sql = without_comments.trim();

        if sql.is_empty() {
            return Err(SqlValidationError::Empty);
        }
        if !select_prefix_regex().is_match(sql) {
            return Err(SqlValidationError::NotSelect);
        }
        if let Some(found) = forbidden_keyword_regex().find(sql) {
            return Err(SqlValidationError::ForbiddenKeyword(
                found.as_str().to_uppercase(),
            ));
        }

        let sql = sql.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if sql.contains(';') {
            return Err(SqlValidationError::MultipleStatements);
        }

        if !self.allowed_tables.is_empty() && !self.references_allowed_table(sql) {
            return Err(SqlValidationError::UnknownTable);
        }

        let sql = whitespace_regex().replace_all(sql, " ").into_owned();

        let len = sql.chars().count();
        if len > self.max_length {
            return Err(SqlValidationError::TooLong {
                len,
                max: self.max_length,
            });
        }

        Ok(sql)
    }

    fn references_allowed_table(&self, sql: &str) -> bool {
        words(sql).any(|word| {
            self.allowed_tables
                .iter()
                .any(|table| table.eq_ignore_ascii_case(word))
        })
    }
}
