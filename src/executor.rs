use std::borrow::Cow;
use std::sync::Arc;

use tracing::{debug, info};

use crate::database::{Database, Row};
use crate::error::PipelineError;
use crate::pivot::PivotQueryBuilder;
use crate::validator::words;

pub const DEFAULT_ROW_LIMIT: usize = 100;
pub const DEFAULT_MAX_RESULT_CHARS: usize = 6000;

pub const TRUNCATION_NOTICE: &str =
    "\n... [result truncated, please narrow your question to see more specific data]";

const AGGREGATE_MARKERS: &[&str] = &["COUNT(", "SUM(", "AVG(", "MAX(", "MIN(", "GROUP BY"];

/// Appends `LIMIT <limit>` to a SELECT that has neither a LIMIT clause nor
/// an aggregate.
pub fn apply_row_limit(sql: &str, limit: usize) -> Cow<'_, str> {
    let upper = sql.to_uppercase();
    let is_select = words(&upper).any(|word| word == "SELECT");
    let has_limit = words(&upper).any(|word| word == "LIMIT");
    let aggregates = AGGREGATE_MARKERS.iter().any(|marker| upper.contains(marker));

    if is_select && !has_limit && !aggregates {
        Cow::Owned(format!("{} LIMIT {limit}", sql.trim_end()))
    } else {
        Cow::Borrowed(sql)
    }
}

/// Cuts `text` to `budget` characters and appends [`TRUNCATION_NOTICE`].
pub fn truncate_result(text: &str, budget: usize) -> Cow<'_, str> {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => Cow::Owned(format!("{}{TRUNCATION_NOTICE}", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}

/// One JSON object per line, the shape the answer prompt expects.
pub fn rows_to_text(rows: &[Row]) -> String {
    rows.iter()
        .map(|row| serde_json::Value::Object(row.clone()).to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub sql: String,
    pub rows: Vec<Row>,
    pub text: String,
    pub truncated: bool,
}

pub struct QueryExecutor {
    db: Arc<dyn Database>,
    row_limit: usize,
    max_result_chars: usize,
    pivot: Option<PivotQueryBuilder>,
}

impl QueryExecutor {
    pub fn new(db: Arc<dyn Database>, row_limit: usize, max_result_chars: usize) -> Self {
        Self {
            db,
            row_limit,
            max_result_chars,
            pivot: None,
        }
    }

    /// Queries against the logical pivot relation are expanded right before
    /// they run.
    pub fn with_pivot(mut self, pivot: Option<PivotQueryBuilder>) -> Self {
        self.pivot = pivot;
        self
    }

    /// The statement that actually runs for a validated query. The row limit
    /// is decided on the query as written, before pivot expansion adds its
    /// own `MAX(..)` and `GROUP BY`.
    pub fn prepare(&self, sql: &str) -> String {
        let limited = apply_row_limit(sql, self.row_limit);
        match &self.pivot {
            Some(pivot) => pivot.expand(&limited),
            None => limited.into_owned(),
        }
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryOutput, PipelineError> {
        let sql = self.prepare(sql);
        debug!(%sql, "executing query");

        let rows = self
            .db
            .run(&sql)
            .await
            .map_err(|e| PipelineError::Execution(format!("{e:#}")))?;

        let full = rows_to_text(&rows);
        let text = truncate_result(&full, self.max_result_chars);
        let truncated = matches!(text, Cow::Owned(_));
        let text = text.into_owned();
        info!(rows = rows.len(), truncated, "query executed");

        Ok(QueryOutput {
            sql,
            rows,
            text,
            truncated,
        })
    }
}
