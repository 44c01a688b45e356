use std::fmt::Write as _;

use anyhow::Error;
use tracing::{info, warn};

use crate::database::{ColumnInfo, Database, TableInfo};
use crate::pivot::{PivotQueryBuilder, PIVOT_RELATION};

const MAX_EAV_ATTRIBUTES: usize = 50;

const RELATIONAL_PATTERNS: &[(&str, &str)] = &[
    (
        "How many students are enrolled?",
        "SELECT COUNT(*) AS total_students FROM students",
    ),
    (
        "Which centre has the highest outstanding amount?",
        "SELECT center, SUM(outstanding) AS total_outstanding FROM students \
         GROUP BY center ORDER BY total_outstanding DESC LIMIT 1",
    ),
    (
        "Top 5 students by net fee",
        "SELECT name, net_fee FROM students WHERE net_fee IS NOT NULL \
         ORDER BY net_fee DESC LIMIT 5",
    ),
];

const EAV_PATTERNS: &[(&str, &str)] = &[
    (
        "Top 5 students by net fee",
        "SELECT name, CAST(net_fee AS NUMERIC) AS net_fee FROM pivoted \
         WHERE net_fee IS NOT NULL ORDER BY CAST(net_fee AS NUMERIC) DESC LIMIT 5",
    ),
    (
        "Find the student named Priya",
        "SELECT * FROM pivoted WHERE UPPER(name) LIKE '%PRIYA%'",
    ),
];

/// Tables described when introspection finds nothing usable.
fn institute_tables() -> Vec<TableInfo> {
    fn table(name: &str, columns: &[(&str, &str)]) -> TableInfo {
        TableInfo {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(name, data_type)| ColumnInfo {
                    name: name.to_string(),
                    data_type: data_type.to_string(),
                })
                .collect(),
        }
    }

    vec![
        table(
            "students",
            &[
                ("id", "integer"),
                ("name", "text"),
                ("email", "text"),
                ("center", "text"),
                ("course", "text"),
                ("net_fee", "numeric"),
                ("paid_amount", "numeric"),
                ("outstanding", "numeric"),
                ("admission_date", "date"),
            ],
        ),
        table(
            "campaigns",
            &[
                ("id", "integer"),
                ("name", "text"),
                ("source", "text"),
                ("center", "text"),
                ("start_date", "date"),
                ("budget", "numeric"),
            ],
        ),
        table(
            "calls",
            &[
                ("id", "integer"),
                ("student_name", "text"),
                ("campaign_id", "integer"),
                ("center", "text"),
                ("status", "text"),
                ("called_at", "timestamp"),
            ],
        ),
    ]
}

/// How the warehouse lays out its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaMode {
    Relational { allowed_tables: Vec<String> },
    Eav { view: String },
}

/// Prompt-ready description of what may be queried. Built once at startup
/// and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    text: String,
    tables: Vec<String>,
    pivot: Option<PivotQueryBuilder>,
}

impl SchemaDescriptor {
    pub fn relational(tables: &[TableInfo]) -> Self {
        let mut text = String::from("Dialect: PostgreSQL\nTables:\n");
        for table in tables {
            let columns = table
                .columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(text, "- {}({})", table.name, columns);
        }
        push_patterns(&mut text, RELATIONAL_PATTERNS);

        Self {
            text,
            tables: tables.iter().map(|t| t.name.clone()).collect(),
            pivot: None,
        }
    }

    pub fn eav(view: &str, attributes: &[String]) -> Self {
        let pivot = PivotQueryBuilder::new(view, attributes);

        let mut text = String::from("Dialect: PostgreSQL\n");
        let _ = writeln!(
            text,
            "Data model: the view {view} stores one row per attribute with columns \
             ID, FILE_NAME, UPLOADED_AT, COLUMN_NAME, VALUE."
        );
        let _ = writeln!(
            text,
            "Query the logical relation {PIVOT_RELATION} instead; \
             it has one text column per attribute:"
        );
        let _ = writeln!(text, "- id (entity id)");
        for column in pivot.columns() {
            let _ = writeln!(text, "- {} (attribute \"{}\")", column.alias, column.attribute);
        }
        let _ = writeln!(
            text,
            "All values are text: CAST(x AS NUMERIC) for numbers, UPPER(x) LIKE '%NAME%' for names."
        );
        push_patterns(&mut text, EAV_PATTERNS);

        Self {
            text,
            tables: vec![PIVOT_RELATION.to_string(), view.to_string()],
            pivot: Some(pivot),
        }
    }

    /// The built-in training-institute schema, restricted to `allowed`.
    pub fn institute(allowed: &[String]) -> Self {
        let tables: Vec<TableInfo> = institute_tables()
            .into_iter()
            .filter(|t| allowed.iter().any(|a| a.eq_ignore_ascii_case(&t.name)))
            .collect();
        Self::relational(&tables)
    }

    pub async fn introspect(db: &dyn Database, mode: &SchemaMode) -> Result<Self, Error> {
        match mode {
            SchemaMode::Relational { allowed_tables } => {
                let present: Vec<String> = db
                    .list_tables()
                    .await?
                    .into_iter()
                    .filter(|t| allowed_tables.iter().any(|a| a.eq_ignore_ascii_case(t)))
                    .collect();
                let tables = db.describe_schema(&present).await?;

                if tables.is_empty() {
                    warn!("no allowed tables found in the database, using built-in schema");
                    return Ok(Self::institute(allowed_tables));
                }
                info!(tables = tables.len(), "schema introspected");
                Ok(Self::relational(&tables))
            }
            SchemaMode::Eav { view } => {
                let sql = format!(
                    "SELECT DISTINCT COLUMN_NAME FROM {view} ORDER BY 1 LIMIT {MAX_EAV_ATTRIBUTES}"
                );
                let attributes = match db.run(&sql).await {
                    Ok(rows) => rows
                        .iter()
                        .filter_map(|row| row.values().next())
                        .filter_map(|value| value.as_str().map(str::to_string))
                        .collect(),
                    Err(e) => {
                        warn!(error = %e, %view, "could not list EAV attributes");
                        Vec::new()
                    }
                };
                info!(attributes = attributes.len(), %view, "EAV attributes discovered");
                Ok(Self::eav(view, &attributes))
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Relation names the generated SQL may reference. In EAV mode this is
    /// the logical pivot relation as well as the raw view.
    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn pivot(&self) -> Option<&PivotQueryBuilder> {
        self.pivot.as_ref()
    }
}

fn push_patterns(text: &mut String, patterns: &[(&str, &str)]) {
    text.push_str("Query patterns:\n");
    for (question, sql) in patterns {
        let _ = writeln!(text, "Q: {question}\nSQL: {sql}");
    }
}
