use std::time::Duration;

use anyhow::{Context, Error};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row as _;

/// A result row, column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

/// What the pipeline needs from a SQL engine.
#[async_trait]
pub trait Database: Send + Sync {
    async fn ping(&self) -> Result<(), Error>;

    async fn list_tables(&self) -> Result<Vec<String>, Error>;

    async fn describe_schema(&self, tables: &[String]) -> Result<Vec<TableInfo>, Error>;

    /// Runs an already validated read-only statement.
    async fn run(&self, sql: &str) -> Result<Vec<Row>, Error>;
}

/// Fixed lookups served without going through the language model.
#[async_trait]
pub trait StudentDirectory: Send + Sync {
    async fn top_students(&self, limit: i64) -> Result<Vec<Row>, Error>;

    async fn find_student(&self, name: &str) -> Result<Option<Row>, Error>;
}

const TOP_STUDENTS_SQL: &str = "SELECT row_to_json(q)::text FROM (\
     SELECT name, net_fee, paid_amount FROM students \
     WHERE net_fee IS NOT NULL ORDER BY net_fee DESC LIMIT $1) q";

const STUDENT_BY_NAME_SQL: &str = "SELECT row_to_json(q)::text FROM (\
     SELECT * FROM students WHERE LOWER(name) = LOWER($1) LIMIT 1) q";

fn parse_row(json: &str) -> Result<Row, Error> {
    serde_json::from_str(json).with_context(|| format!("row is not a JSON object: {json}"))
}

#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .test_before_acquire(true)
            .connect(url)
            .await
            .context("failed to connect to the database")?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn ping(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, Error> {
        let tables = sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = 'public' ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tables)
    }

    async fn describe_schema(&self, tables: &[String]) -> Result<Vec<TableInfo>, Error> {
        let mut tables_info = Vec::with_capacity(tables.len());

        for table_name in tables {
            let rows = sqlx::query(
                "SELECT column_name::text AS column_name, data_type::text AS data_type \
                 FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = $1 \
                 ORDER BY ordinal_position",
            )
            .bind(table_name)
            .fetch_all(&self.pool)
            .await?;

            if rows.is_empty() {
                continue;
            }

            let columns = rows
                .iter()
                .map(|row| -> Result<ColumnInfo, sqlx::Error> {
                    Ok(ColumnInfo {
                        name: row.try_get("column_name")?,
                        data_type: row.try_get("data_type")?,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            tables_info.push(TableInfo {
                name: table_name.clone(),
                columns,
            });
        }

        Ok(tables_info)
    }

    async fn run(&self, sql: &str) -> Result<Vec<Row>, Error> {
        let wrapped = format!("SELECT row_to_json(q)::text FROM ({sql}) q");

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        let fetched = sqlx::query_scalar::<_, String>(&wrapped)
            .fetch_all(&mut *tx)
            .await;
        tx.rollback().await?;

        fetched?.iter().map(|json| parse_row(json)).collect()
    }
}

#[async_trait]
impl StudentDirectory for PgDatabase {
    async fn top_students(&self, limit: i64) -> Result<Vec<Row>, Error> {
        let rows = sqlx::query_scalar::<_, String>(TOP_STUDENTS_SQL)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|json| parse_row(json)).collect()
    }

    async fn find_student(&self, name: &str) -> Result<Option<Row>, Error> {
        let row = sqlx::query_scalar::<_, String>(STUDENT_BY_NAME_SQL)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_deref().map(parse_row).transpose()
    }
}
