#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Error};
use async_trait::async_trait;

use institute_sql_chat::database::{ColumnInfo, Database, Row, StudentDirectory, TableInfo};
use institute_sql_chat::llm::LanguageModel;
use institute_sql_chat::retry::RetryPolicy;
use institute_sql_chat::schema::SchemaDescriptor;
use institute_sql_chat::text_to_sql_chain::TextToSqlChain;

pub fn row(json: &str) -> Row {
    serde_json::from_str(json).expect("test row should be a JSON object")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Generate,
    Render,
    Probe,
}

fn stage_of(prompt: &str) -> Stage {
    if prompt.starts_with("Reply with the single word OK") {
        Stage::Probe
    } else if prompt.contains("Explain these results conversationally") {
        Stage::Render
    } else if prompt.contains("Only return the SQL query") {
        Stage::Generate
    } else {
        Stage::Normalize
    }
}

/// Answers each pipeline stage from a script and records every prompt.
pub struct ScriptedModel {
    pub normalized: Result<String, String>,
    pub sql: Result<String, String>,
    pub answer: String,
    pub healthy: bool,
    /// Errors returned by the generator stage before `sql` is used.
    pub generate_failures: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<(Stage, String)>>,
}

impl ScriptedModel {
    pub fn new(sql: &str) -> Self {
        Self {
            normalized: Ok("Intent: list\nTables: students\nEntities: none\nFilters: none\n\
                            Aggregation: none\nNormalized Question: scripted"
                .to_string()),
            sql: Ok(sql.to_string()),
            answer: "Scripted answer.".to_string(),
            healthy: true,
            generate_failures: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self, stage: Stage) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, stage: Stage) -> Option<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, p)| p.clone())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: String) -> Result<String, Error> {
        let stage = stage_of(&prompt);
        self.prompts.lock().unwrap().push((stage, prompt));

        match stage {
            Stage::Probe if self.healthy => Ok("OK".to_string()),
            Stage::Probe => Err(anyhow!("connection refused")),
            Stage::Normalize => self.normalized.clone().map_err(|e| anyhow!(e)),
            Stage::Generate => {
                if let Some(failure) = self.generate_failures.lock().unwrap().pop_front() {
                    return Err(anyhow!(failure));
                }
                self.sql.clone().map_err(|e| anyhow!(e))
            }
            Stage::Render => Ok(self.answer.clone()),
        }
    }
}

/// In-memory database: exact-SQL canned results, otherwise `default_rows`.
pub struct FakeDatabase {
    pub default_rows: Vec<Row>,
    pub canned: Vec<(String, Vec<Row>)>,
    pub fail_with: Option<String>,
    pub healthy: bool,
    pub tables: Vec<TableInfo>,
    pub executed: Mutex<Vec<String>>,
}

impl FakeDatabase {
    pub fn new(default_rows: Vec<Row>) -> Self {
        Self {
            default_rows,
            canned: Vec::new(),
            fail_with: None,
            healthy: true,
            tables: vec![TableInfo {
                name: "students".to_string(),
                columns: vec![
                    ColumnInfo {
                        name: "name".to_string(),
                        data_type: "text".to_string(),
                    },
                    ColumnInfo {
                        name: "outstanding".to_string(),
                        data_type: "numeric".to_string(),
                    },
                ],
            }],
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_canned(mut self, sql: &str, rows: Vec<Row>) -> Self {
        self.canned.push((sql.to_string(), rows));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Database for FakeDatabase {
    async fn ping(&self) -> Result<(), Error> {
        if self.healthy {
            Ok(())
        } else {
            Err(anyhow!("connection reset"))
        }
    }

    async fn list_tables(&self) -> Result<Vec<String>, Error> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    async fn describe_schema(&self, tables: &[String]) -> Result<Vec<TableInfo>, Error> {
        Ok(self
            .tables
            .iter()
            .filter(|t| tables.contains(&t.name))
            .cloned()
            .collect())
    }

    async fn run(&self, sql: &str) -> Result<Vec<Row>, Error> {
        self.executed.lock().unwrap().push(sql.to_string());
        if let Some(message) = &self.fail_with {
            return Err(anyhow!(message.clone()));
        }
        Ok(self
            .canned
            .iter()
            .find(|(canned, _)| canned == sql)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_else(|| self.default_rows.clone()))
    }
}

pub struct FakeStudents {
    pub rows: Vec<Row>,
}

#[async_trait]
impl StudentDirectory for FakeStudents {
    async fn top_students(&self, limit: i64) -> Result<Vec<Row>, Error> {
        Ok(self.rows.iter().take(limit as usize).cloned().collect())
    }

    async fn find_student(&self, name: &str) -> Result<Option<Row>, Error> {
        Ok(self
            .rows
            .iter()
            .find(|row| {
                row.get("name")
                    .and_then(|v| v.as_str())
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
            .cloned())
    }
}

pub fn instant_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::ZERO,
        rate_limit_wait: Duration::ZERO,
    }
}

pub fn chain(model: Arc<ScriptedModel>, db: Arc<FakeDatabase>) -> TextToSqlChain {
    TextToSqlChain::new(
        SchemaDescriptor::institute(&["students".to_string()]),
        model,
        db,
    )
    .with_retry(instant_retry())
}
