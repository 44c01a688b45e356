use std::sync::Arc;

use anyhow::{anyhow, Error};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::chain::Chain;
use crate::config::Config;
use crate::database::{Database, PgDatabase, Row};
use crate::error::PipelineError;
use crate::executor::QueryExecutor;
use crate::generator::SqlGenerator;
use crate::llm::{LanguageModel, OllamaModel};
use crate::normalizer::{prompt_block, Degraded, QuestionNormalizer};
use crate::renderer::{AnswerRenderer, NO_DATA_ANSWER};
use crate::retry::RetryPolicy;
use crate::schema::SchemaDescriptor;
use crate::shortcuts::DirectSqlShortcuts;
use crate::validator::SqlValidator;

pub const MIN_QUESTION_CHARS: usize = 3;
pub const MAX_QUESTION_CHARS: usize = 500;
pub const MAX_CONTEXT_CHARS: usize = 1000;

const HEALTH_PROBE_PROMPT: &str = "Reply with the single word OK.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    DirectSql,
    AiAgent,
    ValidationError,
    ProcessingError,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    pub success: bool,
    pub question: String,
    pub sql_query: Option<String>,
    pub result: Vec<Row>,
    pub answer: Option<String>,
    pub source: AnswerSource,
    pub error: Option<String>,
}

impl AnswerRecord {
    fn failure(question: &str, source: AnswerSource, message: String) -> Self {
        Self {
            success: false,
            question: question.to_string(),
            sql_query: None,
            result: Vec::new(),
            answer: None,
            source,
            error: Some(message),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub database: bool,
    /// Wire name kept for existing clients.
    #[serde(rename = "openai")]
    pub language_model: bool,
    pub agent: bool,
    pub message: String,
}

struct ModelAnswer {
    sql: String,
    rows: Vec<Row>,
    answer: String,
}

/// Checks the question before anything external is called.
pub fn validate_question(question: &str, context: Option<&str>) -> Result<(), PipelineError> {
    let length = question.trim().chars().count();
    if length < MIN_QUESTION_CHARS {
        return Err(PipelineError::InputValidation(format!(
            "Question must be at least {MIN_QUESTION_CHARS} characters long."
        )));
    }
    if length > MAX_QUESTION_CHARS {
        return Err(PipelineError::InputValidation(format!(
            "Question must be at most {MAX_QUESTION_CHARS} characters long."
        )));
    }
    if context.is_some_and(|c| c.chars().count() > MAX_CONTEXT_CHARS) {
        return Err(PipelineError::InputValidation(format!(
            "Context must be at most {MAX_CONTEXT_CHARS} characters long."
        )));
    }
    Ok(())
}

/// Plain-text summary for rows returned by a shortcut query.
pub fn describe_rows(rows: &[Row]) -> String {
    if let [row] = rows {
        if let (1, Some((column, value))) = (row.len(), row.iter().next()) {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return format!("{}: {}", column.replace('_', " "), value);
        }
    }

    format!("Found {} matching records.", rows.len())
}

pub struct TextToSqlChain {
    schema: Arc<SchemaDescriptor>,
    model: Arc<dyn LanguageModel>,
    db: Arc<dyn Database>,
    normalizer: Option<QuestionNormalizer>,
    generator: SqlGenerator,
    validator: SqlValidator,
    executor: QueryExecutor,
    renderer: AnswerRenderer,
    shortcuts: DirectSqlShortcuts,
    retry: RetryPolicy,
}

#[async_trait]
impl Chain for TextToSqlChain {
    async fn initialize(config: &Config) -> Result<Self, Error> {
        let db = Arc::new(
            PgDatabase::connect(
                &config.database_url,
                config.db_max_connections,
                config.db_acquire_timeout,
            )
            .await?,
        );
        let model = Arc::new(OllamaModel::new(
            &config.ollama_host,
            config.ollama_port,
            config.llm_model.clone(),
            config.llm_timeout,
        ));

        Self::from_config(config, db, model).await
    }

    async fn run(&self, input: String) -> Result<String, Error> {
        let record = self.ask_question(&input, None).await;

        match (record.success, record.answer) {
            (true, Some(answer)) => Ok(answer),
            _ => Err(anyhow!(record
                .error
                .unwrap_or_else(|| "no answer produced".to_string()))),
        }
    }
}

impl TextToSqlChain {
    pub fn new(
        schema: SchemaDescriptor,
        model: Arc<dyn LanguageModel>,
        db: Arc<dyn Database>,
    ) -> Self {
        let validator = SqlValidator::new(
            schema.tables().to_vec(),
            crate::validator::DEFAULT_MAX_SQL_LENGTH,
        );
        let executor = QueryExecutor::new(
            db.clone(),
            crate::executor::DEFAULT_ROW_LIMIT,
            crate::executor::DEFAULT_MAX_RESULT_CHARS,
        )
        .with_pivot(schema.pivot().cloned());

        Self {
            schema: Arc::new(schema),
            normalizer: Some(QuestionNormalizer::new(model.clone())),
            generator: SqlGenerator::new(model.clone()),
            renderer: AnswerRenderer::new(model.clone()),
            executor,
            validator,
            model,
            db,
            shortcuts: DirectSqlShortcuts::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Introspects the schema and applies every tunable from `config`.
    pub async fn from_config(
        config: &Config,
        db: Arc<dyn Database>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self, Error> {
        let schema = SchemaDescriptor::introspect(db.as_ref(), &config.schema_mode).await?;

        Ok(Self::new(schema, model, db)
            .with_normalizer(config.normalize_questions)
            .with_retry(config.retry.clone())
            .with_limits(config.max_sql_length, config.row_limit, config.max_result_chars))
    }

    pub fn with_normalizer(mut self, enabled: bool) -> Self {
        self.normalizer = enabled.then(|| QuestionNormalizer::new(self.model.clone()));
        self
    }

    pub fn with_shortcuts(mut self, shortcuts: DirectSqlShortcuts) -> Self {
        self.shortcuts = shortcuts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// `max_sql_length` applies to the query the model wrote, before any
    /// pivot expansion.
    pub fn with_limits(
        mut self,
        max_sql_length: usize,
        row_limit: usize,
        max_result_chars: usize,
    ) -> Self {
        self.validator = SqlValidator::new(self.schema.tables().to_vec(), max_sql_length);
        self.executor = QueryExecutor::new(self.db.clone(), row_limit, max_result_chars)
            .with_pivot(self.schema.pivot().cloned());
        self
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Answers one question. Always returns a well-formed record; internal
    /// failure detail is logged and never placed in the record.
    pub async fn ask_question(&self, question: &str, context: Option<&str>) -> AnswerRecord {
        if let Err(e) = validate_question(question, context) {
            info!(error = %e, "question rejected");
            return AnswerRecord::failure(question, AnswerSource::ValidationError, e.user_message());
        }
        let question = question.trim();

        if let Some(record) = self.try_shortcut(question).await {
            return record;
        }

        match self.retry.run(|| self.answer_with_model(question, context)).await {
            Ok(ModelAnswer { sql, rows, answer }) => AnswerRecord {
                success: true,
                question: question.to_string(),
                sql_query: Some(sql),
                result: rows,
                answer: Some(answer),
                source: AnswerSource::AiAgent,
                error: None,
            },
            Err(e) => {
                error!(error = %e, question, "question failed");
                AnswerRecord::failure(question, AnswerSource::ProcessingError, e.user_message())
            }
        }
    }

    async fn try_shortcut(&self, question: &str) -> Option<AnswerRecord> {
        let (phrase, sql) = self.shortcuts.lookup(question)?;

        match self.db.run(sql).await {
            Ok(rows) if !rows.is_empty() => {
                info!(phrase, rows = rows.len(), "answered by direct SQL");
                Some(AnswerRecord {
                    success: true,
                    question: question.to_string(),
                    sql_query: Some(sql.to_string()),
                    answer: Some(describe_rows(&rows)),
                    result: rows,
                    source: AnswerSource::DirectSql,
                    error: None,
                })
            }
            Ok(_) => {
                info!(phrase, "direct SQL returned no rows, using the model");
                None
            }
            Err(e) => {
                warn!(phrase, error = %e, "direct SQL failed, using the model");
                None
            }
        }
    }

    async fn answer_with_model(
        &self,
        question: &str,
        context: Option<&str>,
    ) -> Result<ModelAnswer, PipelineError> {
        let normalization = match &self.normalizer {
            Some(normalizer) => normalizer.normalize(self.schema.text(), question, context).await,
            None => Err(Degraded {
                question: question.to_string(),
            }),
        };
        let mut question_block = prompt_block(&normalization);
        if let (None, Some(context)) = (&self.normalizer, context) {
            question_block.push_str(&format!("\nContext: {context}"));
        }

        let candidate = self.generator.generate(&self.schema, &question_block).await?;
        let sql = self.validator.validate(&candidate).map_err(|e| {
            warn!(error = %e, %candidate, "generated SQL rejected");
            PipelineError::from(e)
        })?;

        let output = self.executor.execute(&sql).await?;
        let answer = if output.rows.is_empty() {
            NO_DATA_ANSWER.to_string()
        } else {
            self.renderer.render(question, &output.sql, &output.text).await?
        };
        info!(rows = output.rows.len(), truncated = output.truncated, "question answered");

        Ok(ModelAnswer {
            sql: output.sql,
            rows: output.rows,
            answer,
        })
    }

    /// Probes the database with `SELECT 1` and the model with a trivial prompt.
    pub async fn health_check(&self) -> HealthReport {
        let database = match self.db.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "database health probe failed");
                false
            }
        };
        let language_model = match self.model.complete(HEALTH_PROBE_PROMPT.to_string()).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "model health probe failed");
                false
            }
        };
        let agent = database && language_model;

        HealthReport {
            status: if agent { "healthy" } else { "degraded" }.to_string(),
            database,
            language_model,
            agent,
            message: match (database, language_model) {
                (true, true) => "All systems operational".to_string(),
                (false, true) => "Database is unreachable".to_string(),
                (true, false) => "Language model is unreachable".to_string(),
                (false, false) => "Database and language model are unreachable".to_string(),
            },
        }
    }
}
