use std::sync::Arc;

use tracing::debug;

use crate::error::PipelineError;
use crate::llm::LanguageModel;
use crate::schema::SchemaDescriptor;

/// Removes markdown fencing the model adds despite being told not to.
pub fn strip_code_fences(response: &str) -> String {
    let mut sql = response.trim();

    if let Some(rest) = sql.strip_prefix("```") {
        // drop the info string, e.g. ```sql
        sql = ["sql", "postgresql", "postgres"]
            .iter()
            .find_map(|tag| {
                rest.get(..tag.len())
                    .filter(|head| head.eq_ignore_ascii_case(tag))
                    .map(|_| &rest[tag.len()..])
            })
            .unwrap_or(rest);
    }
    if let Some(rest) = sql.trim_end().strip_suffix("```") {
        sql = rest;
    }

    sql.trim().to_string()
}

pub struct SqlGenerator {
    model: Arc<dyn LanguageModel>,
}

impl SqlGenerator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    fn construct_prompt(&self, schema: &SchemaDescriptor, question_block: &str) -> String {
        let relation_rule = if schema.pivot().is_some() {
            "Select only from the relation pivoted described above; never query the raw view."
        } else {
            "Use only the tables listed above."
        };

        format!(
            "You are a PostgreSQL expert for a training institute's reporting database.\n\
             Provided this schema:\n{schema}\n\
             Question analysis:\n{question_block}\n\n\
             Rules:\n\
             - Generate a single read-only SELECT statement that answers the question.\n\
             - {relation_rule}\n\
             - Use aggregates (COUNT, SUM, AVG, MAX, MIN) with GROUP BY \
             for totals and breakdowns.\n\
             - Match names case-insensitively.\n\
             - Only return the SQL query, no explanation and no markdown.",
            schema = schema.text(),
        )
    }

    /// Asks the model for SQL. The result is untrusted until validated.
    pub async fn generate(
        &self,
        schema: &SchemaDescriptor,
        question_block: &str,
    ) -> Result<String, PipelineError> {
        let prompt = self.construct_prompt(schema, question_block);

        let response = self
            .model
            .complete(prompt)
            .await
            .map_err(|e| PipelineError::Generation(format!("{e:#}")))?;

        let sql = strip_code_fences(&response);
        debug!(%sql, "sql generated");

        Ok(sql)
    }
}
