use std::sync::Arc;

use crate::error::PipelineError;
use crate::llm::LanguageModel;

pub const NO_DATA_ANSWER: &str = "I couldn't find any matching data for your question. \
                                  Try widening the filters or rephrasing it.";

pub struct AnswerRenderer {
    model: Arc<dyn LanguageModel>,
}

impl AnswerRenderer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    fn construct_prompt(&self, question: &str, sql: &str, result: &str) -> String {
        format!(
            "You are a helpful assistant for a training institute.\n\
             Question: {question}\n\
             SQL Query: {sql}\n\
             SQL Result (one JSON object per row):\n{result}\n\n\
             Explain these results conversationally in 2-4 sentences. \
             Use only the data shown; format large numbers with thousands separators. \
             Do not mention SQL."
        )
    }

    /// Empty results short-circuit to [`NO_DATA_ANSWER`] without a model call.
    pub async fn render(
        &self,
        question: &str,
        sql: &str,
        result: &str,
    ) -> Result<String, PipelineError> {
        if result.trim().is_empty() {
            return Ok(NO_DATA_ANSWER.to_string());
        }

        let answer = self
            .model
            .complete(self.construct_prompt(question, sql, result))
            .await
            .map_err(|e| PipelineError::Generation(format!("{e:#}")))?;

        Ok(answer.trim().to_string())
    }
}
