use std::sync::Arc;

use tracing::{debug, warn};

use crate::llm::LanguageModel;

/// The six fields every normalized query is expected to carry.
pub const NORMALIZED_FIELDS: [&str; 6] = [
    "Intent",
    "Tables",
    "Entities",
    "Filters",
    "Aggregation",
    "Normalized Question",
];

/// Model output describing the question. Passed on as opaque text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    pub text: String,
}

/// The normalizer could not run; carries the original question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degraded {
    pub question: String,
}

pub type Normalization = Result<NormalizedQuery, Degraded>;

/// Prompt block for the generator, whichever way normalization went.
pub fn prompt_block(normalization: &Normalization) -> String {
    match normalization {
        Ok(normalized) => normalized.text.clone(),
        Err(degraded) => format!(
            "Intent: general_query\nNormalized Question: {}",
            degraded.question
        ),
    }
}

pub struct QuestionNormalizer {
    model: Arc<dyn LanguageModel>,
}

impl QuestionNormalizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    fn construct_prompt(&self, schema: &str, question: &str, context: Option<&str>) -> String {
        let context = context
            .map(|c| format!("Additional context from the user: {c}\n"))
            .unwrap_or_default();

        format!(
            "You analyse questions about a training institute's data (students, branches/centres, \
             campaigns, calls) before they are turned into SQL.\n\
             Schema:\n{schema}\n\
             {context}\
             Question: {question}\n\n\
             Fix typos, resolve vague phrasing and make implicit filters explicit. \
             Reply with exactly these six lines and nothing else:\n\
             Intent: <count | list | aggregate | lookup | compare | general_query>\n\
             Tables: <tables involved>\n\
             Entities: <names, centres, courses mentioned>\n\
             Filters: <conditions to apply, or none>\n\
             Aggregation: <COUNT/SUM/AVG/MAX/MIN with grouping, or none>\n\
             Normalized Question: <the question rewritten unambiguously>"
        )
    }

    /// Never fails: any model error degrades to the raw question.
    pub async fn normalize(
        &self,
        schema: &str,
        question: &str,
        context: Option<&str>,
    ) -> Normalization {
        let prompt = self.construct_prompt(schema, question, context);

        match self.model.complete(prompt).await {
            Ok(text) if !text.trim().is_empty() => {
                let text = text.trim().to_string();
                let missing = NORMALIZED_FIELDS
                    .iter()
                    .filter(|field| !text.contains(&format!("{field}:")))
                    .count();
                debug!(missing_fields = missing, normalized = %text, "question normalized");
                Ok(NormalizedQuery { text })
            }
            Ok(_) => {
                warn!("normalizer returned an empty response, using the raw question");
                Err(Degraded {
                    question: question.to_string(),
                })
            }
            Err(e) => {
                warn!(error = %e, "normalizer failed, using the raw question");
                Err(Degraded {
                    question: question.to_string(),
                })
            }
        }
    }
}
