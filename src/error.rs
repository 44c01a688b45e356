use thiserror::Error;

use crate::retry::TransientKind;
use crate::validator::SqlValidationError;

/// Failures raised by the question-to-answer pipeline.
///
/// Only `InputValidation` carries text that is safe to show to a caller;
/// every other variant is logged in full and replaced by a fixed message.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid question: {0}")]
    InputValidation(String),

    #[error("model call failed: {0}")]
    Generation(String),

    #[error("generated SQL rejected: {0}")]
    SqlValidation(#[from] SqlValidationError),

    #[error("query execution failed: {0}")]
    Execution(String),

    #[error("model service unavailable after retries ({kind:?}): {detail}")]
    TransientModel { kind: TransientKind, detail: String },
}

pub const PROCESSING_ERROR_MESSAGE: &str =
    "Sorry, I ran into a problem while answering that question. Please try again or rephrase it.";

pub const UNSAFE_SQL_MESSAGE: &str =
    "I couldn't build a safe read-only query for that question. Please rephrase it.";

pub const MODEL_UNAVAILABLE_MESSAGE: &str =
    "The language model service is temporarily unavailable. Please try again later.";

pub const RATE_LIMITED_MESSAGE: &str =
    "Rate limit exceeded. Please wait a minute and try again.";

impl PipelineError {
    /// Text returned to the caller in place of the internal detail.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::InputValidation(message) => message.clone(),
            PipelineError::SqlValidation(_) => UNSAFE_SQL_MESSAGE.to_string(),
            PipelineError::TransientModel {
                kind: TransientKind::RateLimited,
                ..
            } => RATE_LIMITED_MESSAGE.to_string(),
            PipelineError::TransientModel {
                kind: TransientKind::ServerError,
                ..
            } => MODEL_UNAVAILABLE_MESSAGE.to_string(),
            PipelineError::Generation(_) | PipelineError::Execution(_) => {
                PROCESSING_ERROR_MESSAGE.to_string()
            }
        }
    }

    pub fn is_input_error(&self) -> bool {
        matches!(self, PipelineError::InputValidation(_))
    }
}
