use std::time::Duration;

use anyhow::{anyhow, Error};
use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::Ollama;
use tracing::debug;

/// A text-completion model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: String) -> Result<String, Error>;
}

pub struct OllamaModel {
    client: Ollama,
    model: String,
    timeout: Duration,
}

impl OllamaModel {
    pub fn new(host: &str, port: u16, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Ollama::new(host.to_string(), port),
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn complete(&self, prompt: String) -> Result<String, Error> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "sending prompt");
        let request = GenerationRequest::new(self.model.clone(), prompt);

        let response = tokio::time::timeout(self.timeout, self.client.generate(request))
            .await
            .map_err(|_| anyhow!("model request timed out after {:?}", self.timeout))?
            .map_err(|e| anyhow!("model request failed: {e}"))?;

        Ok(response.response)
    }
}
