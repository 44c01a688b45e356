use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::PipelineError;

/// Class of model failure that is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    ServerError,
    RateLimited,
}

/// Detects transient model failures from their error text.
pub fn classify(message: &str) -> Option<TransientKind> {
    if message.contains("500") || message.contains("server_error") {
        Some(TransientKind::ServerError)
    } else if message.to_lowercase().contains("rate_limit") {
        Some(TransientKind::RateLimited)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            rate_limit_wait: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, kind: TransientKind, attempt: u32) -> Duration {
        match kind {
            TransientKind::ServerError => {
                self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
            }
            TransientKind::RateLimited => self.rate_limit_wait,
        }
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempt cap is reached. Only model failures are ever retried.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let PipelineError::Generation(detail) = &err else {
                return Err(err);
            };
            let Some(kind) = classify(detail) else {
                return Err(err);
            };

            if attempt + 1 >= attempts {
                return Err(PipelineError::TransientModel {
                    kind,
                    detail: detail.clone(),
                });
            }

            let delay = self.delay_for(kind, attempt);
            warn!(attempt = attempt + 1, ?kind, ?delay, "transient model failure, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
