use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::quiz::{Question, QuestionRequest};

pub const MAX_ATTEMPTS: u32 = 3;
pub const BASE_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Substrings that mark a failure as worth retrying.
const TRANSIENT_MARKERS: [&str; 5] = [
    "503",
    "service unavailable",
    "overloaded",
    "rate limit",
    "too many requests",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("level must be at least 1")]
    InvalidLevel,
    #[error("question generation failed: {0}")]
    Generation(String),
    #[error("generator returned a malformed question: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Generation(message) => {
                let message = message.to_lowercase();
                TRANSIENT_MARKERS
                    .iter()
                    .any(|marker| message.contains(marker))
            }
            ProviderError::InvalidLevel | ProviderError::Malformed(_) => false,
        }
    }
}

impl From<chatgpt::err::Error> for ProviderError {
    fn from(err: chatgpt::err::Error) -> Self {
        ProviderError::Generation(err.to_string())
    }
}

/// Something that can come up with one question per call.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, request: &QuestionRequest) -> Result<Question, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: BASE_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Wait before the next attempt, given how many attempts already failed.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        self.base_delay * (failed_attempts + 1)
    }
}

/// Wraps a generator with the retry policy and the lenient difficulty check.
pub struct QuestionProvider<G> {
    generator: G,
    policy: RetryPolicy,
}

impl<G: QuestionGenerator> QuestionProvider<G> {
    pub fn new(generator: G) -> Self {
        Self::with_policy(generator, RetryPolicy::default())
    }

    pub fn with_policy(generator: G, policy: RetryPolicy) -> Self {
        Self { generator, policy }
    }

    pub async fn request_question(
        &self,
        request: QuestionRequest,
    ) -> Result<Question, ProviderError> {
        if request.level == 0 {
            return Err(ProviderError::InvalidLevel);
        }

        let mut failed_attempts = 0;
        loop {
            match self.generator.generate(&request).await {
                Ok(question) => {
                    if question.difficulty() != request.difficulty {
                        log::warn!(
                            "generator returned difficulty '{}' when '{}' was requested, keeping it",
                            question.difficulty(),
                            request.difficulty
                        );
                    }
                    return Ok(question);
                }
                Err(err) => {
                    failed_attempts += 1;
                    if failed_attempts >= self.policy.max_attempts {
                        log::error!(
                            "failed to generate question after {} attempts: {}",
                            failed_attempts,
                            err
                        );
                        return Err(err);
                    }
                    if !err.is_transient() {
                        log::error!(
                            "attempt {} failed with non-retryable error: {}",
                            failed_attempts,
                            err
                        );
                        return Err(err);
                    }

                    let delay = self.policy.delay_after(failed_attempts);
                    log::warn!(
                        "attempt {} failed ({}), retrying in {:?}",
                        failed_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
