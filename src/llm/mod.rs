pub mod assistant;
pub mod client;
pub mod prompt;
pub mod response;

use thiserror::Error;

pub use assistant::{
    Assistant, CombinationSuggester, GenerationRequest, HarnessGenerator, HarnessRepairer,
};
pub use client::{LlmClient, LlmRunResult, Provider, ProviderConfig};
pub use prompt::LlmPrompt;

/// Failures of an external text service.
///
/// Authentication and quota problems get their own variants so callers can
/// tell a misconfigured service apart from one that answered.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("text service rejected the credentials (check the API key): {0}")]
    Auth(String),

    #[error("text service quota or account balance exhausted: {0}")]
    Quota(String),

    #[error("text service rate limit reached, retry later")]
    RateLimited,

    #[error("text service request timed out")]
    Timeout,

    #[error("text service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("text service unreachable: {0}")]
    Transport(String),

    #[error("unexpected text service response: {0}")]
    Parse(String),

    #[error("text service not configured: {0}")]
    NotConfigured(String),
}

impl ServiceError {
    /// True when retrying cannot help until someone fixes the setup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ServiceError::Auth(_) | ServiceError::Quota(_) | ServiceError::NotConfigured(_)
        )
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServiceError::Timeout
        } else if e.is_decode() {
            ServiceError::Parse(e.to_string())
        } else {
            ServiceError::Transport(e.to_string())
        }
    }
}

/// Single text-in/text-out contract every backend satisfies.
pub trait TextService {
    fn complete(&self, prompt: &LlmPrompt) -> Result<LlmRunResult, ServiceError>;
}
