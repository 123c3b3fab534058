//! AI provider integrations

mod gemini;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::conversation::Turn;

pub use gemini::{GeminiConfig, GeminiProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Response blocked: {0}")]
    Blocked(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Incremental text fragments of one model reply.
///
/// Lazy, finite and not restartable. Ends after the last fragment or right
/// after the first error.
pub type FragmentStream = BoxStream<'static, Result<String, ProviderError>>;

/// Everything the model sees for one exchange
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system_instruction: String,
    pub history: Vec<Turn>,
    pub message: String,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier reported by the health check
    fn model_name(&self) -> &str;

    /// Submit a prompt and stream the reply back
    async fn stream(&self, prompt: Prompt) -> Result<FragmentStream, ProviderError>;
}
