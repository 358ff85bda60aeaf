use async_trait::async_trait;
use researcher_common::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    /// Tokens generated, when the server reports them.
    pub tokens_used: Option<u32>,
    /// Server-side generation time.
    pub duration_ms: Option<u64>,
}

/// Request/response access to a single model.
///
/// Implementations map transport failures onto
/// [`ResearchError::ModelUnavailable`](researcher_common::ResearchError) and
/// unusable bodies onto `ModelOutputInvalid`, so callers can apply one retry
/// policy regardless of provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response to the given prompt with optional system prompt
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse>;

    /// Get the model name being used
    fn model_name(&self) -> &str;
}
