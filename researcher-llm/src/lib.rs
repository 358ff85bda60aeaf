//! Local-model integration for the researcher.
//!
//! This crate exposes the provider-agnostic [`traits::LlmClient`] interface,
//! an Ollama implementation, and [`research::ResearchLlm`], which builds the
//! summary, synthesis, trend and comedy prompts over two model tiers.
//!
//! # Examples
//! ```no_run
//! use researcher_common::Result;
//! use researcher_llm::ollama::OllamaOptions;
//! use researcher_llm::{connect_tiers, TierModels};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let models = TierModels {
//!     endpoint: "http://localhost:11434".into(),
//!     basic: "mistral".into(),
//!     reasoning: "deepseek-r1".into(),
//! };
//! let llm = connect_tiers(&models, &OllamaOptions::default()).await?;
//! # Ok(())
//! # }
//! ```
pub mod ollama;
pub mod research;
pub mod traits;
pub mod trends;

use std::sync::Arc;

use ollama::{OllamaClient, OllamaOptions};
use research::ResearchLlm;
use researcher_common::Result;
use traits::LlmClient;

pub const DEFAULT_BASIC_MODEL: &str = "mistral";
pub const DEFAULT_REASONING_MODEL: &str = "deepseek-r1";

/// Endpoint and model names for both tiers.
#[derive(Debug, Clone)]
pub struct TierModels {
    pub endpoint: String,
    pub basic: String,
    pub reasoning: String,
}

/// Connect both tiers, sharing one client when they name the same model.
pub async fn connect_tiers(models: &TierModels, options: &OllamaOptions) -> Result<ResearchLlm> {
    let basic: Arc<dyn LlmClient> =
        Arc::new(OllamaClient::connect(&models.endpoint, &models.basic, options).await?);
    let reasoning: Arc<dyn LlmClient> = if models.reasoning == models.basic {
        Arc::clone(&basic)
    } else {
        Arc::new(OllamaClient::connect(&models.endpoint, &models.reasoning, options).await?)
    };
    Ok(ResearchLlm::new(basic, reasoning))
}
