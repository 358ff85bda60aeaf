use crate::traits::{LlmClient, LlmResponse};
use async_trait::async_trait;
use researcher_common::{ResearchError, Result};
use researcher_http::{Auth, HttpClient, HttpError, RequestOpts};
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use std::time::Duration;

const OLLAMA_CONNECTION_ERROR: &str = "No running Ollama server detected. Start it with: `ollama serve` (after installing). Install instructions: https://github.com/ollama/ollama";

const PULL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// The model listing is cheap and idempotent, so it rides out a restarting server.
const TAGS_RETRIES: usize = 2;

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    eval_count: Option<u64>,
    total_duration: Option<u64>,
}

/// Options for [`OllamaClient::connect`].
#[derive(Debug, Clone)]
pub struct OllamaOptions {
    pub request_timeout: Duration,
    /// Pull a model that is not installed instead of failing.
    pub auto_pull: bool,
    /// Bearer token for endpoints behind an authenticating proxy.
    pub api_key: Option<String>,
}

impl Default for OllamaOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            auto_pull: false,
            api_key: None,
        }
    }
}

/// Ollama client for local model inference.
///
/// Expects a running Ollama server (see https://github.com/ollama/ollama).
pub struct OllamaClient {
    http: HttpClient,
    model: String,
    api_key: Option<String>,
}

impl OllamaClient {
    /// Build a client without contacting the server.
    pub fn new(base_url: &str, model: impl Into<String>, options: &OllamaOptions) -> Result<Self> {
        let http = HttpClient::new(base_url)
            .map_err(map_http_error)?
            .with_timeout(options.request_timeout)
            // Generation is expensive; the caller owns the retry policy.
            .with_retries(0);
        Ok(Self {
            http,
            model: model.into(),
            api_key: options.api_key.clone(),
        })
    }

    /// Create a new client and verify server/model availability.
    pub async fn connect(
        base_url: &str,
        model: impl Into<String>,
        options: &OllamaOptions,
    ) -> Result<Self> {
        let client = Self::new(base_url, model, options)?;

        let models = client.fetch_available_models().await?;
        if !models.iter().any(|m| model_matches(m, &client.model)) {
            if !options.auto_pull {
                return Err(ResearchError::ModelUnavailable(format!(
                    "model '{}' is not installed; run `ollama pull {}` or enable auto_pull",
                    client.model, client.model
                )));
            }
            tracing::info!(target: "llm.ollama", model = %client.model, "Model not found locally, pulling");
            client.pull_model().await?;
        }

        tracing::info!(
            target: "llm.ollama",
            model = %client.model,
            endpoint = %client.http.base(),
            "Ollama client ready"
        );
        Ok(client)
    }

    fn opts(&self) -> RequestOpts<'_> {
        RequestOpts {
            auth: self.api_key.as_deref().map(Auth::Bearer),
            ..Default::default()
        }
    }

    async fn fetch_available_models(&self) -> Result<Vec<String>> {
        let opts = RequestOpts {
            timeout: Some(Duration::from_secs(10)),
            retries: Some(TAGS_RETRIES),
            ..self.opts()
        };
        let tags: TagsResponse = self
            .http
            .get_json("api/tags", opts)
            .await
            .map_err(|e| match e {
                e if e.is_unreachable() => {
                    tracing::warn!(target: "llm.ollama", error = %e, "Ollama probe failed");
                    ResearchError::ModelUnavailable(OLLAMA_CONNECTION_ERROR.to_string())
                }
                other => map_http_error(other),
            })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn pull_model(&self) -> Result<()> {
        let payload = json!({
            "model": self.model,
            "stream": false
        });
        let opts = RequestOpts {
            timeout: Some(PULL_TIMEOUT),
            ..self.opts()
        };

        let _: JsonValue = self
            .http
            .post_json_opts("api/pull", &payload, opts)
            .await
            .map_err(map_http_error)?;

        tracing::info!(target: "llm.ollama", model = %self.model, "Successfully pulled model");
        Ok(())
    }
}

/// `mistral` matches an installed `mistral:latest`.
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || (!wanted.contains(':') && installed.strip_suffix(":latest") == Some(wanted))
}

pub(crate) fn map_http_error(err: HttpError) -> ResearchError {
    match err {
        HttpError::Network(_) | HttpError::Timeout(_) | HttpError::Api { .. } => {
            ResearchError::ModelUnavailable(err.to_string())
        }
        HttpError::Decode(_, _) => ResearchError::ModelOutputInvalid(err.to_string()),
        HttpError::Url(_) | HttpError::Build(_) => ResearchError::Config(err.to_string()),
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let mut options = Map::new();
        if let Some(temp) = temperature {
            options.insert("temperature".to_string(), json!(temp));
        }
        if let Some(max_tok) = max_tokens {
            options.insert("num_predict".to_string(), json!(max_tok));
        }

        let mut payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": options
        });
        if let Some(system) = system_prompt {
            payload["system"] = json!(system);
        }

        tracing::debug!(
            target: "llm.ollama",
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "Querying model"
        );
        let t0 = std::time::Instant::now();
        let val: GenerateResponse = self
            .http
            .post_json_opts("api/generate", &payload, self.opts())
            .await
            .map_err(map_http_error)?;

        tracing::debug!(
            target: "llm.ollama",
            model = %self.model,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            response_chars = val.response.chars().count(),
            "Model responded"
        );

        Ok(LlmResponse {
            text: val.response,
            model: Some(self.model.clone()),
            tokens_used: val.eval_count.map(|c| c as u32),
            duration_ms: val.total_duration.map(|ns| ns / 1_000_000),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
