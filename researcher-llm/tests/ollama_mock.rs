mod common;

use std::sync::Arc;
use std::time::Duration;

use researcher_common::model::{ExtractedContent, ExtractionMethod, ModelTier, ValidationStatus};
use researcher_common::{ResearchError, Result};
use researcher_llm::ollama::{OllamaClient, OllamaOptions};
use researcher_llm::research::ResearchLlm;
use researcher_llm::traits::LlmClient;
use researcher_llm::{connect_tiers, TierModels};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_tags(server: &MockServer, models: &[&str]) {
    let entries: Vec<_> = models.iter().map(|m| json!({ "name": m })).collect();
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": entries })))
        .mount(server)
        .await;
}

fn article(text: &str) -> ExtractedContent {
    ExtractedContent {
        source_url: Url::parse("https://example.org/story").unwrap(),
        title: Some("A story".into()),
        cleaned_text: text.into(),
        method: ExtractionMethod::StructuredSelector,
        status: ValidationStatus::Sufficient,
        checksum: String::new(),
    }
}

#[tokio::test]
async fn connect_accepts_latest_tag() -> Result<()> {
    common::init_test_tracing();
    let server = MockServer::start().await;
    mount_tags(&server, &["mistral:latest"]).await;

    let client = OllamaClient::connect(&server.uri(), "mistral", &OllamaOptions::default()).await?;
    assert_eq!(client.model_name(), "mistral");
    Ok(())
}

#[tokio::test]
async fn model_listing_survives_a_restarting_server() -> Result<()> {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "error": "loading" })))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_tags(&server, &["mistral:latest"]).await;

    let client = OllamaClient::connect(&server.uri(), "mistral", &OllamaOptions::default()).await?;
    assert_eq!(client.model_name(), "mistral");
    Ok(())
}

#[tokio::test]
async fn missing_model_without_auto_pull_is_unavailable() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    mount_tags(&server, &["llama3:8b"]).await;

    let err = OllamaClient::connect(&server.uri(), "mistral", &OllamaOptions::default())
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, ResearchError::ModelUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn missing_model_is_pulled_when_enabled() -> Result<()> {
    common::init_test_tracing();
    let server = MockServer::start().await;
    mount_tags(&server, &[]).await;
    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .and(body_partial_json(json!({ "model": "deepseek-r1", "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "success" })))
        .expect(1)
        .mount(&server)
        .await;

    let options = OllamaOptions {
        auto_pull: true,
        ..OllamaOptions::default()
    };
    OllamaClient::connect(&server.uri(), "deepseek-r1", &options).await?;
    Ok(())
}

#[tokio::test]
async fn unreachable_server_is_unavailable() {
    common::init_test_tracing();
    // Nothing listens on the discard port.
    let err = OllamaClient::connect("http://127.0.0.1:9", "mistral", &OllamaOptions::default())
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, ResearchError::ModelUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn generate_sends_system_prompt_and_options() -> Result<()> {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "mistral",
            "stream": false,
            "system": "be brief",
            "options": { "num_predict": 16 }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "Ok", "eval_count": 2, "total_duration": 5_000_000 })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&server.uri(), "mistral", &OllamaOptions::default())?;
    let response = client
        .generate("Say Ok", Some("be brief"), Some(16), Some(0.2))
        .await?;

    assert_eq!(response.text, "Ok");
    assert_eq!(response.tokens_used, Some(2));
    assert_eq!(response.duration_ms, Some(5));
    Ok(())
}

#[tokio::test]
async fn server_errors_map_to_model_unavailable() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "out of memory" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(&server.uri(), "mistral", &OllamaOptions::default()).unwrap();
    let err = client.generate("hi", None, None, None).await.unwrap_err();
    match err {
        ResearchError::ModelUnavailable(msg) => assert!(msg.contains("out of memory")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn slow_generation_maps_to_model_unavailable() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "response": "late" }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let options = OllamaOptions {
        request_timeout: Duration::from_millis(50),
        ..OllamaOptions::default()
    };
    let client = OllamaClient::new(&server.uri(), "mistral", &options).unwrap();
    let err = client.generate("hi", None, None, None).await.unwrap_err();
    assert!(matches!(err, ResearchError::ModelUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn summaries_strip_reasoning_traces() -> Result<()> {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "<think>the user wants a summary</think>\nOpen models are improving.",
            "eval_count": 31,
            "total_duration": 1_250_000_000u64
        })))
        .mount(&server)
        .await;

    let client: Arc<dyn LlmClient> =
        Arc::new(OllamaClient::new(&server.uri(), "deepseek-r1", &OllamaOptions::default())?);
    let llm = ResearchLlm::new(Arc::clone(&client), client);

    let summary = llm
        .summarize(&article("Open models keep getting better."), "open source LLMs", 2, ModelTier::Basic)
        .await?;

    assert_eq!(summary.summary_text, "Open models are improving.");
    assert_eq!(summary.rank, 2);
    assert_eq!(summary.model_used, "deepseek-r1");
    assert_eq!(summary.title, "A story");
    assert_eq!(summary.tokens_used, Some(31));
    assert_eq!(summary.generation_ms, Some(1250));
    Ok(())
}

#[tokio::test]
async fn empty_answers_are_invalid_output() {
    common::init_test_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "<think>…</think>  " })))
        .mount(&server)
        .await;

    let client: Arc<dyn LlmClient> =
        Arc::new(OllamaClient::new(&server.uri(), "mistral", &OllamaOptions::default()).unwrap());
    let llm = ResearchLlm::new(Arc::clone(&client), client);

    let err = llm
        .summarize(&article("Body"), "topic", 1, ModelTier::Basic)
        .await
        .unwrap_err();
    assert!(matches!(err, ResearchError::ModelOutputInvalid(_)), "got {err:?}");
}

#[tokio::test]
async fn trend_extraction_parses_model_json() -> Result<()> {
    common::init_test_tracing();
    let server = MockServer::start().await;
    mount_tags(&server, &["mistral:latest"]).await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "```json\n[{\"rank\":1,\"title\":\"Solar eclipse\",\"volume\":\"2M+ searches\"}]\n```"
        })))
        .mount(&server)
        .await;

    let models = TierModels {
        endpoint: server.uri(),
        basic: "mistral".into(),
        reasoning: "mistral".into(),
    };
    let llm = connect_tiers(&models, &OllamaOptions::default()).await?;
    let trends = llm
        .extract_trends("Trending now: Solar eclipse 2M+ searches", ModelTier::Basic)
        .await?;

    assert_eq!(trends.len(), 1);
    assert_eq!(trends[0].title, "Solar eclipse");
    Ok(())
}
