use std::time::Duration;

use researcher_http::{Auth, HttpClient, HttpError, RequestOpts};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({"error": "loading"})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "ok"})))
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap().with_retries(1);
    let body: Value = client
        .post_json_opts("api/generate", &json!({"prompt": "hi"}), RequestOpts::default())
        .await
        .unwrap();

    assert_eq!(body["response"], "ok");
}

#[tokio::test]
async fn client_errors_surface_the_server_message() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("x-request-id", "abc123")
                .set_body_json(json!({"error": "model 'nope' not found"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let err = client
        .get_json::<Value>("api/tags", RequestOpts::default())
        .await
        .unwrap_err();

    match err {
        HttpError::Api {
            status,
            message,
            request_id,
        } => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(message, "model 'nope' not found");
            assert_eq!(request_id, "abc123");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn slow_responses_become_timeouts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let opts = RequestOpts {
        timeout: Some(Duration::from_millis(50)),
        retries: Some(0),
        ..Default::default()
    };
    let err = client.get_json::<Value>("slow", opts).await.unwrap_err();

    assert!(matches!(err, HttpError::Timeout(_)), "got {err:?}");
    assert!(err.is_unreachable());
}

#[tokio::test]
async fn malformed_bodies_are_decode_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let err = client
        .get_json::<Value>("api/tags", RequestOpts::default())
        .await
        .unwrap_err();

    match err {
        HttpError::Decode(_, snippet) => assert!(snippet.contains("not json")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn bearer_auth_is_sent_sanitized() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(&server.uri()).unwrap();
    let opts = RequestOpts {
        auth: Some(Auth::Bearer(" \"secret\" ")),
        ..Default::default()
    };
    let body: Value = client.get_json("api/tags", opts).await.unwrap();

    assert_eq!(body["models"], json!([]));
}
