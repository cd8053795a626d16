#![cfg(feature = "gateway")]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use animegen_relay::gateway::{RelayHttpState, router};
use animegen_relay::{
    ApiKey, GenerationOrchestrator, InferenceProvider, JobHandle, JobPayload, JobState, JobStatus,
    PollPolicy, RelayError, ReplicateClient,
};
use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use httpmock::{Method::GET, Method::POST, MockServer};
use serde_json::{Value, json};
use tower::util::ServiceExt;

/// Answers the submission with the first snapshot and every status check
/// with the next one; keeps answering `running` once the script runs out.
struct ScriptedProvider {
    script: Mutex<VecDeque<JobStatus>>,
    output: Vec<String>,
    calls: Mutex<u32>,
}

impl ScriptedProvider {
    fn new(script: impl IntoIterator<Item = JobStatus>, output: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            output: output.iter().map(|uri| uri.to_string()).collect(),
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    fn next(&self) -> JobState {
        *self.calls.lock().unwrap() += 1;
        let status = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JobStatus::Running);
        let mut state = JobState::new(JobHandle::new("pred-1"), status);
        match status {
            JobStatus::Succeeded => state = state.with_output(self.output.clone()),
            JobStatus::Failed => state = state.with_error_detail("NSFW content detected"),
            _ => {}
        }
        state
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    fn provider(&self) -> &str {
        "scripted"
    }

    async fn submit_job(&self, _payload: &JobPayload) -> Result<JobState, RelayError> {
        Ok(self.next())
    }

    async fn get_job_status(&self, _handle: &JobHandle) -> Result<JobState, RelayError> {
        Ok(self.next())
    }
}

fn fast_policy() -> PollPolicy {
    PollPolicy {
        interval: Duration::ZERO,
        max_polls: 120,
    }
}

fn app_with(provider: Arc<dyn InferenceProvider>) -> axum::Router {
    let orchestrator =
        GenerationOrchestrator::new(provider, "owner/model:abc").with_poll_policy(fast_policy());
    router(RelayHttpState::new(orchestrator))
}

fn post_json(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, parsed)
}

#[tokio::test]
async fn missing_prompt_is_rejected_before_orchestration() {
    let provider = ScriptedProvider::new([JobStatus::Succeeded], &["https://x/img.png"]);
    let app = app_with(provider.clone());

    let bodies = [
        json!({ "width": 512 }).to_string(),
        json!({ "prompt": "" }).to_string(),
        String::new(),
    ];
    for body in bodies {
        let (status, parsed) = send(&app, post_json("/generate-anime", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(parsed["success"], false);
        assert_eq!(parsed["error"], "Missing prompt parameter");
        assert_eq!(parsed["message"], "Invalid request");
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let provider = ScriptedProvider::new([], &[]);
    let app = app_with(provider.clone());

    let (status, parsed) = send(&app, post_json("/generate-anime", "{\"prompt\": ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(parsed["error"], "Invalid JSON body");
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn non_object_json_bodies_are_rejected_alike() {
    let provider = ScriptedProvider::new([], &[]);
    let app = app_with(provider.clone());

    for body in ["[]", "null", "42", "\"a cat\""] {
        let (status, parsed) = send(&app, post_json("/generate-anime", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
        assert_eq!(parsed["error"], "Invalid JSON body", "body {body}");
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn success_returns_image_url_and_metadata() {
    let provider = ScriptedProvider::new(
        [
            JobStatus::Pending,
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Succeeded,
        ],
        &["https://x/img.png"],
    );
    let app = app_with(provider.clone());

    let body = json!({
        "prompt": "a cat",
        "width": 512,
        "height": 512,
        "userId": 1234,
        "userName": "builderman"
    });
    let (status, parsed) = send(&app, post_json("/generate-anime", body.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(parsed["success"], true);
    assert_eq!(parsed["imageUrl"], "https://x/img.png");
    assert_eq!(parsed["robloxAssetId"], Value::Null);
    assert_eq!(parsed["message"], "Anime avatar generated successfully!");
    assert_eq!(parsed["metadata"]["userId"], 1234);
    assert_eq!(parsed["metadata"]["userName"], "builderman");
    assert_eq!(parsed["metadata"]["generationTime"], 3);
    assert_eq!(provider.calls(), 4);
}

#[tokio::test]
async fn provider_failure_maps_to_500() {
    let provider = ScriptedProvider::new([JobStatus::Running, JobStatus::Failed], &[]);
    let app = app_with(provider);

    let (status, parsed) =
        send(&app, post_json("/generate-anime", json!({ "prompt": "a cat" }).to_string())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        parsed,
        json!({
            "success": false,
            "error": "NSFW content detected",
            "message": "Failed to generate image. Please try again."
        })
    );
}

#[tokio::test]
async fn never_terminal_maps_to_504() {
    let provider = ScriptedProvider::new([JobStatus::Running], &[]);
    let app = app_with(provider.clone());

    let (status, parsed) =
        send(&app, post_json("/generate-anime", json!({ "prompt": "a cat" }).to_string())).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(parsed["success"], false);
    assert_eq!(parsed["error"], "Timeout");
    assert_eq!(parsed["message"], "Generation took too long. Please try again.");
    // one submission plus 120 status checks
    assert_eq!(provider.calls(), 121);
}

#[tokio::test]
async fn preflight_gets_cors_headers_without_reaching_handlers() {
    let provider = ScriptedProvider::new([], &[]);
    let app = app_with(provider.clone());

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/generate-anime")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "GET, POST, OPTIONS");
    assert_eq!(
        headers["access-control-allow-headers"],
        "Content-Type, Authorization"
    );
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn info_health_and_test_endpoints_skip_the_provider() {
    let provider = ScriptedProvider::new([], &[]);
    let app = app_with(provider.clone());

    let info = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, parsed) = send(&app, info).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parsed["status"], "online");
    assert_eq!(parsed["service"], "Roblox Anime Generator API");
    assert_eq!(parsed["endpoints"]["generate"], "POST /generate-anime");
    assert!(parsed["timestamp"].as_str().is_some_and(|ts| !ts.is_empty()));

    let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(health).await.unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["status"], "healthy");
    assert!(parsed["uptime"].as_f64().is_some_and(|uptime| uptime >= 0.0));

    let (status, parsed) = send(&app, post_json("/generate-test", Body::empty())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        parsed,
        json!({
            "success": true,
            "imageUrl": "https://replicate.delivery/pbxt/example-anime.png",
            "robloxAssetId": null,
            "message": "Test image generated!"
        })
    );

    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn replicate_round_trip_through_the_gateway() {
    if animegen_relay::utils::test_support::should_skip_httpmock() {
        return;
    }
    let server = MockServer::start_async().await;
    let submit = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/predictions")
                .header("authorization", "Bearer r8_live")
                .body_includes("\"prompt\":\"a cat\"")
                .body_includes("\"num_inference_steps\":30");
            then.status(201)
                .header("content-type", "application/json")
                .body(json!({ "id": "pred-9", "status": "starting" }).to_string());
        })
        .await;
    let status = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/predictions/pred-9");
            then.status(200)
                .header("content-type", "application/json")
                .body(
                    json!({
                        "id": "pred-9",
                        "status": "succeeded",
                        "output": ["https://replicate.delivery/pred-9.png"]
                    })
                    .to_string(),
                );
        })
        .await;

    let client = ReplicateClient::new(ApiKey::new("r8_live")).with_base_url(server.url("/v1"));
    let app = app_with(Arc::new(client));

    let body = json!({ "prompt": "a cat", "steps": 30 }).to_string();
    let (code, parsed) = send(&app, post_json("/generate-anime", body)).await;

    submit.assert_async().await;
    status.assert_async().await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(parsed["imageUrl"], "https://replicate.delivery/pred-9.png");
    assert_eq!(parsed["metadata"]["generationTime"], 1);
}

#[tokio::test]
async fn rejected_credential_never_leaks_into_the_response() {
    if animegen_relay::utils::test_support::should_skip_httpmock() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/predictions");
            then.status(401)
                .header("content-type", "application/json")
                .body(r#"{"detail":"Invalid token r8_leaky_secret"}"#);
        })
        .await;

    let client =
        ReplicateClient::new(ApiKey::new("r8_leaky_secret")).with_base_url(server.url("/v1"));
    let app = app_with(Arc::new(client));

    let response = app
        .clone()
        .oneshot(post_json(
            "/generate-anime",
            json!({ "prompt": "a cat" }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(!text.contains("r8_leaky_secret"));

    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["error"], "Invalid API key");
    assert_eq!(
        parsed["message"],
        "Server configuration error. Please contact admin."
    );
}

#[tokio::test]
async fn credential_rejected_while_polling_is_a_configuration_error() {
    if animegen_relay::utils::test_support::should_skip_httpmock() {
        return;
    }
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/predictions");
            then.status(201)
                .header("content-type", "application/json")
                .body(json!({ "id": "p", "status": "starting" }).to_string());
        })
        .await;
    let status = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/predictions/p");
            then.status(401)
                .header("content-type", "application/json")
                .body(r#"{"detail":"Invalid token r8_revoked_secret"}"#);
        })
        .await;

    let client =
        ReplicateClient::new(ApiKey::new("r8_revoked_secret")).with_base_url(server.url("/v1"));
    let app = app_with(Arc::new(client));

    let response = app
        .clone()
        .oneshot(post_json(
            "/generate-anime",
            json!({ "prompt": "a cat" }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(!text.contains("r8_revoked_secret"));

    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        parsed,
        json!({
            "success": false,
            "error": "Invalid API key",
            "message": "Server configuration error. Please contact admin."
        })
    );
    // the rejected status check is not retried
    status.assert_calls_async(1).await;
}
