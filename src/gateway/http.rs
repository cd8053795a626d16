use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::RelayError;
use crate::orchestrator::GenerationOrchestrator;
use crate::types::{GenerationOutcome, GenerationRequest, GenerationResult};

pub const DEFAULT_SERVICE_NAME: &str = "Roblox Anime Generator API";
pub const TEST_IMAGE_URL: &str = "https://replicate.delivery/pbxt/example-anime.png";

const INVALID_REQUEST_MESSAGE: &str = "Invalid request";

#[derive(Clone)]
pub struct RelayHttpState {
    orchestrator: Arc<GenerationOrchestrator>,
    service_name: Arc<str>,
    started_at: Instant,
}

impl RelayHttpState {
    pub fn new(orchestrator: GenerationOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            service_name: Arc::from(DEFAULT_SERVICE_NAME),
            started_at: Instant::now(),
        }
    }

    pub fn with_service_name(mut self, name: impl AsRef<str>) -> Self {
        self.service_name = Arc::from(name.as_ref());
        self
    }
}

pub fn router(state: RelayHttpState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/generate-anime", post(generate_anime))
        .route("/generate-test", post(generate_test))
        .fallback(handle_fallback)
        .layer(middleware::from_fn(cors))
        .with_state(state)
}

/// Permissive cross-origin policy; preflight requests never reach a handler.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct ServiceEndpoints {
    generate: &'static str,
    health: &'static str,
}

#[derive(Debug, Serialize)]
struct ServiceInfoResponse {
    status: &'static str,
    service: String,
    timestamp: String,
    endpoints: ServiceEndpoints,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime: f64,
    timestamp: String,
}

async fn service_info(State(state): State<RelayHttpState>) -> Json<ServiceInfoResponse> {
    Json(ServiceInfoResponse {
        status: "online",
        service: state.service_name.to_string(),
        timestamp: now_rfc3339(),
        endpoints: ServiceEndpoints {
            generate: "POST /generate-anime",
            health: "GET /health",
        },
    })
}

async fn health(State(state): State<RelayHttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        uptime: state.started_at.elapsed().as_secs_f64(),
        timestamp: now_rfc3339(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct GenerateAnimeBody {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    negative_prompt: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    steps: Option<u32>,
    #[serde(default, rename = "userId")]
    user_id: Option<Value>,
    #[serde(default, rename = "userName")]
    user_name: Option<Value>,
}

impl GenerateAnimeBody {
    fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("request body must be a JSON object"));
        }
        serde_json::from_value(value)
    }

    fn into_request(self) -> crate::Result<GenerationRequest> {
        Ok(GenerationRequest::new(self.prompt.unwrap_or_default())?
            .with_negative_prompt(self.negative_prompt)
            .with_size(self.width, self.height)
            .with_steps(self.steps)
            .with_requester(self.user_id, self.user_name))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_name: Option<Value>,
    generation_time: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateSuccessResponse {
    success: bool,
    image_url: String,
    roblox_asset_id: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<GenerationMetadata>,
}

#[derive(Debug, Serialize)]
struct GenerateFailureResponse {
    success: bool,
    error: String,
    message: String,
}

fn failure_response(
    status: StatusCode,
    error: impl Into<String>,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(GenerateFailureResponse {
            success: false,
            error: error.into(),
            message: message.into(),
        }),
    )
        .into_response()
}

async fn generate_anime(State(state): State<RelayHttpState>, body: Bytes) -> Response {
    let parsed = match GenerateAnimeBody::parse(&body) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(error = %err, "rejecting malformed generation request");
            return failure_response(
                StatusCode::BAD_REQUEST,
                "Invalid JSON body",
                INVALID_REQUEST_MESSAGE,
            );
        }
    };

    tracing::info!(
        user_name = ?parsed.user_name,
        prompt = parsed.prompt.as_deref().unwrap_or_default(),
        "generation request received"
    );

    let request = match parsed.into_request() {
        Ok(request) => request,
        Err(RelayError::InvalidRequest(reason)) => {
            return failure_response(StatusCode::BAD_REQUEST, reason, INVALID_REQUEST_MESSAGE);
        }
        Err(err) => {
            return failure_response(
                StatusCode::BAD_REQUEST,
                err.to_string(),
                INVALID_REQUEST_MESSAGE,
            );
        }
    };

    let user_id = request.requester_id().cloned();
    let user_name = request.requester_name().cloned();
    let result = state.orchestrator.generate(request).await;
    generation_response(&result, user_id, user_name)
}

fn generation_response(
    result: &GenerationResult,
    user_id: Option<Value>,
    user_name: Option<Value>,
) -> Response {
    if let (true, Some(image_url)) = (result.success(), result.image_url()) {
        return Json(GenerateSuccessResponse {
            success: true,
            image_url: image_url.to_string(),
            roblox_asset_id: result.asset_id().map(str::to_string),
            message: result.message().to_string(),
            metadata: Some(GenerationMetadata {
                user_id,
                user_name,
                generation_time: result.elapsed_polls(),
            }),
        })
        .into_response();
    }

    let status = match result.outcome() {
        GenerationOutcome::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    failure_response(
        status,
        result.error().unwrap_or("Generation failed"),
        result.message(),
    )
}

/// Canned success that never touches the provider, for client integration checks.
async fn generate_test() -> Json<GenerateSuccessResponse> {
    tracing::info!("test generation request");
    Json(GenerateSuccessResponse {
        success: true,
        image_url: TEST_IMAGE_URL.to_string(),
        roblox_asset_id: None,
        message: "Test image generated!".to_string(),
        metadata: None,
    })
}

async fn handle_fallback() -> Response {
    failure_response(StatusCode::NOT_FOUND, "Not found", "Unknown endpoint")
}
