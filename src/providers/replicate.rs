use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::InferenceProvider;

use crate::config::{ApiKey, DEFAULT_BASE_URL, RelayConfig};
use crate::types::{JobHandle, JobPayload, JobState, JobStatus};
use crate::utils::http::send_checked_json;
use crate::{RelayError, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn join_endpoint(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    format!("{base}/{endpoint}")
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(RelayError::Http)
}

/// Client for the Replicate predictions API.
#[derive(Clone)]
pub struct ReplicateClient {
    http: reqwest::Client,
    base_url: String,
    api_key: ApiKey,
}

impl std::fmt::Debug for ReplicateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicateClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key)
            .finish()
    }
}

impl ReplicateClient {
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            http: http_client(HTTP_TIMEOUT).unwrap_or_else(|_| reqwest::Client::new()),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        Ok(Self::new(config.api_key.clone())
            .with_http_client(http_client(config.http_timeout)?)
            .with_base_url(config.base_url.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        join_endpoint(&self.base_url, path)
    }
}

#[async_trait]
impl InferenceProvider for ReplicateClient {
    fn provider(&self) -> &str {
        "replicate"
    }

    async fn submit_job(&self, payload: &JobPayload) -> Result<JobState> {
        let req = self
            .http
            .post(self.endpoint("predictions"))
            .bearer_auth(self.api_key.expose())
            .json(payload);
        let parsed = send_checked_json::<Prediction>(req).await?;
        parsed.into_job_state()
    }

    async fn get_job_status(&self, handle: &JobHandle) -> Result<JobState> {
        let req = self
            .http
            .get(self.endpoint(&format!("predictions/{}", handle.as_str())))
            .bearer_auth(self.api_key.expose());
        let parsed = send_checked_json::<Prediction>(req).await?;
        parsed.into_job_state()
    }
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Prediction {
    fn into_job_state(self) -> Result<JobState> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(RelayError::InvalidResponse(
                "prediction response is missing an id".to_string(),
            ));
        }

        let status = self
            .status
            .as_deref()
            .map(JobStatus::from_provider)
            .unwrap_or(JobStatus::Pending);

        let mut output = Vec::<String>::new();
        if let Some(value) = self.output.as_ref() {
            collect_output_uris(value, &mut output);
        }

        Ok(JobState {
            handle: JobHandle::new(id),
            status,
            output,
            error_detail: self.error.as_ref().and_then(error_detail),
        })
    }
}

fn collect_output_uris(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(uri) => {
            let uri = uri.trim();
            if !uri.is_empty() {
                out.push(uri.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_output_uris(item, out);
            }
        }
        _ => {}
    }
}

fn error_detail(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.trim())
            .filter(|text| !text.is_empty())
            .map(str::to_string),
        other => Some(other.to_string()),
    }
}
