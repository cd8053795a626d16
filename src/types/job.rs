use std::fmt;

use serde::{Deserialize, Serialize};

/// Provider-issued identifier for one submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Maps a provider status string. Unrecognized values are treated as
    /// still running so the poll loop keeps going until the ceiling.
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "starting" | "pending" | "queued" => Self::Pending,
            "processing" | "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" | "aborted" => Self::Canceled,
            _ => Self::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time snapshot of a provider job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobState {
    pub handle: JobHandle,
    pub status: JobStatus,
    /// Output URIs in provider order; empty when the provider has none.
    pub output: Vec<String>,
    pub error_detail: Option<String>,
}

impl JobState {
    pub fn new(handle: JobHandle, status: JobStatus) -> Self {
        Self {
            handle,
            status,
            output: Vec::new(),
            error_detail: None,
        }
    }

    pub fn with_output(mut self, output: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.output = output.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }
}

/// Submission body for the predictions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub version: String,
    pub input: JobInput,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInput {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub num_outputs: u32,
    pub scheduler: String,
}
