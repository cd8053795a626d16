use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{RelayError, Result};

/// One validated image-generation request with defaults applied.
///
/// Construction refuses an empty prompt, so every value that reaches the
/// orchestrator already satisfies that invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    negative_prompt: String,
    width: u32,
    height: u32,
    steps: u32,
    requester_id: Option<Value>,
    requester_name: Option<Value>,
}

impl GenerationRequest {
    pub const DEFAULT_NEGATIVE_PROMPT: &'static str = "low quality, blurry, ugly";
    pub const DEFAULT_WIDTH: u32 = 512;
    pub const DEFAULT_HEIGHT: u32 = 512;
    pub const DEFAULT_STEPS: u32 = 25;

    pub fn new(prompt: impl Into<String>) -> Result<Self> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(RelayError::InvalidRequest(
                "Missing prompt parameter".to_string(),
            ));
        }
        Ok(Self {
            prompt,
            negative_prompt: Self::DEFAULT_NEGATIVE_PROMPT.to_string(),
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            steps: Self::DEFAULT_STEPS,
            requester_id: None,
            requester_name: None,
        })
    }

    /// `None` or an empty string keeps the default.
    pub fn with_negative_prompt(mut self, negative_prompt: Option<String>) -> Self {
        if let Some(negative_prompt) = negative_prompt.filter(|v| !v.is_empty()) {
            self.negative_prompt = negative_prompt;
        }
        self
    }

    /// `None` or `0` keeps the default for each dimension.
    pub fn with_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = non_zero_or(width, Self::DEFAULT_WIDTH);
        self.height = non_zero_or(height, Self::DEFAULT_HEIGHT);
        self
    }

    pub fn with_steps(mut self, steps: Option<u32>) -> Self {
        self.steps = non_zero_or(steps, Self::DEFAULT_STEPS);
        self
    }

    pub fn with_requester(mut self, id: Option<Value>, name: Option<Value>) -> Self {
        self.requester_id = id;
        self.requester_name = name;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn negative_prompt(&self) -> &str {
        &self.negative_prompt
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn requester_id(&self) -> Option<&Value> {
        self.requester_id.as_ref()
    }

    pub fn requester_name(&self) -> Option<&Value> {
        self.requester_name.as_ref()
    }
}

fn non_zero_or(value: Option<u32>, default: u32) -> u32 {
    value.filter(|v| *v > 0).unwrap_or(default)
}

/// How a generation call ended; the gateway derives the HTTP status from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationOutcome {
    Succeeded,
    ProviderFailure,
    Timeout,
    AuthConfig,
    Transport,
}

impl GenerationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::ProviderFailure => "provider_failure",
            Self::Timeout => "timeout",
            Self::AuthConfig => "auth_config",
            Self::Transport => "transport",
        }
    }
}

/// The normalized result of one generation call. Built once, read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    outcome: GenerationOutcome,
    image_url: Option<String>,
    message: String,
    error: Option<String>,
    elapsed_polls: u32,
}

impl GenerationResult {
    pub(crate) fn succeeded(image_url: String, message: &str, elapsed_polls: u32) -> Self {
        Self {
            outcome: GenerationOutcome::Succeeded,
            image_url: Some(image_url),
            message: message.to_string(),
            error: None,
            elapsed_polls,
        }
    }

    pub(crate) fn failed(
        outcome: GenerationOutcome,
        error: impl Into<String>,
        message: &str,
        elapsed_polls: u32,
    ) -> Self {
        debug_assert!(outcome != GenerationOutcome::Succeeded);
        Self {
            outcome,
            image_url: None,
            message: message.to_string(),
            error: Some(error.into()),
            elapsed_polls,
        }
    }

    pub fn success(&self) -> bool {
        self.outcome == GenerationOutcome::Succeeded
    }

    pub fn outcome(&self) -> GenerationOutcome {
        self.outcome
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    /// Reserved for a platform-upload step that does not exist yet.
    pub fn asset_id(&self) -> Option<&str> {
        None
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Status checks attempted, including one that failed in transit.
    pub fn elapsed_polls(&self) -> u32 {
        self.elapsed_polls
    }
}
