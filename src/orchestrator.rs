//! Drives one generation request through the provider: submit, poll until a
//! terminal status or the poll ceiling, then reconcile into a
//! [`GenerationResult`].

use std::sync::Arc;
use std::time::Duration;

use crate::RelayError;
use crate::providers::InferenceProvider;
use crate::types::{
    GenerationOutcome, GenerationRequest, GenerationResult, JobInput, JobPayload, JobState,
    JobStatus,
};

const GUIDANCE_SCALE: f32 = 7.5;
const NUM_OUTPUTS: u32 = 1;
const SCHEDULER: &str = "DPMSolverMultistep";

/// Emit a "still generating" event every this many polls.
const PROGRESS_LOG_EVERY: u32 = 5;

const MSG_SUCCEEDED: &str = "Anime avatar generated successfully!";
const MSG_FAILED: &str = "Failed to generate image. Please try again.";
const MSG_TIMEOUT: &str = "Generation took too long. Please try again.";
const MSG_AUTH: &str = "Server configuration error. Please contact admin.";
const MSG_TRANSPORT: &str = "Server error occurred. Please try again.";

const ERR_FAILED_FALLBACK: &str = "Generation failed";
const ERR_NO_OUTPUT: &str = "Generation returned no output";
const ERR_TIMEOUT: &str = "Timeout";
const ERR_AUTH: &str = "Invalid API key";

/// Inter-poll delay and the maximum number of status checks.
///
/// The ceiling counts polls; slow status calls stretch the wall-clock time
/// beyond `interval * max_polls`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_polls: 120,
        }
    }
}

pub struct GenerationOrchestrator {
    provider: Arc<dyn InferenceProvider>,
    model_version: String,
    policy: PollPolicy,
}

impl GenerationOrchestrator {
    pub fn new(provider: Arc<dyn InferenceProvider>, model_version: impl Into<String>) -> Self {
        Self {
            provider,
            model_version: model_version.into(),
            policy: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn build_payload(&self, request: &GenerationRequest) -> JobPayload {
        JobPayload {
            version: self.model_version.clone(),
            input: JobInput {
                prompt: request.prompt().to_string(),
                negative_prompt: request.negative_prompt().to_string(),
                width: request.width(),
                height: request.height(),
                num_inference_steps: request.steps(),
                guidance_scale: GUIDANCE_SCALE,
                num_outputs: NUM_OUTPUTS,
                scheduler: SCHEDULER.to_string(),
            },
        }
    }

    /// Never fails: every provider, transport and timeout condition is
    /// encoded in the returned result.
    pub async fn generate(&self, request: GenerationRequest) -> GenerationResult {
        let payload = self.build_payload(&request);

        let submitted = match self.provider.submit_job(&payload).await {
            Ok(state) => state,
            Err(err) => return error_result(&err, 0),
        };
        tracing::info!(
            provider = self.provider.provider(),
            job_id = %submitted.handle,
            status = %submitted.status,
            "job submitted"
        );

        let (state, polls) = match self.poll_until_terminal(submitted).await {
            Ok(done) => done,
            Err((err, polls)) => return error_result(&err, polls),
        };

        let result = reconcile(state, polls);
        if result.success() {
            tracing::info!(
                polls,
                image_url = result.image_url().unwrap_or_default(),
                "generation succeeded"
            );
        } else {
            tracing::warn!(
                polls,
                outcome = result.outcome().as_str(),
                error = result.error().unwrap_or_default(),
                "generation did not succeed"
            );
        }
        result
    }

    async fn poll_until_terminal(
        &self,
        mut state: JobState,
    ) -> Result<(JobState, u32), (RelayError, u32)> {
        let mut polls = 0u32;
        while !state.status.is_terminal() && polls < self.policy.max_polls {
            tokio::time::sleep(self.policy.interval).await;
            polls += 1;

            state = self
                .provider
                .get_job_status(&state.handle)
                .await
                .map_err(|err| (err, polls))?;

            if polls % PROGRESS_LOG_EVERY == 0 {
                tracing::info!(
                    job_id = %state.handle,
                    status = %state.status,
                    polls,
                    "still generating"
                );
            }
        }
        tracing::debug!(job_id = %state.handle, status = %state.status, polls, "polling finished");
        Ok((state, polls))
    }
}

fn reconcile(state: JobState, polls: u32) -> GenerationResult {
    match state.status {
        JobStatus::Succeeded => match state.output.into_iter().next() {
            Some(image_url) => GenerationResult::succeeded(image_url, MSG_SUCCEEDED, polls),
            None => GenerationResult::failed(
                GenerationOutcome::ProviderFailure,
                ERR_NO_OUTPUT,
                MSG_FAILED,
                polls,
            ),
        },
        JobStatus::Failed => GenerationResult::failed(
            GenerationOutcome::ProviderFailure,
            state
                .error_detail
                .unwrap_or_else(|| ERR_FAILED_FALLBACK.to_string()),
            MSG_FAILED,
            polls,
        ),
        JobStatus::Canceled | JobStatus::Pending | JobStatus::Running => {
            GenerationResult::failed(GenerationOutcome::Timeout, ERR_TIMEOUT, MSG_TIMEOUT, polls)
        }
    }
}

fn error_result(err: &RelayError, polls: u32) -> GenerationResult {
    if err.is_unauthorized() {
        tracing::error!(polls, "provider rejected the configured api key");
        return GenerationResult::failed(GenerationOutcome::AuthConfig, ERR_AUTH, MSG_AUTH, polls);
    }
    tracing::error!(polls, error = %err, "provider call failed");
    GenerationResult::failed(
        GenerationOutcome::Transport,
        err.public_message(),
        MSG_TRANSPORT,
        polls,
    )
}
