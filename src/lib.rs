mod error;

pub mod config;
pub mod orchestrator;
pub mod providers;
pub mod types;
pub mod utils;

#[cfg(feature = "gateway")]
pub mod gateway;

pub use config::{ApiKey, Env, RelayConfig, RelayConfigFile};
pub use error::{RelayError, Result};
pub use orchestrator::{GenerationOrchestrator, PollPolicy};
pub use providers::{InferenceProvider, ReplicateClient};
pub use types::{
    GenerationOutcome, GenerationRequest, GenerationResult, JobHandle, JobInput, JobPayload,
    JobState, JobStatus,
};
