mod generation;
mod job;

pub use generation::{GenerationOutcome, GenerationRequest, GenerationResult};
pub use job::{JobHandle, JobInput, JobPayload, JobState, JobStatus};
