//! Asynchronous inference providers: submit a job, then fetch its status.

pub mod replicate;

use async_trait::async_trait;

use crate::Result;
use crate::types::{JobHandle, JobPayload, JobState};

pub use replicate::ReplicateClient;

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    fn provider(&self) -> &str;

    /// Creates a job and returns its initial snapshot, which carries the handle.
    async fn submit_job(&self, payload: &JobPayload) -> Result<JobState>;

    async fn get_job_status(&self, handle: &JobHandle) -> Result<JobState>;
}
