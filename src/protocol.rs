//! Messages exchanged between the scheduler, its workers and clients.
//!
//! Control messages travel as JSON. Job payloads and result packages travel
//! as multipart file fields (`job` and `package`), and an assigned job is
//! returned from `/fetch_job` as raw bytes with its id in [`JOB_ID_HEADER`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::job::{Job, JobStatus, LocalState};

/// Body returned by `/fetch_job` when the queue has nothing for the worker
pub const NO_JOB: &str = "no_job";

/// Body returned by `/fetch_job` once a cluster shutdown was requested
pub const SHUTDOWN: &str = "shutdown";

/// Header carrying the id of the job whose payload is in the response body
pub const JOB_ID_HEADER: &str = "x-job-id";

/// Multipart field holding a serialized job payload on `/submit_job`
pub const JOB_FIELD: &str = "job";

/// Multipart field holding an optional caller-chosen id on `/submit_job`
pub const JOB_ID_FIELD: &str = "job_id";

/// Multipart field holding a [`ResultPackage`] on `/submit_job_result`
pub const PACKAGE_FIELD: &str = "package";

pub const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Worker name must be between 1 and 255 characters"
    ))]
    pub worker_name: String,
    #[validate(range(min = 1, message = "Max queue size must be positive"))]
    #[serde(default)]
    pub max_queue_size: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeregisterRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Worker name must be between 1 and 255 characters"
    ))]
    pub worker_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitJobResponse {
    pub success: bool,
    pub job_id: String,
}

/// Local progress of one in-flight job, piggybacked on a worker's poll
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub job_id: String,
    pub status: LocalState,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FetchJobRequest {
    #[validate(length(
        min = 1,
        max = 255,
        message = "Worker name must be between 1 and 255 characters"
    ))]
    pub worker_name: String,
    #[serde(default)]
    pub job_statuses: Vec<StatusReport>,
    #[validate(range(min = 0, message = "Queue size cannot be negative"))]
    #[serde(default)]
    pub current_queue_size: i32,
    #[validate(range(min = 1, message = "Max queue size must be positive"))]
    #[serde(default)]
    pub max_queue_size: Option<i32>,
}

/// Outcome of one job as reported by the worker that ran it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultPackage {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub exception: Option<String>,
}

impl ResultPackage {
    pub fn completed(job_id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Completed,
            result: Some(result),
            exception: None,
        }
    }

    pub fn failed(job_id: impl Into<String>, exception: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            result: None,
            exception: Some(exception.into()),
        }
    }
}

/// Public view of a job record; never exposes the payload or result bytes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusView {
    pub job_id: String,
    pub submitted_at: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_state: Option<LocalState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            submitted_at: job.submitted_at,
            status: job.status,
            assigned_worker: job.assigned_worker.clone(),
            worker_state: job.worker_state,
            exception: job.exception.clone(),
        }
    }
}

/// Body of `/get_result/{job_id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultReply {
    pub status: JobStatus,
    pub result: Option<serde_json::Value>,
    pub exception: Option<String>,
}

/// What a worker gets back from `/fetch_job`
#[derive(Debug, Clone, PartialEq)]
pub enum FetchReply {
    Job { job_id: String, payload: Vec<u8> },
    NoJob,
    Shutdown,
}
