use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a job as tracked by the scheduler
///
/// `Queued -> Dispatched -> Completed | Failed`. Terminal states never
/// transition again; the record is only removed by a result fetch.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Dispatched,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Dispatched => "dispatched",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "dispatched" => Ok(JobStatus::Dispatched),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Progress of a dispatched job inside the worker that holds it
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LocalState {
    /// Waiting for a free execution slot
    Pending,
    /// Occupying an execution slot
    Running,
}

impl LocalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocalState::Pending => "pending",
            LocalState::Running => "running",
        }
    }
}

impl FromStr for LocalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LocalState::Pending),
            "running" => Ok(LocalState::Running),
            other => Err(format!("unknown worker state: {}", other)),
        }
    }
}

/// A job record as held by the job store
///
/// `assigned_worker` is set iff the status is not `Queued`. `result` is only
/// present on `Completed` and `exception` only on `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub submitted_at: DateTime<Utc>,
    pub payload: Vec<u8>,
    pub status: JobStatus,
    pub assigned_worker: Option<String>,
    pub worker_state: Option<LocalState>,
    pub result: Option<Vec<u8>>,
    pub exception: Option<String>,
}

/// Terminal outcome of a job, as submitted by the worker that ran it
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(Vec<u8>),
    Failed(String),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed(_) => JobStatus::Completed,
            JobOutcome::Failed(_) => JobStatus::Failed,
        }
    }
}

/// What `fetch_and_delete` hands back for a terminal job
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResult {
    pub status: JobStatus,
    pub result: Option<Vec<u8>>,
    pub exception: Option<String>,
}

/// A worker as registered with the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_name: String,
    pub current_queue_size: i32,
    pub max_queue_size: i32,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}
