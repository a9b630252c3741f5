use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::db::StoreError;
use crate::job::{Job, JobStatus, LocalState, WorkerInfo};

/// Database representation of a job with all fields
#[derive(Debug, FromRow)]
pub struct JobRow {
    pub job_id: String,
    pub submitted_at: DateTime<Utc>,
    pub payload: Vec<u8>,
    pub status: String,
    pub assigned_worker: Option<String>,
    pub worker_state: Option<String>,
    pub result: Option<Vec<u8>>,
    pub exception: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row.status.parse().map_err(StoreError::Corrupt)?;
        let worker_state = row
            .worker_state
            .as_deref()
            .map(str::parse::<LocalState>)
            .transpose()
            .map_err(StoreError::Corrupt)?;

        Ok(Job {
            job_id: row.job_id,
            submitted_at: row.submitted_at,
            payload: row.payload,
            status,
            assigned_worker: row.assigned_worker,
            worker_state,
            result: row.result,
            exception: row.exception,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct WorkerRow {
    pub worker_name: String,
    pub current_queue_size: i32,
    pub max_queue_size: i32,
    pub registered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl From<WorkerRow> for WorkerInfo {
    fn from(row: WorkerRow) -> Self {
        WorkerInfo {
            worker_name: row.worker_name,
            current_queue_size: row.current_queue_size,
            max_queue_size: row.max_queue_size,
            registered_at: row.registered_at,
            last_seen_at: row.last_seen_at,
        }
    }
}
