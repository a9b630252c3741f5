pub mod connection;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod postgres;

use chrono::{DateTime, Utc};

use crate::job::{FetchedResult, Job, JobOutcome, JobStatus, WorkerInfo};
use crate::protocol::StatusReport;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

/// Default slot count recorded for a worker that registers without one
pub const DEFAULT_MAX_QUEUE_SIZE: i32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {0} already exists")]
    DuplicateJob(String),

    #[error("worker {0} is already registered")]
    DuplicateWorker(String),

    #[error("worker {0} is not registered")]
    UnknownWorker(String),

    #[error("job {job_id} is {status}, expected dispatched")]
    InvalidTransition { job_id: String, status: JobStatus },

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable table of jobs and registered workers
///
/// Every method is atomic on its own. `claim_next_queued`,
/// `update_status_batch` and `submit_result` are serializable with respect
/// to each other, so two workers never claim the same job and a batched
/// status report never overwrites a terminal job.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new `Queued` job
    async fn create(&self, job_id: &str, payload: &[u8]) -> Result<Job, StoreError>;

    async fn get(&self, job_id: &str) -> Result<Job, StoreError>;

    /// All jobs, oldest submission first
    async fn list(&self) -> Result<Vec<Job>, StoreError>;

    /// Record worker-local progress for dispatched jobs in one transaction.
    /// Reports for unknown or non-dispatched jobs are skipped. Returns the
    /// number of jobs updated.
    async fn update_status_batch(&self, reports: &[StatusReport]) -> Result<u64, StoreError>;

    /// Move the oldest `Queued` job to `Dispatched` for `worker_name`
    async fn claim_next_queued(&self, worker_name: &str) -> Result<Option<Job>, StoreError>;

    /// Move a `Dispatched` job to its terminal state
    async fn submit_result(&self, job_id: &str, outcome: JobOutcome) -> Result<(), StoreError>;

    /// Return a terminal job's result and remove the record
    async fn fetch_and_delete(&self, job_id: &str) -> Result<FetchedResult, StoreError>;

    /// Add a worker. A name already registered is a duplicate unless its
    /// holder was last seen before `stale_before`, in which case the new
    /// registration replaces it.
    async fn register_worker(
        &self,
        worker_name: &str,
        max_queue_size: i32,
        stale_before: DateTime<Utc>,
    ) -> Result<WorkerInfo, StoreError>;

    /// Remove a worker so its name can be registered again
    async fn deregister_worker(&self, worker_name: &str) -> Result<(), StoreError>;

    /// Store the load a worker reported on its latest poll
    async fn record_worker_load(
        &self,
        worker_name: &str,
        current_queue_size: i32,
        max_queue_size: Option<i32>,
    ) -> Result<(), StoreError>;

    async fn list_workers(&self) -> Result<Vec<WorkerInfo>, StoreError>;

    async fn set_shutdown(&self, requested: bool) -> Result<(), StoreError>;

    async fn shutdown_requested(&self) -> Result<bool, StoreError>;

    /// Cheap connectivity check used by health endpoints
    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self);
}
