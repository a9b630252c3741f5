use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::error::ServiceError;
use super::validation::validate_job_id;
use crate::db::{JobStore, DEFAULT_MAX_QUEUE_SIZE};
use crate::job::{Job, JobOutcome, JobStatus, WorkerInfo};
use crate::protocol::{FetchJobRequest, JobStatusView, ResultPackage, ResultReply};

/// What `/fetch_job` hands back to a polling worker
#[derive(Debug)]
pub enum Assignment {
    Job(Job),
    NoJob,
    Shutdown,
}

/// How long a registered worker may stay silent before its name is free
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// Scheduler business logic, independent of HTTP
///
/// Every state change goes through the [`JobStore`], so any number of
/// scheduler processes may share one durable store.
#[derive(Clone)]
pub struct SchedulerService {
    store: Arc<dyn JobStore>,
    worker_timeout: Duration,
}

impl SchedulerService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
        }
    }

    pub fn with_worker_timeout(mut self, worker_timeout: Duration) -> Self {
        self.worker_timeout = worker_timeout;
        self
    }

    /// Add a worker to the registry
    ///
    /// # Business Logic
    /// - A name held by a worker seen within `worker_timeout` is a conflict
    /// - A name whose holder went silent longer than that is taken over,
    ///   which lets a crashed worker restart under its old name
    pub async fn register_worker(
        &self,
        worker_name: &str,
        max_queue_size: Option<i32>,
    ) -> Result<WorkerInfo, ServiceError> {
        let max_queue_size = max_queue_size.unwrap_or(DEFAULT_MAX_QUEUE_SIZE);
        let timeout = chrono::Duration::from_std(self.worker_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let stale_before = Utc::now() - timeout;

        let worker = self
            .store
            .register_worker(worker_name, max_queue_size, stale_before)
            .await?;
        info!(
            "Service: Registered worker {} (max_queue_size={})",
            worker.worker_name, worker.max_queue_size
        );
        Ok(worker)
    }

    pub async fn deregister_worker(&self, worker_name: &str) -> Result<(), ServiceError> {
        self.store.deregister_worker(worker_name).await?;
        info!("Service: Deregistered worker {}", worker_name);
        Ok(())
    }

    /// Enqueue an opaque payload
    ///
    /// # Business Logic
    /// - Rejects an empty payload
    /// - Uses the caller's job id when given, otherwise a fresh UUID
    /// - A duplicate id is a conflict, never an overwrite
    pub async fn submit_job(
        &self,
        job_id: Option<String>,
        payload: Vec<u8>,
    ) -> Result<Job, ServiceError> {
        if payload.is_empty() {
            return Err(ServiceError::Validation(
                "Job payload must not be empty".to_string(),
            ));
        }

        let job_id = match job_id {
            Some(job_id) => {
                validate_job_id(&job_id).map_err(ServiceError::Validation)?;
                job_id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let job = self.store.create(&job_id, &payload).await?;
        info!("Service: Queued job {} ({} bytes)", job.job_id, payload.len());
        Ok(job)
    }

    /// Handle one worker poll
    ///
    /// # Business Logic
    /// 1. Record the worker's load; an unregistered worker is rejected here,
    ///    before anything else changes
    /// 2. Apply the worker's batched local statuses in one transaction
    /// 3. Answer `Shutdown` once a cluster shutdown was requested
    /// 4. Otherwise claim the oldest queued job for this worker
    pub async fn fetch_job(&self, request: &FetchJobRequest) -> Result<Assignment, ServiceError> {
        self.store
            .record_worker_load(
                &request.worker_name,
                request.current_queue_size,
                request.max_queue_size,
            )
            .await?;

        if !request.job_statuses.is_empty() {
            let updated = self.store.update_status_batch(&request.job_statuses).await?;
            debug!(
                "Service: Worker {} reported {} statuses, {} applied",
                request.worker_name,
                request.job_statuses.len(),
                updated
            );
        }

        if self.store.shutdown_requested().await? {
            debug!("Service: Sending shutdown to worker {}", request.worker_name);
            return Ok(Assignment::Shutdown);
        }

        match self.store.claim_next_queued(&request.worker_name).await? {
            Some(job) => {
                info!(
                    "Service: Dispatched job {} to worker {}",
                    job.job_id, request.worker_name
                );
                Ok(Assignment::Job(job))
            }
            None => Ok(Assignment::NoJob),
        }
    }

    /// Record a worker's final result for a dispatched job
    pub async fn submit_job_result(&self, package: ResultPackage) -> Result<(), ServiceError> {
        validate_job_id(&package.job_id).map_err(ServiceError::Validation)?;

        let outcome = match package.status {
            JobStatus::Completed => {
                let result = package.result.unwrap_or(serde_json::Value::Null);
                let bytes = serde_json::to_vec(&result)
                    .map_err(|e| ServiceError::Protocol(format!("Unencodable result: {}", e)))?;
                JobOutcome::Completed(bytes)
            }
            JobStatus::Failed => JobOutcome::Failed(
                package
                    .exception
                    .unwrap_or_else(|| "job failed without an exception".to_string()),
            ),
            status => {
                return Err(ServiceError::Validation(format!(
                    "Result status must be completed or failed, got {}",
                    status
                )))
            }
        };

        let status = outcome.status();
        self.store.submit_result(&package.job_id, outcome).await?;
        info!("Service: Job {} finished as {}", package.job_id, status);
        Ok(())
    }

    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusView, ServiceError> {
        let job = self.store.get(job_id).await?;
        Ok(JobStatusView::from(&job))
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobStatusView>, ServiceError> {
        let jobs = self.store.list().await?;
        Ok(jobs.iter().map(JobStatusView::from).collect())
    }

    pub async fn worker_status(&self) -> Result<Vec<WorkerInfo>, ServiceError> {
        Ok(self.store.list_workers().await?)
    }

    /// Return a terminal job's result and delete the record
    pub async fn get_result(&self, job_id: &str) -> Result<ResultReply, ServiceError> {
        let fetched = self.store.fetch_and_delete(job_id).await?;

        let result = match fetched.result {
            Some(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Service: Stored result of job {} is not JSON: {}", job_id, e);
                    Some(serde_json::Value::String(
                        String::from_utf8_lossy(&bytes).into_owned(),
                    ))
                }
            },
            None => None,
        };

        info!("Service: Delivered result of job {}", job_id);
        Ok(ResultReply {
            status: fetched.status,
            result,
            exception: fetched.exception,
        })
    }

    /// Persist the cluster-wide shutdown flag
    pub async fn request_shutdown(&self) -> Result<(), ServiceError> {
        self.store.set_shutdown(true).await?;
        info!("Service: Cluster shutdown requested");
        Ok(())
    }

    pub async fn health(&self) -> Result<(), ServiceError> {
        Ok(self.store.ping().await?)
    }
}
