use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::{ClientError, SchedulerClient};
use crate::job::JobStatus;

/// Client-side handle to one submitted job
///
/// Status is only cached once it is terminal. The result is fetched from
/// the scheduler at most once (which deletes the job there) and then served
/// from the cache. Clones share the cache.
#[derive(Clone)]
pub struct JobConnection {
    job_id: String,
    scheduler: SchedulerClient,
    cache: Arc<Mutex<Cache>>,
}

#[derive(Default)]
struct Cache {
    status: Option<JobStatus>,
    resolved: Option<Resolved>,
}

#[derive(Clone)]
enum Resolved {
    Value(Value),
    Failed(String),
}

impl JobConnection {
    pub fn new(job_id: impl Into<String>, scheduler: SchedulerClient) -> Self {
        Self {
            job_id: job_id.into(),
            scheduler,
            cache: Arc::default(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn scheduler_address(&self) -> &str {
        self.scheduler.base_url()
    }

    /// Current status, from the cache once terminal
    pub async fn status(&self) -> Result<JobStatus, ClientError> {
        let mut cache = self.cache.lock().await;
        self.refresh_status(&mut cache).await
    }

    pub async fn is_done(&self) -> Result<bool, ClientError> {
        Ok(self.status().await?.is_terminal())
    }

    /// The job's return value
    ///
    /// Fails with `NotFinished` while the job is not terminal, `JobFailed`
    /// carrying the captured exception if it failed, and `NotFound` if
    /// another handle already collected the result.
    pub async fn result(&self) -> Result<Value, ClientError> {
        match self.resolve().await? {
            Resolved::Value(value) => Ok(value),
            Resolved::Failed(exception) => Err(ClientError::JobFailed {
                job_id: self.job_id.clone(),
                exception,
            }),
        }
    }

    /// The captured exception, or `None` if the job completed
    pub async fn exception(&self) -> Result<Option<String>, ClientError> {
        match self.resolve().await? {
            Resolved::Value(_) => Ok(None),
            Resolved::Failed(exception) => Ok(Some(exception)),
        }
    }

    async fn refresh_status(&self, cache: &mut Cache) -> Result<JobStatus, ClientError> {
        if let Some(status) = cache.status {
            return Ok(status);
        }

        let view = self.scheduler.job_status(&self.job_id).await?;
        if view.status.is_terminal() {
            cache.status = Some(view.status);
        }
        Ok(view.status)
    }

    async fn resolve(&self) -> Result<Resolved, ClientError> {
        let mut cache = self.cache.lock().await;
        if let Some(resolved) = &cache.resolved {
            return Ok(resolved.clone());
        }

        let status = self.refresh_status(&mut cache).await?;
        if !status.is_terminal() {
            return Err(ClientError::NotFinished(self.job_id.clone()));
        }

        let reply = self.scheduler.get_result(&self.job_id).await?;
        let resolved = match reply.status {
            JobStatus::Completed => Resolved::Value(reply.result.unwrap_or(Value::Null)),
            JobStatus::Failed => Resolved::Failed(
                reply
                    .exception
                    .unwrap_or_else(|| "job failed without a description".to_string()),
            ),
            other => {
                return Err(ClientError::Protocol(format!(
                    "result for job {} returned with status {}",
                    self.job_id, other
                )))
            }
        };
        cache.resolved = Some(resolved.clone());
        Ok(resolved)
    }
}

impl fmt::Debug for JobConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConnection")
            .field("job_id", &self.job_id)
            .field("scheduler", &self.scheduler.base_url())
            .finish()
    }
}
