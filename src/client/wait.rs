use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::time::sleep;

use super::{Arg, ClientError, JobConnection};

/// How often `wait` re-checks unfinished jobs
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Anything `wait` can resolve into plain values
///
/// Jobs are polled until terminal and replaced by their results; plain
/// values come back unchanged. Sequences keep their input order.
#[async_trait::async_trait]
pub trait Wait: Send {
    type Output: Send;

    async fn wait_every(self, interval: Duration) -> Result<Self::Output, ClientError>;
}

/// Block until every job in `target` is terminal and return the results
pub async fn wait<W: Wait>(target: W) -> Result<W::Output, ClientError> {
    target.wait_every(DEFAULT_POLL_INTERVAL).await
}

async fn until_terminal(jobs: &[&JobConnection], interval: Duration) -> Result<(), ClientError> {
    loop {
        let mut all_done = true;
        for job in jobs {
            if !job.is_done().await? {
                all_done = false;
                break;
            }
        }
        if all_done {
            return Ok(());
        }
        sleep(interval).await;
    }
}

/// Fetch every result before reporting the first error
///
/// Each fetch deletes the job on the scheduler, so one that is cut short
/// loses its result for good. All of them run to completion and fill their
/// handle's cache; only then does a failed job surface.
async fn collect(jobs: &[&JobConnection], interval: Duration) -> Result<Vec<Value>, ClientError> {
    until_terminal(jobs, interval).await?;
    join_all(jobs.iter().map(|job| job.result()))
        .await
        .into_iter()
        .collect()
}

#[async_trait::async_trait]
impl<'a> Wait for &'a JobConnection {
    type Output = Value;

    async fn wait_every(self, interval: Duration) -> Result<Value, ClientError> {
        until_terminal(&[self], interval).await?;
        self.result().await
    }
}

#[async_trait::async_trait]
impl Wait for JobConnection {
    type Output = Value;

    async fn wait_every(self, interval: Duration) -> Result<Value, ClientError> {
        (&self).wait_every(interval).await
    }
}

#[async_trait::async_trait]
impl<'a> Wait for &'a [JobConnection] {
    type Output = Vec<Value>;

    async fn wait_every(self, interval: Duration) -> Result<Vec<Value>, ClientError> {
        let jobs: Vec<&JobConnection> = self.iter().collect();
        collect(&jobs, interval).await
    }
}

#[async_trait::async_trait]
impl Wait for Vec<JobConnection> {
    type Output = Vec<Value>;

    async fn wait_every(self, interval: Duration) -> Result<Vec<Value>, ClientError> {
        self.as_slice().wait_every(interval).await
    }
}

#[async_trait::async_trait]
impl Wait for Value {
    type Output = Value;

    async fn wait_every(self, _interval: Duration) -> Result<Value, ClientError> {
        Ok(self)
    }
}

#[async_trait::async_trait]
impl Wait for Vec<Value> {
    type Output = Vec<Value>;

    async fn wait_every(self, _interval: Duration) -> Result<Vec<Value>, ClientError> {
        Ok(self)
    }
}

#[async_trait::async_trait]
impl Wait for Arg {
    type Output = Value;

    async fn wait_every(self, interval: Duration) -> Result<Value, ClientError> {
        match self {
            Arg::Value(value) => Ok(value),
            Arg::Job(job) => job.wait_every(interval).await,
        }
    }
}

/// Mixed sequences resolve every job first, then read results in order
#[async_trait::async_trait]
impl Wait for Vec<Arg> {
    type Output = Vec<Value>;

    async fn wait_every(self, interval: Duration) -> Result<Vec<Value>, ClientError> {
        {
            let jobs: Vec<&JobConnection> = self
                .iter()
                .filter_map(|arg| match arg {
                    Arg::Job(job) => Some(job),
                    Arg::Value(_) => None,
                })
                .collect();
            until_terminal(&jobs, interval).await?;
        }

        let mut values = Vec::with_capacity(self.len());
        for arg in self {
            values.push(arg.wait_every(interval).await);
        }
        values.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn plain_values_pass_through() {
        assert_eq!(wait(json!(3)).await.unwrap(), json!(3));
        assert_eq!(
            wait(vec![json!(1), json!("a")]).await.unwrap(),
            vec![json!(1), json!("a")]
        );
        assert_eq!(
            wait(vec![Arg::from(1i64), Arg::from("x")]).await.unwrap(),
            vec![json!(1), json!("x")]
        );
    }
}
