use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{DispatchBackend, JobPayload, Outcome, SlotState};

/// Reply expected from a remote function endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteReply {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub exception: Option<String>,
}

/// Runs jobs by invoking a serverless function over HTTP
///
/// The payload JSON is POSTed to `endpoint`, which answers with a
/// [`RemoteReply`]. At most `max_concurrency` invocations are in flight.
pub struct RemoteBackend {
    http: reqwest::Client,
    endpoint: String,
    slots: Arc<Semaphore>,
}

impl RemoteBackend {
    pub fn new(endpoint: impl Into<String>, max_concurrency: usize) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(900))
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            slots: Arc::new(Semaphore::new(max_concurrency.max(1))),
        })
    }

    async fn invoke(&self, payload: &JobPayload) -> Result<RemoteReply, reqwest::Error> {
        self.http
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait::async_trait]
impl DispatchBackend for RemoteBackend {
    async fn dispatch(&self, payload: JobPayload, slot: SlotState) -> Outcome {
        let _permit = match Arc::clone(&self.slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => return Outcome::Failed(format!("remote backend closed: {}", e)),
        };
        slot.mark_running();
        debug!("Invoking {} for job {}", self.endpoint, payload.job_id);

        match self.invoke(&payload).await {
            Ok(RemoteReply {
                exception: Some(exception),
                ..
            }) => Outcome::Failed(exception),
            Ok(reply) => Outcome::Completed(reply.result.unwrap_or(Value::Null)),
            Err(e) => {
                warn!("Remote invocation of job {} failed: {}", payload.job_id, e);
                Outcome::Failed(format!("remote invocation failed: {}", e))
            }
        }
    }
}
