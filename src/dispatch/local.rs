use std::any::Any;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{DispatchBackend, JobPayload, JobRegistry, Outcome, SlotState};

/// Runs jobs on this machine with a fixed number of execution slots
///
/// Each job waits for a semaphore permit, then runs on tokio's blocking
/// thread pool so CPU-bound functions do not stall the worker loop. A panic
/// inside a job is caught and reported as a failure.
pub struct LocalPool {
    registry: Arc<JobRegistry>,
    slots: Arc<Semaphore>,
    size: usize,
}

impl LocalPool {
    pub fn new(registry: JobRegistry, n_procs: usize) -> Self {
        let size = n_procs.max(1);
        Self {
            registry: Arc::new(registry),
            slots: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

#[async_trait::async_trait]
impl DispatchBackend for LocalPool {
    async fn dispatch(&self, payload: JobPayload, slot: SlotState) -> Outcome {
        let permit = match Arc::clone(&self.slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => return Outcome::Failed(format!("execution pool closed: {}", e)),
        };
        slot.mark_running();

        let job_id = payload.job_id.clone();
        debug!("Running job {} ({})", job_id, payload.function);

        let registry = Arc::clone(&self.registry);
        let outcome = match tokio::task::spawn_blocking(move || registry.invoke(&payload)).await {
            Ok(result) => Outcome::from(result),
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                warn!("Job {} panicked: {}", job_id, message);
                Outcome::Failed(format!("job panicked: {}", message))
            }
            Err(e) => Outcome::Failed(format!("job was cancelled: {}", e)),
        };

        drop(permit);
        outcome
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
