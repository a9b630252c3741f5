//! Executing job payloads.
//!
//! A [`DispatchBackend`] turns a [`JobPayload`] into an [`Outcome`]. Failures
//! raised by the job itself are captured as `Outcome::Failed` data so they
//! never unwind into the worker loop.

pub mod builtin;
pub mod local;
pub mod payload;
pub mod registry;
pub mod remote;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::job::LocalState;
use crate::protocol::ResultPackage;

pub use local::LocalPool;
pub use payload::{Arguments, JobPayload};
pub use registry::JobRegistry;
pub use remote::RemoteBackend;

/// Failure raised while running a job
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("missing positional argument {0}")]
    MissingArgument(usize),

    #[error("invalid argument {name}: {source}")]
    InvalidArgument {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("result is not serializable: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("{0}")]
    Raised(String),
}

impl ExecutionError {
    /// A failure reported by the job function itself
    pub fn raised(message: impl fmt::Display) -> Self {
        ExecutionError::Raised(message.to_string())
    }
}

/// Terminal result of running one job
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(Value),
    Failed(String),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }

    pub fn into_package(self, job_id: impl Into<String>) -> ResultPackage {
        match self {
            Outcome::Completed(value) => ResultPackage::completed(job_id, value),
            Outcome::Failed(exception) => ResultPackage::failed(job_id, exception),
        }
    }
}

impl From<Result<Value, ExecutionError>> for Outcome {
    fn from(result: Result<Value, ExecutionError>) -> Self {
        match result {
            Ok(value) => Outcome::Completed(value),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }
}

const PENDING: u8 = 0;
const RUNNING: u8 = 1;

/// Shared progress flag for one in-flight job
///
/// Starts out pending; the backend flips it to running once the job holds an
/// execution slot.
#[derive(Debug, Clone)]
pub struct SlotState(Arc<AtomicU8>);

impl SlotState {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(PENDING)))
    }

    pub fn mark_running(&self) {
        self.0.store(RUNNING, Ordering::Release);
    }

    pub fn local_state(&self) -> LocalState {
        match self.0.load(Ordering::Acquire) {
            RUNNING => LocalState::Running,
            _ => LocalState::Pending,
        }
    }
}

impl Default for SlotState {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that can run job payloads
#[async_trait::async_trait]
pub trait DispatchBackend: Send + Sync {
    /// Run `payload` to completion. Must call `slot.mark_running()` once the
    /// job starts executing.
    async fn dispatch(&self, payload: JobPayload, slot: SlotState) -> Outcome;
}
