mod gauge;
mod job_worker;

pub use gauge::{Load, LoadGauge};
pub use job_worker::{JobWorker, WorkerError, WorkerSummary};
