#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to scheduler failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("scheduler rejected request ({status}): {message}")]
    Scheduler { status: u16, message: String },

    #[error("job {job_id} failed: {exception}")]
    JobFailed { job_id: String, exception: String },

    #[error("job {0} has not finished yet")]
    NotFinished(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("could not encode job: {0}")]
    Encode(#[from] serde_json::Error),
}
