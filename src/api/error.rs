use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::fmt;
use tracing::{error, warn};

use super::validation::ErrorResponse;
use crate::db::StoreError;

/// Service-level errors
#[derive(Debug)]
pub enum ServiceError {
    /// Job store operation failed
    Store(StoreError),

    /// Request content is invalid, e.g. an empty job payload
    Validation(String),

    /// Wire payload could not be decoded
    Protocol(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Store(e) => write!(f, "Store error: {}", e),
            ServiceError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ServiceError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Store(e)
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Store(StoreError::NotFound(_) | StoreError::UnknownWorker(_)) => {
                StatusCode::NOT_FOUND
            }
            ServiceError::Store(
                StoreError::DuplicateJob(_)
                | StoreError::DuplicateWorker(_)
                | StoreError::InvalidTransition { .. },
            ) => StatusCode::CONFLICT,
            ServiceError::Store(StoreError::Database(_) | StoreError::Corrupt(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Validation(_) | ServiceError::Protocol(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            ServiceError::Store(e) if status.is_server_error() => {
                error!("Store failure: {}", e);
                ErrorResponse::message("Failed to process request", "Database error occurred")
            }
            ServiceError::Store(e) if status == StatusCode::NOT_FOUND => {
                warn!("{}", e);
                ErrorResponse::message("Not found", e.to_string())
            }
            ServiceError::Store(e) => {
                warn!("{}", e);
                ErrorResponse::message("Conflict", e.to_string())
            }
            ServiceError::Validation(msg) => {
                warn!("Validation error: {}", msg);
                ErrorResponse::message("Validation failed", msg.clone())
            }
            ServiceError::Protocol(msg) => {
                warn!("Protocol error: {}", msg);
                ErrorResponse::message("Malformed request", msg.clone())
            }
        };
        HttpResponse::build(status).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;

    #[test]
    fn store_errors_map_to_http_statuses() {
        let cases = [
            (StoreError::NotFound("a".into()), StatusCode::NOT_FOUND),
            (StoreError::UnknownWorker("w".into()), StatusCode::NOT_FOUND),
            (StoreError::DuplicateJob("a".into()), StatusCode::CONFLICT),
            (StoreError::DuplicateWorker("w".into()), StatusCode::CONFLICT),
            (
                StoreError::InvalidTransition {
                    job_id: "a".into(),
                    status: JobStatus::Completed,
                },
                StatusCode::CONFLICT,
            ),
            (StoreError::Corrupt("bad".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ServiceError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn client_mistakes_are_bad_requests() {
        assert_eq!(
            ServiceError::Validation("empty".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Protocol("garbled".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
