use actix_multipart::form::MultipartFormConfig;
use actix_web::{error::InternalError, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::protocol::MAX_NAME_LEN;

/// Error body shared by every endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub fields: serde_json::Value,
}

impl ErrorResponse {
    pub fn message(error: &str, message: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.to_string(),
            fields: serde_json::json!({"message": message.into()}),
        }
    }
}

fn bad_request(body: ErrorResponse) -> actix_web::Error {
    InternalError::from_response("", HttpResponse::BadRequest().json(body)).into()
}

/// Creates a configured JsonConfig with standardized error handling for the entire project
pub fn json_config() -> actix_web_validator::JsonConfig {
    actix_web_validator::JsonConfig::default()
        .error_handler(|err, _req| {
            match err {
                actix_web_validator::Error::Validate(validation_errors) => {
                    let mut fields = serde_json::Map::new();
                    for (field, errors) in validation_errors.field_errors() {
                        let messages: Vec<String> = errors
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .map(|m| m.to_string())
                                    .unwrap_or_else(|| format!("Validation error in field: {}", field))
                            })
                            .collect();
                        fields.insert(
                            field.to_string(),
                            serde_json::json!({"errors": messages})
                        );
                    }

                    bad_request(ErrorResponse {
                        error: "Validation failed".to_string(),
                        fields: serde_json::Value::Object(fields),
                    })
                }
                actix_web_validator::Error::Deserialize(de_err) => {
                    let err_string = de_err.to_string();

                    let message = if err_string.contains("EOF while parsing") {
                        "Request body is empty. Expected JSON payload"
                    } else if err_string.contains("unknown variant") {
                        "Invalid enum value. Check allowed values for this field"
                    } else {
                        "Invalid JSON format"
                    };

                    bad_request(ErrorResponse::message("Request validation failed", message))
                }
                _ => bad_request(ErrorResponse::message("Validation failed", "Validation error")),
            }
        })
}

/// Multipart limits and error body for the file-upload endpoints
pub fn multipart_config(max_payload_size: usize) -> MultipartFormConfig {
    MultipartFormConfig::default()
        .total_limit(max_payload_size)
        .memory_limit(max_payload_size)
        .error_handler(|err, _req| {
            bad_request(ErrorResponse::message(
                "Malformed upload",
                err.to_string(),
            ))
        })
}

/// Job ids end up in URL paths, so they must be short and slash-free
pub fn validate_job_id(job_id: &str) -> Result<(), String> {
    if job_id.is_empty() {
        return Err("Job id must not be empty".to_string());
    }
    if job_id.len() > MAX_NAME_LEN {
        return Err(format!("Job id must be at most {} characters", MAX_NAME_LEN));
    }
    if job_id.chars().any(|c| c == '/' || c.is_whitespace() || c.is_control()) {
        return Err("Job id must not contain '/', whitespace or control characters".to_string());
    }
    Ok(())
}
